use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::Utc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt,
};
use uuid::Uuid;

use crate::config::EditorConfig;

pub const DEFAULT_FILTER: &str = "info,reelgraph_core=trace";

/// Keeps the JSON trace file flushing; drop it last.
pub struct TelemetryGuard {
    pub session_id: Uuid,
    pub trace_file: PathBuf,
    _file_guard: WorkerGuard,
}

#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    pub log_dir: PathBuf,
    pub file_prefix: String,
    pub default_filter: String,
    /// Emits a close event with busy/idle time for every instrumented edit
    /// intent into the trace file.
    pub intent_timings: bool,
}

impl TelemetryOptions {
    #[must_use]
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            file_prefix: "reelgraph".to_string(),
            default_filter: DEFAULT_FILTER.to_string(),
            intent_timings: false,
        }
    }

    #[must_use]
    pub fn from_config(config: &EditorConfig) -> Self {
        Self {
            log_dir: config.paths.logs_dir.clone(),
            file_prefix: config.diagnostics.trace_file_prefix.clone(),
            default_filter: config.diagnostics.rust_log_filter.clone(),
            intent_timings: config.diagnostics.intent_timings,
        }
    }

    fn trace_file_name(&self, stamp: &str) -> String {
        format!("{}-{stamp}.log", self.file_prefix)
    }
}

pub fn init_tracing(log_dir: impl AsRef<Path>) -> anyhow::Result<TelemetryGuard> {
    init_tracing_with_options(&TelemetryOptions::new(log_dir.as_ref()))
}

pub fn init_tracing_from_config(config: &EditorConfig) -> anyhow::Result<TelemetryGuard> {
    init_tracing_with_options(&TelemetryOptions::from_config(config))
}

/// Compact stdout plus a JSON trace file per session. A second call in the
/// same process keeps the first subscriber and only warns.
pub fn init_tracing_with_options(options: &TelemetryOptions) -> anyhow::Result<TelemetryGuard> {
    fs::create_dir_all(&options.log_dir).with_context(|| {
        format!(
            "failed to create log directory: {}",
            options.log_dir.display()
        )
    })?;

    let session_id = Uuid::new_v4();
    let file_name = options.trace_file_name(&Utc::now().format("%Y%m%d-%H%M%S").to_string());
    let trace_file = options.log_dir.join(&file_name);
    let appender = tracing_appender::rolling::never(&options.log_dir, file_name);
    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&options.default_filter))
        .with_context(|| format!("invalid log filter `{}`", options.default_filter))?;

    let span_events = if options.intent_timings {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let terminal = tracing_subscriber::fmt::layer()
        .compact()
        .with_thread_ids(true)
        .with_target(true);
    let trace = tracing_subscriber::fmt::layer()
        .json()
        .with_ansi(false)
        .with_current_span(true)
        .with_span_list(true)
        .with_span_events(span_events)
        .with_writer(file_writer);

    match tracing_subscriber::registry()
        .with(filter)
        .with(terminal)
        .with(trace)
        .try_init()
    {
        Ok(()) => info!(%session_id, trace_file = %trace_file.display(), "tracing initialized"),
        Err(error) => warn!(?error, "tracing already initialized, keeping existing subscriber"),
    }

    Ok(TelemetryGuard {
        session_id,
        trace_file,
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_follow_the_diagnostics_section() {
        let mut config = EditorConfig::default();
        config.diagnostics.trace_file_prefix = "edit-session".to_string();
        config.diagnostics.intent_timings = true;

        let options = TelemetryOptions::from_config(&config);
        assert_eq!(options.log_dir, config.paths.logs_dir);
        assert!(options.intent_timings);
        assert_eq!(
            options.trace_file_name("20260101-120000"),
            "edit-session-20260101-120000.log"
        );
    }

    #[test]
    fn init_creates_the_log_directory() {
        let temp = tempfile::tempdir().expect("tempdir should be creatable");
        let log_dir = temp.path().join("nested").join("logs");

        let guard = init_tracing(&log_dir).expect("tracing initializes");
        assert!(log_dir.is_dir());
        assert_eq!(guard.trace_file.parent(), Some(log_dir.as_path()));
    }
}
