use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    model::{Project, Track, TrackKind},
    time::Fps,
};

pub const CONFIG_FILE_NAME: &str = "reelgraph.config.toml";
pub const CONFIG_PATH_ENV: &str = "REELGRAPH_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditorConfig {
    pub project: ProjectConfig,
    pub timeline: TimelineConfig,
    pub diagnostics: DiagnosticsConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    pub default_title: String,
    pub fps_num: u32,
    pub fps_den: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimelineConfig {
    pub video_tracks: usize,
    pub audio_tracks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub rust_log_filter: String,
    pub trace_file_prefix: String,
    pub intent_timings: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub logs_dir: PathBuf,
    pub autosave_dir: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            default_title: "Untitled".to_string(),
            fps_num: Fps::PAL.num,
            fps_den: Fps::PAL.den,
        }
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            video_tracks: 2,
            audio_tracks: 2,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            rust_log_filter: crate::diagnostics::DEFAULT_FILTER.to_string(),
            trace_file_prefix: "reelgraph".to_string(),
            intent_timings: false,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("logs"),
            autosave_dir: PathBuf::from("data/autosave"),
        }
    }
}

impl EditorConfig {
    /// Loads the discovered config file, falling back to defaults when none
    /// exists. A file that exists but does not parse is an error.
    pub fn load() -> Result<Self> {
        match discover_config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: EditorConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config TOML from {}", path.display()))?;
        config.fps()?;
        Ok(config)
    }

    pub fn fps(&self) -> Result<Fps> {
        Fps::new(self.project.fps_num, self.project.fps_den)
            .with_context(|| "invalid [project] frame rate".to_string())
    }

    /// An empty project with the configured rate and track layout, video
    /// tracks first.
    pub fn new_project(&self) -> Result<Project> {
        let mut project = Project::new(self.project.default_title.clone(), self.fps()?);
        for index in 0..self.timeline.video_tracks {
            project
                .tracks
                .push(Track::new(format!("V{}", index + 1), TrackKind::Video));
        }
        for index in 0..self.timeline.audio_tracks {
            project
                .tracks
                .push(Track::new(format!("A{}", index + 1), TrackKind::Audio));
        }
        Ok(project)
    }
}

/// `REELGRAPH_CONFIG_PATH`, then the working directory, then its parent.
#[must_use]
pub fn discover_config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Some(path);
        }
    }

    let cwd = env::current_dir().ok()?;
    [
        cwd.join(CONFIG_FILE_NAME),
        cwd.join("..").join(CONFIG_FILE_NAME),
    ]
    .into_iter()
    .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_fill_in_defaults() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[project]\nfps_num = 30000\nfps_den = 1001\n")
            .expect("config should be written");

        let config = EditorConfig::load_from(&path).expect("config should parse");
        assert_eq!(config.fps().expect("valid rate"), Fps::NTSC);
        assert_eq!(config.timeline, TimelineConfig::default());
        assert_eq!(config.project.default_title, "Untitled");
    }

    #[test]
    fn zero_denominator_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[project]\nfps_den = 0\n").expect("config should be written");
        assert!(EditorConfig::load_from(&path).is_err());
    }

    #[test]
    fn new_project_follows_track_layout() {
        let mut config = EditorConfig::default();
        config.timeline.video_tracks = 1;
        config.timeline.audio_tracks = 1;
        let project = config.new_project().expect("defaults are valid");
        let names: Vec<_> = project.tracks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["V1", "A1"]);
        assert_eq!(project.tracks[1].kind, TrackKind::Audio);
    }
}
