use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use reelgraph_core::{
    EditorConfig, FramePos, InsertMode, MemoryBackend, Project, Timeline, TransitionRequest,
    diagnostics::{TelemetryOptions, init_tracing_with_options},
    fixtures::{CITY_CLIP_ID, LUMA_TRANSITION_ID, demo_backend, demo_project},
    time::{Fps, FrameRange},
};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "reelgraph-cli")]
#[command(about = "Headless tools for building, inspecting and rescaling reelgraph timelines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Overrides `[paths] logs_dir` from the config file.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Creates an empty timeline with the configured frame rate and tracks.
    New {
        #[arg(long)]
        output: PathBuf,

        /// Overrides `[project] default_title`.
        #[arg(long)]
        title: Option<String>,
    },
    /// Runs a scripted edit session on the demo timeline and saves it.
    /// A copy is autosaved into `[paths] autosave_dir`.
    Demo {
        #[arg(long, default_value = "data/demo.reelgraph.json")]
        output: PathBuf,
    },
    /// Projects a saved timeline onto an in-memory engine and summarizes it.
    Inspect { path: PathBuf },
    /// Re-quantizes a saved timeline to another frame rate.
    Rescale {
        path: PathBuf,

        /// `25` or `30000/1001`.
        #[arg(long)]
        fps: String,

        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = EditorConfig::load()?;
    let mut telemetry = TelemetryOptions::from_config(&config);
    if let Some(log_dir) = cli.log_dir {
        telemetry.log_dir = log_dir;
    }
    let _telemetry = init_tracing_with_options(&telemetry)?;

    match cli.command {
        Commands::New { output, title } => {
            let mut project = config.new_project()?;
            if let Some(title) = title {
                project.title = title;
            }
            let timeline = Timeline::new(project, MemoryBackend::new())?;
            timeline.save(&output)?;
            print_summary(&timeline);
            tracing::info!(path = %output.display(), "empty timeline created");
        }
        Commands::Demo { output } => {
            let timeline = Timeline::new(demo_project(), demo_backend())?;
            run_demo_session(&timeline)?;
            timeline.save(&output)?;
            let autosave = timeline.autosave(&config.paths.autosave_dir)?;
            print_summary(&timeline);
            tracing::info!(
                path = %output.display(),
                autosave = %autosave.display(),
                "demo timeline saved"
            );
        }
        Commands::Inspect { path } => {
            let project = reelgraph_core::persistence::load_project(&path)?;
            let timeline = Timeline::new(project.clone(), backend_for(&project))
                .with_context(|| format!("failed to project {}", path.display()))?;
            print_summary(&timeline);
        }
        Commands::Rescale { path, fps, output } => {
            let fps = Fps::parse(&fps).with_context(|| format!("invalid frame rate {fps}"))?;
            let project = reelgraph_core::persistence::load_project(&path)?;
            let timeline = Timeline::new(project.clone(), backend_for(&project))?;
            let report = timeline.rescale_fps(fps)?;
            timeline.save(&output)?;
            println!(
                "rescaled {} values to {fps} ({} inexact)",
                report.values, report.inexact
            );
        }
    }

    Ok(())
}

fn run_demo_session(timeline: &Timeline) -> anyhow::Result<()> {
    let city = Uuid::parse_str(CITY_CLIP_ID)?;
    let luma = Uuid::parse_str(LUMA_TRANSITION_ID)?;

    timeline.cut_clip(0, FramePos(200))?;
    timeline.change_clip_speed(city, 0.5, 1)?;
    timeline.insert_space(&[0, 1, 2], FramePos(25), FramePos(175))?;
    timeline.invert_transition(luma)?;
    timeline.attach_transition(TransitionRequest::new(
        "composite",
        0,
        1,
        FrameRange::from_frames(100, 175),
    ))?;
    timeline.move_clip(city, 0, FramePos(300), InsertMode::Strict)?;
    Ok(())
}

/// Declares every source of `project` so the in-memory engine can open it.
fn backend_for(project: &Project) -> MemoryBackend {
    let mut backend = MemoryBackend::new();
    for source in project.sources.values() {
        backend.add_media(source.resource.clone(), source.length);
        if let Some(proxy) = &source.proxy {
            backend.add_media(proxy.clone(), source.length);
        }
    }
    backend
}

fn print_summary(timeline: &Timeline) {
    let project = timeline.project();
    println!(
        "{} ({} @ {}, revision {})",
        project.title,
        project.fps.timecode(project.duration()),
        project.fps,
        timeline.revision()
    );
    for (index, track) in project.tracks.iter().enumerate() {
        println!(
            "  [{index}] {:<4} {:?} clips={} duration={} effects={}{}{}",
            track.name,
            track.kind,
            track.clip_count(),
            project.fps.timecode(track.duration()),
            track.effects.len(),
            if track.mute { " muted" } else { "" },
            if track.blind { " hidden" } else { "" },
        );
        for (span, clip) in track.clips() {
            println!(
                "      {span} {} [{}, {}) x{}",
                clip.source_id, clip.in_point, clip.out_point, clip.speed
            );
        }
    }
    for transition in project.transitions.iter() {
        println!(
            "  transition {}{}",
            transition.describe(),
            if transition.inverted { " (inverted)" } else { "" }
        );
    }
    for variant in timeline.variants() {
        println!("  variant {} refs={}", variant.key, variant.references);
    }
}
