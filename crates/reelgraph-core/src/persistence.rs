use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::model::Project;

pub const AUTOSAVE_SUFFIX: &str = ".autosave.reelgraph.json";

#[instrument(skip(project), fields(project_id = %project.id, path = %path.display()))]
pub fn save_project(path: &Path, project: &Project) -> Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create directory: {}", parent.display()))?;

    let json = serde_json::to_vec_pretty(project).context("failed to serialize project")?;
    debug!(bytes = json.len(), "project serialized");
    let mut temp_file =
        tempfile::NamedTempFile::new_in(parent).context("failed to create temp project file")?;

    use std::io::Write;
    temp_file
        .write_all(&json)
        .context("failed to write temp project file")?;
    temp_file
        .persist(path)
        .map_err(|error| anyhow::anyhow!(error.error))
        .with_context(|| format!("failed to persist project: {}", path.display()))?;

    info!("project saved");
    Ok(())
}

#[instrument(fields(path = %path.display()))]
pub fn load_project(path: &Path) -> Result<Project> {
    let content =
        fs::read(path).with_context(|| format!("failed to read project: {}", path.display()))?;
    let project: Project = serde_json::from_slice(&content).context("invalid project json")?;
    for (index, track) in project.tracks.iter().enumerate() {
        track
            .check_invariants()
            .with_context(|| format!("track {index} ({}) is malformed", track.name))?;
    }
    for source in project.sources.values() {
        source
            .length
            .bounded()
            .with_context(|| format!("source {} has an unusable length", source.id))?;
    }
    for transition in project.transitions.iter() {
        transition
            .range
            .start
            .bounded()
            .and_then(|_| transition.range.end.bounded())
            .with_context(|| format!("transition {} has an unusable range", transition.id))?;
        anyhow::ensure!(
            transition.a_track.max(transition.b_track) < project.tracks.len(),
            "transition {} references a missing track",
            transition.id
        );
    }
    project
        .fps
        .validate()
        .context("project frame rate is invalid")?;
    info!(
        project_id = %project.id,
        tracks = project.tracks.len(),
        clips = project.clip_count(),
        transitions = project.transitions.len(),
        "project loaded"
    );
    Ok(project)
}

#[instrument(skip(project), fields(project_id = %project.id, autosave_dir = %autosave_dir.display()))]
pub fn autosave_project(project: &Project, autosave_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(autosave_dir).with_context(|| {
        format!(
            "failed to create autosave directory: {}",
            autosave_dir.display()
        )
    })?;

    let file_name = format!("{}{AUTOSAVE_SUFFIX}", project.id);
    let autosave_path = autosave_dir.join(file_name);
    save_project(&autosave_path, project)?;

    debug!(path = %autosave_path.display(), "autosave complete");
    Ok(autosave_path)
}
