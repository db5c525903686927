use std::fs;
use std::path::{Path, PathBuf};

use crate::model::config::ProjectConfig;
use crate::model::project::Project;
use crate::model::wbs::WbsNode;

/// Name of the data directory inside a project root
pub const DATA_DIR: &str = "crewgrid";

/// Error type for project I/O operations
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("not a crewgrid project: no crewgrid/project.toml found")]
    NotAProject,
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse project.toml: {0}")]
    ConfigParseError(#[from] toml::de::Error),
    #[error("could not edit project.toml: {0}")]
    ConfigEditError(#[from] toml_edit::TomlError),
    #[error("could not parse {path}: {source}")]
    JsonError {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Walk up from `start` looking for a directory holding
/// `crewgrid/project.toml`.
pub fn discover_project(start: &Path) -> Result<PathBuf, ProjectError> {
    let mut current = start.to_path_buf();
    loop {
        let data_dir = current.join(DATA_DIR);
        if data_dir.is_dir() && data_dir.join("project.toml").exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(ProjectError::NotAProject);
        }
    }
}

/// Load config and WBS from a project root. A missing `wbs.json` is an
/// empty hierarchy.
pub fn load_project(root: &Path) -> Result<Project, ProjectError> {
    let data_dir = root.join(DATA_DIR);
    if !data_dir.is_dir() {
        return Err(ProjectError::NotAProject);
    }

    let config_path = data_dir.join("project.toml");
    let config_text = fs::read_to_string(&config_path).map_err(|e| ProjectError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;
    let config: ProjectConfig = toml::from_str(&config_text)?;

    let wbs = read_json_or_default::<Vec<WbsNode>>(&data_dir.join("wbs.json"))?;
    tracing::debug!(root = %root.display(), nodes = wbs.len(), "loaded project");

    Ok(Project {
        root: root.to_path_buf(),
        data_dir,
        config,
        wbs,
    })
}

/// Read a JSON file, or the type's default when the file does not exist
pub fn read_json_or_default<T>(path: &Path) -> Result<T, ProjectError>
where
    T: serde::de::DeserializeOwned + Default,
{
    if !path.exists() {
        return Ok(T::default());
    }
    let text = fs::read_to_string(path).map_err(|e| ProjectError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    if text.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&text).map_err(|e| ProjectError::JsonError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Pretty-print `value` as JSON and write it atomically
pub fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), ProjectError> {
    let mut text = serde_json::to_string_pretty(value).map_err(|e| ProjectError::JsonError {
        path: path.to_path_buf(),
        source: e,
    })?;
    text.push('\n');
    crate::io::recovery::atomic_write(path, text.as_bytes()).map_err(|e| {
        ProjectError::WriteError {
            path: path.to_path_buf(),
            source: e,
        }
    })
}
