use std::path::PathBuf;

use super::config::ProjectConfig;
use super::wbs::WbsNode;

/// A loaded crewgrid project
#[derive(Debug)]
pub struct Project {
    /// Root directory of the project (parent of `crewgrid/`)
    pub root: PathBuf,
    /// Path to the `crewgrid/` directory
    pub data_dir: PathBuf,
    /// Parsed project.toml
    pub config: ProjectConfig,
    /// Flat WBS records from wbs.json
    pub wbs: Vec<WbsNode>,
}
