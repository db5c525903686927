use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::edit::EditSource;

/// Configuration from crewgrid/project.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project: ProjectInfo,
    #[serde(default)]
    pub program: ProgramConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub clock: ClockConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
}

/// Default date window for grid commands
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramConfig {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Default: see src/cli/handlers/init.rs template
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Upper bound accepted for a single cell's actual manpower
    #[serde(default = "default_max_manpower")]
    pub max_manpower: f64,
    #[serde(default)]
    pub source: EditSource,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            debounce_ms: default_debounce_ms(),
            max_manpower: default_max_manpower(),
            source: EditSource::Grid,
        }
    }
}

impl GridConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_max_manpower() -> f64 {
    200.0
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Fixed "today"; absent means the local date
    #[serde(default)]
    pub today: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_defaults() {
        let config: ProjectConfig = toml::from_str("[project]\nname = \"E2NS\"\n").unwrap();
        assert_eq!(config.project.name, "E2NS");
        assert_eq!(config.grid.debounce_ms, 500);
        assert_eq!(config.grid.max_manpower, 200.0);
        assert_eq!(config.grid.source, EditSource::Grid);
        assert!(config.program.from.is_none());
        assert!(config.clock.today.is_none());
    }

    #[test]
    fn test_full_config() {
        let config: ProjectConfig = toml::from_str(
            r#"
[project]
name = "E2NS"

[program]
from = "2026-01-01"
to = "2026-07-31"

[grid]
debounce_ms = 250
max_manpower = 80
source = "chat"

[clock]
today = "2026-02-18"
"#,
        )
        .unwrap();
        assert_eq!(config.program.from, NaiveDate::from_ymd_opt(2026, 1, 1));
        assert_eq!(config.grid.debounce_ms, 250);
        assert_eq!(config.grid.max_manpower, 80.0);
        assert_eq!(config.grid.source, EditSource::Chat);
        assert_eq!(config.clock.today, NaiveDate::from_ymd_opt(2026, 2, 18));
    }
}
