use std::fs;
use std::path::Path;

use chrono::NaiveDate;

use crate::io::project_io::ProjectError;
use crate::model::config::ProjectConfig;

/// Read the project config, returning both the parsed config and the raw
/// toml_edit document for comment-preserving edits.
pub fn read_config(data_dir: &Path) -> Result<(ProjectConfig, toml_edit::DocumentMut), ProjectError> {
    let config_path = data_dir.join("project.toml");
    let config_text = fs::read_to_string(&config_path).map_err(|e| ProjectError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;
    let config: ProjectConfig = toml::from_str(&config_text)?;
    let doc: toml_edit::DocumentMut = config_text.parse()?;
    Ok((config, doc))
}

/// Write the config document back, keeping its formatting
pub fn write_config(data_dir: &Path, doc: &toml_edit::DocumentMut) -> Result<(), ProjectError> {
    let config_path = data_dir.join("project.toml");
    crate::io::recovery::atomic_write(&config_path, doc.to_string().as_bytes()).map_err(|e| {
        ProjectError::WriteError {
            path: config_path,
            source: e,
        }
    })
}

/// Set `[program] from`/`to`. Dates are stored as quoted ISO strings.
pub fn set_program_window(doc: &mut toml_edit::DocumentMut, from: NaiveDate, to: NaiveDate) {
    if !doc.contains_key("program") {
        doc["program"] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    doc["program"]["from"] = toml_edit::value(from.to_string());
    doc["program"]["to"] = toml_edit::value(to.to_string());
}

/// Set or clear `[clock] today`
pub fn set_fixed_today(doc: &mut toml_edit::DocumentMut, today: Option<NaiveDate>) {
    match today {
        Some(date) => {
            if !doc.contains_key("clock") {
                doc["clock"] = toml_edit::Item::Table(toml_edit::Table::new());
            }
            doc["clock"]["today"] = toml_edit::value(date.to_string());
        }
        None => {
            if let Some(clock) = doc.get_mut("clock").and_then(|c| c.as_table_mut()) {
                clock.remove("today");
            }
        }
    }
}
