use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;

/// Header written at the top of a new recovery log
const FILE_HEADER: &str = "\
<!-- crewgrid recovery log: edits that could not be saved normally.
     Each entry holds the JSON of the affected updates.
     Safe to delete once the values have been re-entered. -->

---
";

/// Why an entry was written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryCategory {
    /// The allocation file could not be written
    Write,
    /// A session closed with edits the server never applied
    Unsaved,
}

impl fmt::Display for RecoveryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryCategory::Write => write!(f, "write"),
            RecoveryCategory::Unsaved => write!(f, "unsaved"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryEntry {
    pub timestamp: DateTime<Utc>,
    pub category: RecoveryCategory,
    pub description: String,
    pub fields: Vec<(String, String)>,
    pub body: String,
}

impl RecoveryEntry {
    fn to_markdown(&self) -> String {
        let mut out = format!(
            "## {} {}: {}\n\n",
            self.timestamp
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.category,
            self.description,
        );
        for (key, value) in &self.fields {
            out.push_str(&format!("{}: {}\n", key, value));
        }
        if !self.body.is_empty() {
            out.push_str("\n```json\n");
            out.push_str(&self.body);
            if !self.body.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("```\n");
        }
        out.push_str("\n---\n");
        out
    }
}

pub fn recovery_log_path(data_dir: &Path) -> PathBuf {
    data_dir.join(".recovery.log")
}

/// Write `content` to `path` atomically using a temp file + rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Append an entry to the recovery log. Failures are logged, not returned.
pub fn log_recovery(data_dir: &Path, entry: RecoveryEntry) {
    if let Err(e) = log_recovery_inner(data_dir, &entry) {
        tracing::warn!(error = %e, "could not write to recovery log");
    }
}

fn log_recovery_inner(data_dir: &Path, entry: &RecoveryEntry) -> io::Result<()> {
    let path = recovery_log_path(data_dir);
    let needs_header = std::fs::metadata(&path).map_or(true, |m| m.len() == 0);
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if needs_header {
        file.write_all(FILE_HEADER.as_bytes())?;
    }
    file.write_all(entry.to_markdown().as_bytes())?;
    Ok(())
}

/// Number of entries in the recovery log, 0 if there is none
pub fn recovery_entry_count(data_dir: &Path) -> usize {
    std::fs::read_to_string(recovery_log_path(data_dir))
        .map(|s| s.lines().filter(|l| l.starts_with("## ")).count())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(desc: &str) -> RecoveryEntry {
        RecoveryEntry {
            timestamp: DateTime::parse_from_rfc3339("2026-02-17T08:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
            category: RecoveryCategory::Unsaved,
            description: desc.to_string(),
            fields: vec![("Edits".to_string(), "1".to_string())],
            body: r#"[{"wbs_id":"a","date":"2026-02-17","actual_manpower":4.0}]"#.to_string(),
        }
    }

    #[test]
    fn test_atomic_write_replaces() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("allocations.json");
        atomic_write(&path, b"[1]").unwrap();
        atomic_write(&path, b"[2]").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[2]");
    }

    #[test]
    fn test_log_appends_with_single_header() {
        let tmp = TempDir::new().unwrap();
        log_recovery(tmp.path(), entry("first"));
        log_recovery(tmp.path(), entry("second"));
        let content = std::fs::read_to_string(recovery_log_path(tmp.path())).unwrap();
        assert_eq!(content.matches("crewgrid recovery log").count(), 1);
        assert!(content.contains("## 2026-02-17T08:30:00Z unsaved: first"));
        assert!(content.contains("Edits: 1"));
        assert!(content.contains("```json\n[{\"wbs_id\":\"a\""));
        assert_eq!(recovery_entry_count(tmp.path()), 2);
    }

    #[test]
    fn test_missing_log_counts_zero() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(recovery_entry_count(tmp.path()), 0);
    }
}
