use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::period::Granularity;

/// User-selected row predicates. Every empty/`None` field is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    /// Case-insensitive substring over code and name
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub levels: Vec<u32>,
    #[serde(default)]
    pub buildings: Vec<String>,
    #[serde(default)]
    pub statuses: Vec<String>,
    /// Substring of the node's target period (`target_kw`)
    #[serde(default)]
    pub target_period: String,
    #[serde(default)]
    pub progress_min: Option<f64>,
    #[serde(default)]
    pub progress_max: Option<f64>,
}

impl FilterState {
    /// True when no predicate is set
    pub fn is_default(&self) -> bool {
        self == &FilterState::default()
    }
}

/// Everything one open view feeds into the engine.
///
/// Owned by the caller and passed explicitly; the engine reads no ambient
/// state.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewContext {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Reference date for deriving `is_future` of cells the server omitted
    pub today: NaiveDate,
    pub granularity: Granularity,
    pub filters: FilterState,
    /// Ids of collapsed group rows
    pub collapsed: HashSet<String>,
}

impl ViewContext {
    pub fn new(from: NaiveDate, to: NaiveDate, today: NaiveDate) -> Self {
        ViewContext {
            from,
            to,
            today,
            granularity: Granularity::Day,
            filters: FilterState::default(),
            collapsed: HashSet::new(),
        }
    }

    /// Toggle a group between collapsed and expanded
    pub fn toggle_group(&mut self, id: &str) {
        if !self.collapsed.remove(id) {
            self.collapsed.insert(id.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_is_noop() {
        assert!(FilterState::default().is_default());
        let f = FilterState {
            search: "cw".into(),
            ..Default::default()
        };
        assert!(!f.is_default());
    }

    #[test]
    fn test_toggle_group() {
        let day = NaiveDate::from_ymd_opt(2026, 2, 17).unwrap();
        let mut ctx = ViewContext::new(day, day, day);
        ctx.toggle_group("cw");
        assert!(ctx.collapsed.contains("cw"));
        ctx.toggle_group("cw");
        assert!(ctx.collapsed.is_empty());
    }
}
