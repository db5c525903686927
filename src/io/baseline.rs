use std::path::Path;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::io::project_io::{ProjectError, read_json_or_default, write_json};
use crate::io::store::AllocationStore;
use crate::model::baseline::{Baseline, BaselineSnapshot, DailyPlan};
use crate::ops::tree::WbsTree;

pub const BASELINES_FILE: &str = "baselines.json";

/// Every baseline of a project, oldest first
#[derive(Debug, Clone, Default)]
pub struct BaselineLog {
    baselines: Vec<Baseline>,
}

impl BaselineLog {
    pub fn load(data_dir: &Path) -> Result<Self, ProjectError> {
        let baselines: Vec<Baseline> = read_json_or_default(&data_dir.join(BASELINES_FILE))?;
        Ok(BaselineLog { baselines })
    }

    pub fn save(&self, data_dir: &Path) -> Result<(), ProjectError> {
        write_json(&data_dir.join(BASELINES_FILE), &self.baselines)
    }

    pub fn all(&self) -> &[Baseline] {
        &self.baselines
    }

    pub fn active(&self) -> Option<&Baseline> {
        self.baselines.iter().rev().find(|b| b.is_active)
    }

    pub fn get(&self, version: u32) -> Option<&Baseline> {
        self.baselines.iter().find(|b| b.version == version)
    }

    /// The active plan, empty without an active baseline
    pub fn active_plan(&self) -> DailyPlan {
        self.active().map(Baseline::plan).unwrap_or_default()
    }

    /// Capture the crew currently allocated to every non-summary item as the
    /// next version and make it the only active baseline.
    ///
    /// Days with actual manpower above zero form the plan; everything else is
    /// left out.
    pub fn create(
        &mut self,
        tree: &WbsTree,
        store: &AllocationStore,
        name: &str,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> &Baseline {
        let version = self.baselines.iter().map(|b| b.version).max().unwrap_or(0) + 1;
        for baseline in &mut self.baselines {
            baseline.is_active = false;
        }

        let snapshots = tree
            .nodes()
            .filter(|n| !n.is_summary)
            .map(|node| snapshot(&node.id, store))
            .collect();
        let baseline = Baseline {
            version,
            name: name.to_string(),
            notes,
            approved_at: now,
            is_active: true,
            snapshots,
        };
        tracing::info!(version, items = baseline.snapshots.len(), "created baseline");
        self.baselines.push(baseline);
        &self.baselines[self.baselines.len() - 1]
    }
}

fn snapshot(item_id: &str, store: &AllocationStore) -> BaselineSnapshot {
    let mut days: Vec<_> = store
        .records()
        .filter(|r| r.wbs_item_id == item_id && r.actual_manpower > 0.0)
        .map(|r| (r.date, r.actual_manpower))
        .collect();
    days.sort_by_key(|(date, _)| *date);
    let daily_plan: IndexMap<_, _> = days.into_iter().collect();

    let total_manday: f64 = daily_plan.values().sum();
    let manpower_per_day = if daily_plan.is_empty() {
        0.0
    } else {
        (total_manday / daily_plan.len() as f64 * 100.0).round() / 100.0
    };
    BaselineSnapshot {
        wbs_item_id: item_id.to_string(),
        total_manday,
        start_date: daily_plan.keys().next().copied(),
        end_date: daily_plan.keys().next_back().copied(),
        manpower_per_day,
        daily_plan,
    }
}
