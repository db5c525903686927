use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One item's plan as captured by a baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineSnapshot {
    pub wbs_item_id: String,
    #[serde(default)]
    pub total_manday: f64,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Average crew over the planned days
    #[serde(default)]
    pub manpower_per_day: f64,
    #[serde(default)]
    pub daily_plan: IndexMap<NaiveDate, f64>,
}

/// A numbered, approved plan. At most one baseline per project is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub version: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub approved_at: DateTime<Utc>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub snapshots: Vec<BaselineSnapshot>,
}

impl Baseline {
    pub fn total_manday(&self) -> f64 {
        self.snapshots.iter().map(|s| s.total_manday).sum()
    }

    /// Index the snapshots by item and date
    pub fn plan(&self) -> DailyPlan {
        let by_item = self
            .snapshots
            .iter()
            .map(|s| {
                let days = s.daily_plan.iter().map(|(d, v)| (*d, *v)).collect();
                (s.wbs_item_id.clone(), days)
            })
            .collect();
        DailyPlan { by_item }
    }
}

/// Planned manpower by (item, date). Empty when no baseline is active.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyPlan {
    by_item: HashMap<String, HashMap<NaiveDate, f64>>,
}

impl DailyPlan {
    pub fn planned(&self, item_id: &str, date: NaiveDate) -> Option<f64> {
        self.by_item.get(item_id)?.get(&date).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.by_item.values().all(HashMap::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_lookup() {
        let json = r#"{
            "version": 2,
            "name": "Rebaseline after design freeze",
            "approved_at": "2026-02-10T09:00:00Z",
            "is_active": true,
            "snapshots": [
                {"wbs_item_id": "cw1", "total_manday": 11,
                 "daily_plan": {"2026-02-17": 5, "2026-02-18": 6}},
                {"wbs_item_id": "fl1"}
            ]
        }"#;
        let baseline: Baseline = serde_json::from_str(json).unwrap();
        assert_eq!(baseline.total_manday(), 11.0);
        assert_eq!(baseline.notes, None);

        let plan = baseline.plan();
        let feb = |day| NaiveDate::from_ymd_opt(2026, 2, day).unwrap();
        assert_eq!(plan.planned("cw1", feb(18)), Some(6.0));
        assert_eq!(plan.planned("cw1", feb(19)), None);
        assert_eq!(plan.planned("fl1", feb(17)), None);
        assert!(!plan.is_empty());
        assert!(DailyPlan::default().is_empty());
    }
}
