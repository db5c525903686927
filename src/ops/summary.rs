use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Serialize;

use crate::model::cell::DayTotals;
use crate::model::row::MatrixRow;
use crate::ops::metrics;

/// Progress below this, with some work done, counts as behind
pub const BEHIND_BELOW_PCT: f64 = 30.0;

/// Headline counts over the leaf rows of a project
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSummary {
    pub total_items: usize,
    pub completed: usize,
    pub behind: usize,
    pub on_track: usize,
    /// Unweighted mean of item progress
    pub overall_progress: f64,
    /// Quantity-weighted progress, each item capped at 100%
    pub weighted_progress: f64,
    pub total_actual_manday: f64,
}

pub fn project_summary<'a, I>(rows: I) -> ProjectSummary
where
    I: IntoIterator<Item = &'a MatrixRow>,
{
    let leaves: Vec<&MatrixRow> = rows.into_iter().filter(|r| !r.is_summary()).collect();
    let total_items = leaves.len();
    let completed = leaves.iter().filter(|r| r.progress_pct >= 100.0).count();
    let behind = leaves
        .iter()
        .filter(|r| r.progress_pct < BEHIND_BELOW_PCT && r.done > 0.0)
        .count();
    let overall_progress = if total_items == 0 {
        0.0
    } else {
        let mean = leaves.iter().map(|r| r.progress_pct).sum::<f64>() / total_items as f64;
        (mean * 10.0).round() / 10.0
    };
    ProjectSummary {
        total_items,
        completed,
        behind,
        on_track: total_items - completed - behind,
        overall_progress,
        weighted_progress: metrics::weighted_progress(
            leaves.iter().map(|r| (r.node.quantity, r.done)),
        ),
        total_actual_manday: leaves.iter().map(|r| r.total_actual_manday).sum(),
    }
}

/// Crew and output totals over a date span
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodKpi {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub planned: f64,
    pub actual: f64,
    pub variance: f64,
    pub spi: f64,
    pub qty_done: f64,
    /// Σ qty_done / Σ actual
    pub avg_productivity: f64,
}

/// KPIs over the leaf rows' days within `from..=to`
pub fn period_kpi<'a, I>(rows: I, from: NaiveDate, to: NaiveDate) -> PeriodKpi
where
    I: IntoIterator<Item = &'a MatrixRow>,
{
    let mut planned = 0.0;
    let mut actual = 0.0;
    let mut qty_done = 0.0;
    for row in rows.into_iter().filter(|r| !r.is_summary()) {
        for (_, day) in row.days.iter().filter(|(d, _)| **d >= from && **d <= to) {
            planned += day.planned;
            actual += day.actual;
            qty_done += day.qty_done;
        }
    }
    PeriodKpi {
        from,
        to,
        planned,
        actual,
        variance: metrics::variance(actual, planned),
        spi: metrics::schedule_performance_index(planned, actual),
        qty_done,
        avg_productivity: metrics::productivity_rate(qty_done, actual),
    }
}

/// Per-date column totals over leaf rows, in date order
pub fn column_totals<'a, I>(rows: I) -> IndexMap<NaiveDate, DayTotals>
where
    I: IntoIterator<Item = &'a MatrixRow>,
{
    let mut totals: IndexMap<NaiveDate, DayTotals> = IndexMap::new();
    for row in rows.into_iter().filter(|r| !r.is_summary()) {
        for (date, day) in &row.days {
            let t = totals.entry(*date).or_default();
            t.planned += day.planned;
            t.actual += day.actual;
        }
    }
    totals.sort_keys();
    totals
}
