use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::model::baseline::Baseline;
use crate::model::cell::DayTotals;
use crate::model::period::{Granularity, MonthKey};
use crate::model::row::{BucketSum, DayValue, MatrixRow};
use crate::model::status::CellStatus;
use crate::ops::aggregate::{MonthColumn, WeekColumn};
use crate::ops::check::{CheckError, CheckResult, CheckWarning};
use crate::ops::coalesce::{FlushOutcome, RejectedEdit};
use crate::ops::pipeline::Grid;
use crate::ops::summary::{PeriodKpi, ProjectSummary};
use crate::util::unicode::{display_width, pad_left, pad_right, truncate_to_width};

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct GridJson {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub view: Granularity,
    pub dates: Vec<NaiveDate>,
    pub weeks: Vec<WeekColumn>,
    pub months: Vec<MonthColumn>,
    pub rows: Vec<Map<String, Value>>,
    pub totals: IndexMap<NaiveDate, DayTotals>,
}

#[derive(Serialize)]
pub struct TreeNodeJson {
    pub number: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub code: String,
    pub name: String,
    pub level: u32,
    pub is_summary: bool,
}

#[derive(Serialize)]
pub struct SummaryJson {
    pub project: String,
    pub summary: ProjectSummary,
    pub period: PeriodKpi,
}

#[derive(Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FlushJson {
    Applied {
        updated: usize,
    },
    Partial {
        updated: usize,
        rejected: Vec<RejectedEdit>,
    },
    TransportFailure {
        error: String,
        unsaved: usize,
    },
}

#[derive(Serialize)]
pub struct CheckJson<'a> {
    #[serde(flatten)]
    pub result: &'a CheckResult,
    pub recovery_entries: usize,
}

#[derive(Serialize)]
pub struct SetJson {
    pub item_id: String,
    pub date: NaiveDate,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qty_done: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<FlushJson>,
    pub unsaved: Vec<RejectedEdit>,
}

#[derive(Serialize)]
pub struct ApplyReportJson {
    pub edits: usize,
    pub invalid: Vec<String>,
    pub batches: Vec<FlushJson>,
    pub unsaved: Vec<RejectedEdit>,
}

/// A baseline without its per-day plan
#[derive(Serialize)]
pub struct BaselineJson {
    pub version: u32,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub approved_at: DateTime<Utc>,
    pub is_active: bool,
    pub items: usize,
    pub total_manday: f64,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

pub fn baseline_to_json(baseline: &Baseline) -> BaselineJson {
    BaselineJson {
        version: baseline.version,
        name: baseline.name.clone(),
        notes: baseline.notes.clone(),
        approved_at: baseline.approved_at,
        is_active: baseline.is_active,
        items: baseline
            .snapshots
            .iter()
            .filter(|s| !s.daily_plan.is_empty())
            .count(),
        total_manday: baseline.total_manday(),
    }
}

pub fn grid_to_json(grid: &Grid) -> GridJson {
    let ctx = grid.context();
    GridJson {
        from: ctx.from,
        to: ctx.to,
        view: ctx.granularity,
        dates: grid.dates().to_vec(),
        weeks: grid.week_columns(),
        months: grid.month_columns(),
        rows: grid.records(),
        totals: grid.totals(),
    }
}

pub fn row_to_tree_json(row: &MatrixRow) -> TreeNodeJson {
    TreeNodeJson {
        number: row.number.clone(),
        id: row.node.id.clone(),
        parent_id: row.node.parent_id.clone(),
        code: row.node.code.clone(),
        name: row.node.name.clone(),
        level: row.level(),
        is_summary: row.is_summary(),
    }
}

pub fn flush_to_json(outcome: &FlushOutcome) -> FlushJson {
    match outcome {
        FlushOutcome::Applied { updated } => FlushJson::Applied { updated: *updated },
        FlushOutcome::Partial { updated, rejected } => FlushJson::Partial {
            updated: *updated,
            rejected: rejected.clone(),
        },
        FlushOutcome::TransportFailure { error, unsaved } => FlushJson::TransportFailure {
            error: error.to_string(),
            unsaved: *unsaved,
        },
    }
}

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

const NAME_WIDTH: usize = 28;
const CELL_WIDTH: usize = 7;

/// Format a quantity with at most two decimals and no trailing zeros
pub fn format_number(value: f64) -> String {
    let s = format!("{:.2}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

/// Text of one day cell: value plus status marker, `~` alone for an empty
/// future day
pub fn format_day_cell(day: &DayValue) -> String {
    match day.status() {
        CellStatus::Empty => "·".to_string(),
        CellStatus::Future if day.actual == 0.0 => "~".to_string(),
        status => format!("{}{}", format_number(day.actual), status.marker()),
    }
}

pub fn format_bucket_cell(sum: Option<&BucketSum>) -> String {
    match sum {
        None => "·".to_string(),
        Some(sum) if sum.is_zero() => "·".to_string(),
        Some(sum) => format!("{}{}", format_number(sum.actual), sum.status().marker()),
    }
}

fn label_cell(row: &MatrixRow) -> String {
    let indent = "  ".repeat(row.level() as usize);
    let label = format!("{}{} {}", indent, row.node.code, row.node.name);
    pad_right(&truncate_to_width(&label, NAME_WIDTH), NAME_WIDTH)
}

fn column_labels(grid: &Grid) -> Vec<String> {
    match grid.context().granularity {
        Granularity::Day => grid
            .dates()
            .iter()
            .map(|d| d.format("%m-%d").to_string())
            .collect(),
        Granularity::Week => grid.week_columns().into_iter().map(|w| w.label).collect(),
        Granularity::Month => month_keys(grid.dates())
            .iter()
            .map(MonthKey::to_string)
            .collect(),
    }
}

fn month_keys(dates: &[NaiveDate]) -> Vec<MonthKey> {
    let mut keys: Vec<MonthKey> = Vec::new();
    for date in dates {
        let key = MonthKey::of(*date);
        if keys.last() != Some(&key) {
            keys.push(key);
        }
    }
    keys
}

fn row_cells(grid: &Grid, row: &MatrixRow) -> Vec<String> {
    match grid.context().granularity {
        Granularity::Day => grid
            .dates()
            .iter()
            .map(|d| match row.days.get(d) {
                Some(day) => format_day_cell(day),
                None => String::new(),
            })
            .collect(),
        Granularity::Week => grid
            .week_columns()
            .iter()
            .map(|w| format_bucket_cell(row.weeks.get(&w.key)))
            .collect(),
        Granularity::Month => month_keys(grid.dates())
            .iter()
            .map(|m| format_bucket_cell(row.months.get(m)))
            .collect(),
    }
}

/// Planned/actual totals of the visible leaf rows, one per column
fn footer_cells(grid: &Grid, rows: &[&MatrixRow]) -> Vec<String> {
    let leaves = || rows.iter().filter(|r| !r.is_summary());
    let cell = |sum: BucketSum| format_bucket_cell(Some(&sum));
    match grid.context().granularity {
        Granularity::Day => grid
            .dates()
            .iter()
            .map(|d| {
                let mut sum = BucketSum::default();
                for row in leaves() {
                    if let Some(day) = row.days.get(d) {
                        sum.add(BucketSum {
                            actual: day.actual,
                            planned: day.planned,
                        });
                    }
                }
                cell(sum)
            })
            .collect(),
        Granularity::Week => grid
            .week_columns()
            .iter()
            .map(|w| cell(sum_buckets(leaves().filter_map(|r| r.weeks.get(&w.key)))))
            .collect(),
        Granularity::Month => month_keys(grid.dates())
            .iter()
            .map(|m| cell(sum_buckets(leaves().filter_map(|r| r.months.get(m)))))
            .collect(),
    }
}

fn sum_buckets<'a>(sums: impl Iterator<Item = &'a BucketSum>) -> BucketSum {
    let mut total = BucketSum::default();
    for sum in sums {
        total.add(*sum);
    }
    total
}

/// Render the visible grid as a fixed-width table
pub fn format_grid(grid: &Grid) -> Vec<String> {
    let rows = grid.visible();
    let number_width = rows
        .iter()
        .map(|r| display_width(&r.number))
        .max()
        .unwrap_or(0)
        .max(3);

    let mut lines = Vec::new();
    let ctx = grid.context();
    lines.push(format!("{} .. {} ({})", ctx.from, ctx.to, granularity_name(ctx.granularity)));

    let mut header = format!(
        "{} {} {}",
        pad_right("No.", number_width),
        pad_right("Item", NAME_WIDTH),
        pad_left("Prog", 6)
    );
    for label in column_labels(grid) {
        header.push(' ');
        header.push_str(&pad_left(&label, CELL_WIDTH));
    }
    lines.push(header.trim_end().to_string());

    for row in &rows {
        let mut line = format!(
            "{} {} {}",
            pad_right(&row.number, number_width),
            label_cell(row),
            pad_left(&format!("{:.1}%", row.progress_pct), 6)
        );
        for cell in row_cells(grid, row) {
            line.push(' ');
            line.push_str(&pad_left(&cell, CELL_WIDTH));
        }
        lines.push(line.trim_end().to_string());
    }

    if rows.is_empty() {
        lines.push("(no rows)".to_string());
        return lines;
    }

    let mut footer = format!(
        "{} {} {}",
        pad_right("", number_width),
        pad_right("Σ", NAME_WIDTH),
        pad_left("", 6)
    );
    for cell in footer_cells(grid, &rows) {
        footer.push(' ');
        footer.push_str(&pad_left(&cell, CELL_WIDTH));
    }
    lines.push(footer.trim_end().to_string());
    lines
}

fn granularity_name(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Day => "daily",
        Granularity::Week => "weekly",
        Granularity::Month => "monthly",
    }
}

/// One line per row, indented by level
pub fn format_tree_line(row: &MatrixRow) -> String {
    let indent = "  ".repeat(row.level() as usize);
    let kind = if row.is_summary() {
        String::new()
    } else if row.node.unit.is_empty() {
        format!("  [{}]", format_number(row.node.quantity))
    } else {
        format!("  [{} {}]", format_number(row.node.quantity), row.node.unit)
    };
    format!(
        "{}{} {} {}{}",
        indent, row.number, row.node.code, row.node.name, kind
    )
}

pub fn format_summary(project: &str, summary: &ProjectSummary, period: &PeriodKpi) -> Vec<String> {
    vec![
        format!("== {} ==", project),
        format!(
            "items: {}  completed: {}  on track: {}  behind: {}",
            summary.total_items, summary.completed, summary.on_track, summary.behind
        ),
        format!(
            "progress: {:.1}% (weighted {:.1}%)  actual mandays: {}",
            summary.overall_progress,
            summary.weighted_progress,
            format_number(summary.total_actual_manday)
        ),
        String::new(),
        format!("period {} .. {}", period.from, period.to),
        format!(
            "planned: {}  actual: {}  variance: {}  SPI: {}",
            format_number(period.planned),
            format_number(period.actual),
            format_number(period.variance),
            format_number(period.spi)
        ),
        format!(
            "qty done: {}  productivity: {}/manday",
            format_number(period.qty_done),
            format_number(period.avg_productivity)
        ),
    ]
}

pub fn format_flush(outcome: &FlushOutcome) -> Vec<String> {
    match outcome {
        FlushOutcome::Applied { updated } => vec![format!("saved {} cell(s)", updated)],
        FlushOutcome::Partial { updated, rejected } => {
            let mut lines = vec![format!(
                "saved {} cell(s), {} rejected",
                updated,
                rejected.len()
            )];
            lines.extend(rejected.iter().map(format_rejected));
            lines
        }
        FlushOutcome::TransportFailure { error, unsaved } => {
            vec![format!("not saved ({} cell(s)): {}", unsaved, error)]
        }
    }
}

pub fn format_rejected(rejected: &RejectedEdit) -> String {
    format!(
        "  {} {} = {}: {}",
        rejected.edit.item_id,
        rejected.edit.date,
        format_number(rejected.edit.actual_manpower),
        rejected.error
    )
}

pub fn format_check(result: &CheckResult) -> Vec<String> {
    let mut lines = Vec::new();
    if !result.errors.is_empty() {
        lines.push("Errors:".to_string());
        for error in &result.errors {
            lines.push(format!("  {}", describe_check_error(error)));
        }
    }
    if !result.warnings.is_empty() {
        if !result.errors.is_empty() {
            lines.push(String::new());
        }
        lines.push("Warnings:".to_string());
        for warning in &result.warnings {
            lines.push(format!("  {}", describe_check_warning(warning)));
        }
    }
    lines
}

fn describe_check_error(error: &CheckError) -> String {
    match error {
        CheckError::DuplicateId { id, count } => format!("id {} appears {} times", id, count),
        CheckError::DanglingParent { id, parent_id } => {
            format!("{} has unknown parent {}", id, parent_id)
        }
        CheckError::Cycle { ids } => format!("cycle through {}", ids.join(", ")),
    }
}

fn describe_check_warning(warning: &CheckWarning) -> String {
    match warning {
        CheckWarning::ZeroQuantity { code, .. } => format!("{} has no quantity", code),
        CheckWarning::EmptySummary { code, .. } => format!("summary {} has no children", code),
        CheckWarning::LeafWithChildren { code, .. } => {
            format!("{} has children but is not a summary", code)
        }
        CheckWarning::StaleLevel { id, stored, actual } => {
            format!("{} stores level {} but sits at level {}", id, stored, actual)
        }
        CheckWarning::OrphanAllocation { item_id, date } => {
            format!("allocation for unknown item {} on {}", item_id, date)
        }
        CheckWarning::SummaryAllocation { item_id, date } => {
            format!("allocation on summary item {} on {}", item_id, date)
        }
    }
}

/// `* v2 Re-plan  (2026-02-10, 3 item(s), 120 mandays)`, starred when active
pub fn format_baseline_line(baseline: &Baseline) -> String {
    let summary = baseline_to_json(baseline);
    format!(
        "{} v{} {}  ({}, {} item(s), {} mandays)",
        if baseline.is_active { "*" } else { " " },
        baseline.version,
        baseline.name,
        baseline.approved_at.format("%Y-%m-%d"),
        summary.items,
        format_number(summary.total_manday)
    )
}

/// Header line plus one line per planned item. `label` maps an item id to
/// what is shown for it.
pub fn format_baseline(baseline: &Baseline, label: impl Fn(&str) -> String) -> Vec<String> {
    let mut lines = vec![format_baseline_line(baseline)];
    if let Some(notes) = &baseline.notes {
        lines.push(format!("  {}", notes));
    }
    for snap in baseline.snapshots.iter().filter(|s| !s.daily_plan.is_empty()) {
        let span = match (snap.start_date, snap.end_date) {
            (Some(start), Some(end)) => format!("{} .. {}", start, end),
            _ => String::new(),
        };
        lines.push(format!(
            "  {}  {}  {} mandays, {}/day",
            label(&snap.wbs_item_id),
            span,
            format_number(snap.total_manday),
            format_number(snap.manpower_per_day)
        ));
    }
    lines
}
