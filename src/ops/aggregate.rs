use std::collections::HashMap;

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Serialize;

use crate::model::period::{MonthKey, WeekKey};
use crate::model::row::{BucketSum, MatrixRow};
use crate::ops::metrics;
use crate::ops::tree::WbsTree;

/// Recompute a row's week and month buckets from its days.
///
/// Buckets start from scratch every time, so repeated calls agree. A bucket
/// with neither actual nor planned crew is dropped.
pub fn bucket_days(row: &mut MatrixRow) {
    let mut weeks: IndexMap<WeekKey, BucketSum> = IndexMap::new();
    let mut months: IndexMap<MonthKey, BucketSum> = IndexMap::new();
    for (date, day) in &row.days {
        let sum = BucketSum {
            actual: day.actual,
            planned: day.planned,
        };
        weeks.entry(WeekKey::of(*date)).or_default().add(sum);
        months.entry(MonthKey::of(*date)).or_default().add(sum);
    }
    weeks.retain(|_, s| !s.is_zero());
    months.retain(|_, s| !s.is_zero());
    row.weeks = weeks;
    row.months = months;
}

struct RollUp {
    weeks: IndexMap<WeekKey, BucketSum>,
    months: IndexMap<MonthKey, BucketSum>,
    manday: f64,
    working_days: u32,
    done: f64,
    remaining: f64,
    progress_pct: f64,
}

/// Fill summary rows from the leaf rows beneath them.
///
/// Only non-summary descendants present in `rows` contribute. Summary rows
/// keep no per-date values of their own. `done` counts each leaf up to its
/// quantity, so `done`, `remaining` and `progress_pct` agree.
pub fn roll_up(rows: &mut [MatrixRow], tree: &WbsTree) {
    let index: HashMap<&str, usize> = rows
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id(), i))
        .collect();

    let mut updates: Vec<(usize, RollUp)> = Vec::new();
    for (i, row) in rows.iter().enumerate().filter(|(_, r)| r.is_summary()) {
        let leaves: Vec<&MatrixRow> = tree
            .descendants(row.id())
            .into_iter()
            .filter(|n| !n.is_summary)
            .filter_map(|n| index.get(n.id.as_str()).map(|&j| &rows[j]))
            .collect();

        let mut weeks: IndexMap<WeekKey, BucketSum> = IndexMap::new();
        let mut months: IndexMap<MonthKey, BucketSum> = IndexMap::new();
        let mut manday = 0.0;
        let mut working_days = 0;
        for leaf in &leaves {
            for (key, sum) in &leaf.weeks {
                weeks.entry(*key).or_default().add(*sum);
            }
            for (key, sum) in &leaf.months {
                months.entry(*key).or_default().add(*sum);
            }
            manday += leaf.total_actual_manday;
            working_days += leaf.working_days;
        }
        weeks.sort_keys();
        months.sort_keys();
        let (qty, done) = leaves
            .iter()
            .filter(|l| l.node.quantity > 0.0)
            .fold((0.0, 0.0), |(qty, done), l| {
                (qty + l.node.quantity, done + l.done.clamp(0.0, l.node.quantity))
            });
        let progress_pct =
            metrics::weighted_progress(leaves.iter().map(|l| (l.node.quantity, l.done)));
        updates.push((
            i,
            RollUp {
                weeks,
                months,
                manday,
                working_days,
                done,
                remaining: metrics::remaining_qty(qty, done),
                progress_pct,
            },
        ));
    }

    for (i, r) in updates {
        let row = &mut rows[i];
        row.days.clear();
        row.weeks = r.weeks;
        row.months = r.months;
        row.total_actual_manday = r.manday;
        row.working_days = r.working_days;
        row.done = r.done;
        row.remaining = r.remaining;
        row.progress_pct = r.progress_pct;
    }
}

/// Bucket every leaf row, then roll the buckets up into summary rows
pub fn aggregate(rows: &mut [MatrixRow], tree: &WbsTree) {
    for row in rows.iter_mut().filter(|r| !r.is_summary()) {
        bucket_days(row);
    }
    roll_up(rows, tree);
}

/// One ISO week column of the weekly view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekColumn {
    pub key: WeekKey,
    /// e.g. `KW08`
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Month of the week's Monday, used to group week columns
    pub month: MonthKey,
}

/// A month header spanning its week columns
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthColumn {
    pub key: MonthKey,
    pub weeks: Vec<WeekKey>,
}

/// Every ISO week touching `from..=to`, in order
pub fn week_columns(from: NaiveDate, to: NaiveDate) -> Vec<WeekColumn> {
    let mut columns: Vec<WeekColumn> = Vec::new();
    for date in from.iter_days().take_while(|d| *d <= to) {
        let key = WeekKey::of(date);
        if columns.last().is_some_and(|c| c.key == key) {
            continue;
        }
        let start = key.monday().unwrap_or(date);
        columns.push(WeekColumn {
            key,
            label: key.label(),
            start,
            end: key.sunday().unwrap_or(date),
            month: MonthKey::of(start),
        });
    }
    columns
}

/// Week columns grouped under the month of each week's Monday
pub fn month_columns(from: NaiveDate, to: NaiveDate) -> Vec<MonthColumn> {
    let mut months: Vec<MonthColumn> = Vec::new();
    for week in week_columns(from, to) {
        match months.last_mut() {
            Some(last) if last.key == week.month => last.weeks.push(week.key),
            _ => months.push(MonthColumn {
                key: week.month,
                weeks: vec![week.key],
            }),
        }
    }
    months
}
