use std::collections::HashSet;

use chrono::NaiveDate;
use indexmap::IndexMap;

use crate::model::cell::{ContractError, DailyCell, DailyMatrixResponse, WbsProgress};
use crate::model::row::{DayValue, MatrixRow};
use crate::model::wbs::WbsNode;
use crate::ops::metrics;
use crate::ops::numbering::number_rows;
use crate::ops::tree::WbsTree;

/// Join the WBS tree with a daily matrix response over `dates`.
///
/// Produces one row per non-summary item in the feed and one placeholder per
/// summary node, numbered and in display order. Dates the server sent nothing
/// for become empty cells whose `is_future` is derived from `today`. Buckets
/// and roll-ups are left to the aggregator.
pub fn assemble(
    tree: &WbsTree,
    dates: &[NaiveDate],
    response: &DailyMatrixResponse,
    today: NaiveDate,
) -> Result<Vec<MatrixRow>, ContractError> {
    response.validate()?;
    if response.date_range != dates {
        return Err(ContractError::RangeMismatch {
            from: dates.first().copied().unwrap_or(today),
            expected: dates.len(),
            got: response.date_range.len(),
        });
    }

    let mut rows = Vec::with_capacity(tree.len());
    let mut seen: HashSet<&str> = HashSet::new();
    for item in &response.wbs_items {
        let Some(node) = tree.get(&item.id) else {
            tracing::warn!(item_id = %item.id, code = %item.wbs_code, "feed item not in WBS, skipping");
            continue;
        };
        if node.is_summary {
            tracing::debug!(item_id = %item.id, "feed carries a summary item, using placeholder");
            continue;
        }
        if !seen.insert(item.id.as_str()) {
            tracing::warn!(item_id = %item.id, "duplicate feed item, keeping the first");
            continue;
        }
        rows.push(leaf_row(node.clone(), item, dates, response, today));
    }

    for node in tree.nodes().filter(|n| n.is_summary) {
        rows.push(MatrixRow::placeholder(node.clone()));
    }

    number_rows(&mut rows);
    tracing::debug!(
        rows = rows.len(),
        dates = dates.len(),
        "assembled matrix rows"
    );
    Ok(rows)
}

fn leaf_row(
    node: WbsNode,
    item: &WbsProgress,
    dates: &[NaiveDate],
    response: &DailyMatrixResponse,
    today: NaiveDate,
) -> MatrixRow {
    let mut row = MatrixRow::placeholder(node);

    let mut days = IndexMap::with_capacity(dates.len());
    for &date in dates {
        let cell = response
            .cell(&item.id, date)
            .copied()
            .unwrap_or_else(|| DailyCell::missing(date, today));
        days.insert(
            date,
            DayValue {
                actual: cell.actual,
                planned: cell.planned,
                qty_done: cell.qty_done,
                is_future: cell.is_future,
            },
        );
    }
    row.days = days;

    let qty = row.node.quantity;
    row.done = item.done;
    row.remaining = metrics::remaining_qty(qty, item.done);
    row.progress_pct = metrics::progress_pct(qty, item.done);
    row.total_actual_manday = item.total_actual_manday;
    row.working_days = item.working_days;
    row.productivity_rate = item.productivity_rate;
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::cell::date_window;
    use crate::ops::tree::build_tree;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn progress(id: &str, code: &str, done: f64) -> WbsProgress {
        WbsProgress {
            id: id.into(),
            wbs_code: code.into(),
            wbs_name: code.into(),
            qty: 0.0,
            done,
            remaining: 0.0,
            progress_pct: 0.0,
            total_actual_manday: 12.0,
            working_days: 2,
            productivity_rate: 0.5,
        }
    }

    fn fixture() -> (WbsTree, Vec<NaiveDate>, DailyMatrixResponse) {
        let tree = build_tree(vec![
            WbsNode::new("cw", None, "CW", "Curtain wall").summary(),
            WbsNode::new("cw1", Some("cw"), "CW-01", "East").with_quantity(100.0, "m2"),
            WbsNode::new("cw2", Some("cw"), "CW-02", "West").with_quantity(150.0, "m2"),
            WbsNode::new("cw3", Some("cw"), "CW-03", "North").with_quantity(10.0, "m2"),
        ])
        .unwrap();
        let dates = date_window(d("2026-02-16"), d("2026-02-18")).unwrap();
        let mut matrix = HashMap::new();
        matrix.insert(
            "cw1".to_string(),
            HashMap::from([(
                d("2026-02-17"),
                DailyCell {
                    planned: 5.0,
                    actual: 5.0,
                    qty_done: 6.0,
                    is_future: false,
                },
            )]),
        );
        matrix.insert(
            "cw2".to_string(),
            HashMap::from([(
                d("2026-02-17"),
                DailyCell {
                    planned: 7.0,
                    actual: 9.0,
                    qty_done: 0.0,
                    is_future: false,
                },
            )]),
        );
        let response = DailyMatrixResponse {
            wbs_items: vec![
                progress("cw2", "CW-02", 200.0),
                progress("cw1", "CW-01", 25.0),
                progress("ghost", "GH-01", 1.0),
            ],
            date_range: dates.clone(),
            matrix,
            totals: IndexMap::new(),
        };
        (tree, dates, response)
    }

    #[test]
    fn test_rows_ordered_and_numbered() {
        let (tree, dates, response) = fixture();
        let rows = assemble(&tree, &dates, &response, d("2026-02-17")).unwrap();
        let got: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.id(), r.number.as_str()))
            .collect();
        // cw3 is not in the feed and gets no row; ghost is skipped
        assert_eq!(got, vec![("cw", "1"), ("cw1", "1.1"), ("cw2", "1.2")]);
    }

    #[test]
    fn test_missing_cells_default_with_future_flag() {
        let (tree, dates, response) = fixture();
        let rows = assemble(&tree, &dates, &response, d("2026-02-17")).unwrap();
        let cw1 = &rows[1];
        assert_eq!(cw1.days.len(), 3);
        let past = cw1.days[&d("2026-02-16")];
        assert_eq!(past, DayValue::default());
        let future = cw1.days[&d("2026-02-18")];
        assert!(future.is_future);
        assert_eq!(future.actual, 0.0);
        assert_eq!(cw1.days[&d("2026-02-17")].actual, 5.0);
    }

    #[test]
    fn test_server_future_flag_is_kept() {
        let (tree, dates, mut response) = fixture();
        response.matrix.get_mut("cw1").unwrap().insert(
            d("2026-02-16"),
            DailyCell {
                is_future: true,
                ..Default::default()
            },
        );
        let rows = assemble(&tree, &dates, &response, d("2026-02-17")).unwrap();
        assert!(rows[1].days[&d("2026-02-16")].is_future);
    }

    #[test]
    fn test_derived_scalars() {
        let (tree, dates, response) = fixture();
        let rows = assemble(&tree, &dates, &response, d("2026-02-17")).unwrap();
        let cw1 = &rows[1];
        assert_eq!(cw1.done, 25.0);
        assert_eq!(cw1.remaining, 75.0);
        assert_eq!(cw1.progress_pct, 25.0);
        assert_eq!(cw1.total_actual_manday, 12.0);
        assert_eq!(cw1.working_days, 2);
        let cw2 = &rows[2];
        assert_eq!(cw2.progress_pct, 100.0);
        assert_eq!(cw2.remaining, 0.0);
    }

    #[test]
    fn test_summary_placeholder_has_no_days() {
        let (tree, dates, response) = fixture();
        let rows = assemble(&tree, &dates, &response, d("2026-02-17")).unwrap();
        assert!(rows[0].is_summary());
        assert!(rows[0].days.is_empty());
        assert_eq!(rows[0].done, 0.0);
    }

    #[test]
    fn test_range_mismatch() {
        let (tree, _, response) = fixture();
        let other = date_window(d("2026-02-16"), d("2026-02-20")).unwrap();
        assert_eq!(
            assemble(&tree, &other, &response, d("2026-02-17")).unwrap_err(),
            ContractError::RangeMismatch {
                from: d("2026-02-16"),
                expected: 5,
                got: 3,
            }
        );
    }

    #[test]
    fn test_gap_in_range_rejected() {
        let (tree, _, mut response) = fixture();
        response.date_range = vec![d("2026-02-16"), d("2026-02-18")];
        let dates = response.date_range.clone();
        assert!(matches!(
            assemble(&tree, &dates, &response, d("2026-02-17")),
            Err(ContractError::NonContiguousRange { .. })
        ));
    }
}
