use chrono::NaiveDate;
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::model::cell::{ContractError, DailyMatrixResponse, DayTotals, date_window};
use crate::model::edit::{CellEdit, PendingEdit};
use crate::model::filter::{FilterState, ViewContext};
use crate::model::row::MatrixRow;
use crate::model::wbs::WbsNode;
use crate::ops::aggregate::{self, MonthColumn, WeekColumn};
use crate::ops::assemble::assemble;
use crate::ops::coalesce::{ValidationError, validate_value};
use crate::ops::filter::{RowFilter, visible_rows};
use crate::ops::summary::{self, PeriodKpi, ProjectSummary};
use crate::ops::tree::{StructuralError, WbsTree, build_tree};

/// Error type for building a grid. Nothing is rendered when this is returned.
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error("invalid search text: {0}")]
    Search(#[from] regex::Error),
}

/// The derived view of one project over one date window.
///
/// A snapshot: after a successful batch the caller builds a new grid from
/// fresh data instead of patching this one.
#[derive(Debug, Clone)]
pub struct Grid {
    tree: WbsTree,
    dates: Vec<NaiveDate>,
    rows: Vec<MatrixRow>,
    context: ViewContext,
    filter: RowFilter,
}

/// Tree build, assembly, numbering, aggregation and filter compilation in one
/// pass
pub fn build_grid(
    wbs: Vec<WbsNode>,
    response: &DailyMatrixResponse,
    context: ViewContext,
) -> Result<Grid, MatrixError> {
    let tree = build_tree(wbs)?;
    let dates = date_window(context.from, context.to)?;
    let mut rows = assemble(&tree, &dates, response, context.today)?;
    aggregate::aggregate(&mut rows, &tree);
    let filter = RowFilter::new(context.filters.clone())?;
    Ok(Grid {
        tree,
        dates,
        rows,
        context,
        filter,
    })
}

impl Grid {
    pub fn tree(&self) -> &WbsTree {
        &self.tree
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn context(&self) -> &ViewContext {
        &self.context
    }

    /// All rows in display order, ignoring filters and collapse
    pub fn rows(&self) -> &[MatrixRow] {
        &self.rows
    }

    pub fn row(&self, id: &str) -> Option<&MatrixRow> {
        self.rows.iter().find(|r| r.id() == id)
    }

    /// Rows after collapse and filters
    pub fn visible(&self) -> Vec<&MatrixRow> {
        visible_rows(&self.rows, &self.tree, &self.context.collapsed, &self.filter)
    }

    pub fn set_filters(&mut self, filters: FilterState) -> Result<(), MatrixError> {
        self.filter = RowFilter::new(filters.clone())?;
        self.context.filters = filters;
        Ok(())
    }

    pub fn toggle_group(&mut self, id: &str) {
        self.context.toggle_group(id);
    }

    pub fn week_columns(&self) -> Vec<WeekColumn> {
        aggregate::week_columns(self.context.from, self.context.to)
    }

    pub fn month_columns(&self) -> Vec<MonthColumn> {
        aggregate::month_columns(self.context.from, self.context.to)
    }

    pub fn summary(&self) -> ProjectSummary {
        summary::project_summary(&self.rows)
    }

    /// KPIs over the visible rows for the whole window
    pub fn period_kpi(&self) -> PeriodKpi {
        summary::period_kpi(self.visible(), self.context.from, self.context.to)
    }

    pub fn totals(&self) -> IndexMap<NaiveDate, DayTotals> {
        summary::column_totals(&self.rows)
    }

    /// Grid records for the visible rows
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.visible()
            .into_iter()
            .map(MatrixRow::to_grid_record)
            .collect()
    }

    /// Check an edit against this grid and turn it into a pending update.
    ///
    /// The item must be a known non-summary node and the date inside the
    /// window; the value must lie in `0..=max_manpower`.
    pub fn check_edit(
        &self,
        edit: &CellEdit,
        max_manpower: f64,
    ) -> Result<PendingEdit, ValidationError> {
        validate_value(&edit.item_id, edit.date, edit.new_value, max_manpower)?;
        if let Some(qty) = edit.qty_done
            && !(qty.is_finite() && qty >= 0.0)
        {
            return Err(ValidationError::BadQuantity {
                item_id: edit.item_id.clone(),
                date: edit.date,
                value: qty,
            });
        }
        let node = self
            .tree
            .get(&edit.item_id)
            .ok_or_else(|| ValidationError::UnknownItem(edit.item_id.clone()))?;
        if node.is_summary {
            return Err(ValidationError::SummaryItem(edit.item_id.clone()));
        }
        if edit.date < self.context.from || edit.date > self.context.to {
            return Err(ValidationError::OutsideRange {
                date: edit.date,
                from: self.context.from,
                to: self.context.to,
            });
        }
        Ok(PendingEdit::from(edit.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::cell::{DailyCell, WbsProgress};
    use crate::model::period::WeekKey;
    use crate::model::status::CellStatus;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn item(id: &str, code: &str, qty: f64, done: f64) -> WbsProgress {
        WbsProgress {
            id: id.into(),
            wbs_code: code.into(),
            wbs_name: code.into(),
            qty,
            done,
            remaining: 0.0,
            progress_pct: 0.0,
            total_actual_manday: 0.0,
            working_days: 0,
            productivity_rate: 0.0,
        }
    }

    fn curtain_wall() -> (Vec<WbsNode>, DailyMatrixResponse, ViewContext) {
        let wbs = vec![
            WbsNode::new("cw", None, "CW", "Curtain wall").summary(),
            WbsNode::new("cw1", Some("cw"), "CW-01", "East").with_quantity(100.0, "m2"),
            WbsNode::new("cw2", Some("cw"), "CW-02", "West").with_quantity(150.0, "m2"),
        ];
        let from = d("2026-02-16");
        let to = d("2026-02-22");
        let cell = |planned, actual| DailyCell {
            planned,
            actual,
            qty_done: 0.0,
            is_future: false,
        };
        let response = DailyMatrixResponse {
            wbs_items: vec![item("cw1", "CW-01", 100.0, 10.0), item("cw2", "CW-02", 150.0, 0.0)],
            date_range: date_window(from, to).unwrap(),
            matrix: HashMap::from([
                (
                    "cw1".to_string(),
                    HashMap::from([(d("2026-02-17"), cell(5.0, 5.0))]),
                ),
                (
                    "cw2".to_string(),
                    HashMap::from([
                        (d("2026-02-17"), cell(7.0, 9.0)),
                        (d("2026-02-18"), cell(7.0, 6.0)),
                    ]),
                ),
            ]),
            totals: IndexMap::new(),
        };
        (wbs, response, ViewContext::new(from, to, d("2026-02-18")))
    }

    #[test]
    fn test_curtain_wall_scenario() {
        let (wbs, response, ctx) = curtain_wall();
        let grid = build_grid(wbs, &response, ctx).unwrap();

        let numbers: Vec<(&str, &str)> = grid
            .rows()
            .iter()
            .map(|r| (r.node.code.as_str(), r.number.as_str()))
            .collect();
        assert_eq!(numbers, vec![("CW", "1"), ("CW-01", "1.1"), ("CW-02", "1.2")]);

        let feb17 = d("2026-02-17");
        assert_eq!(grid.row("cw1").unwrap().days[&feb17].status(), CellStatus::Equal);
        assert_eq!(grid.row("cw2").unwrap().days[&feb17].status(), CellStatus::Over);
        assert_eq!(
            grid.row("cw2").unwrap().days[&d("2026-02-19")].status(),
            CellStatus::Future
        );

        let kw = WeekKey::of(feb17);
        assert_eq!(grid.row("cw2").unwrap().weeks[&kw].actual, 15.0);
        assert_eq!(grid.row("cw").unwrap().weeks[&kw].actual, 20.0);
        assert_eq!(grid.row("cw").unwrap().weeks[&kw].planned, 19.0);
    }

    #[test]
    fn test_structural_error_aborts() {
        let (mut wbs, response, ctx) = curtain_wall();
        wbs[1].parent_id = Some("nope".into());
        assert!(matches!(
            build_grid(wbs, &response, ctx),
            Err(MatrixError::Structural(StructuralError::DanglingParent { .. }))
        ));
    }

    #[test]
    fn test_filters_and_collapse_on_grid() {
        let (wbs, response, ctx) = curtain_wall();
        let mut grid = build_grid(wbs, &response, ctx).unwrap();
        grid.set_filters(FilterState {
            search: "west".into(),
            ..Default::default()
        })
        .unwrap();
        let ids: Vec<&str> = grid.visible().iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["cw", "cw2"]);

        grid.toggle_group("cw");
        let ids: Vec<&str> = grid.visible().iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["cw"]);
    }

    #[test]
    fn test_kpis_and_totals() {
        let (wbs, response, ctx) = curtain_wall();
        let grid = build_grid(wbs, &response, ctx).unwrap();
        let kpi = grid.period_kpi();
        assert_eq!(kpi.planned, 19.0);
        assert_eq!(kpi.actual, 20.0);
        assert_eq!(kpi.variance, 1.0);
        let totals = grid.totals();
        assert_eq!(totals.len(), 7);
        assert_eq!(totals[&d("2026-02-17")].actual, 14.0);
        assert_eq!(grid.summary().total_items, 2);
        assert_eq!(grid.week_columns().len(), 1);
    }

    #[test]
    fn test_records_for_visible_rows() {
        let (wbs, response, ctx) = curtain_wall();
        let grid = build_grid(wbs, &response, ctx).unwrap();
        let records = grid.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2]["2026-02-17"], 9.0);
        assert_eq!(records[2]["_p_2026-02-17"], 7.0);
    }
}
