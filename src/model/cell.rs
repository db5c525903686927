use std::collections::HashMap;

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One (item, date) fact of the allocation matrix
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyCell {
    #[serde(default)]
    pub planned: f64,
    #[serde(default)]
    pub actual: f64,
    #[serde(default)]
    pub qty_done: f64,
    /// Authoritative: fixed by the server when the matrix is built
    #[serde(default)]
    pub is_future: bool,
}

impl DailyCell {
    /// The cell used for a date the server sent nothing for
    pub fn missing(date: NaiveDate, today: NaiveDate) -> Self {
        DailyCell {
            is_future: date > today,
            ..DailyCell::default()
        }
    }
}

/// Per-item progress row from the allocation-progress feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WbsProgress {
    pub id: String,
    pub wbs_code: String,
    pub wbs_name: String,
    #[serde(default)]
    pub qty: f64,
    #[serde(default)]
    pub done: f64,
    #[serde(default)]
    pub remaining: f64,
    #[serde(default)]
    pub progress_pct: f64,
    #[serde(default)]
    pub total_actual_manday: f64,
    #[serde(default)]
    pub working_days: u32,
    #[serde(default)]
    pub productivity_rate: f64,
}

/// Column totals for one date
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DayTotals {
    pub planned: f64,
    pub actual: f64,
}

/// The daily matrix endpoint response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyMatrixResponse {
    pub wbs_items: Vec<WbsProgress>,
    pub date_range: Vec<NaiveDate>,
    /// item id → date → cell (sparse)
    #[serde(default)]
    pub matrix: HashMap<String, HashMap<NaiveDate, DailyCell>>,
    #[serde(default)]
    pub totals: IndexMap<NaiveDate, DayTotals>,
}

/// The response violates the shape the assembler relies on
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContractError {
    #[error("date_range is not contiguous: {prev} is followed by {next}")]
    NonContiguousRange { prev: NaiveDate, next: NaiveDate },
    #[error("negative {field} for {item_id} on {date}")]
    NegativeValue {
        item_id: String,
        date: NaiveDate,
        field: &'static str,
    },
    #[error("invalid date window: {from} is after {to}")]
    InvertedWindow { from: NaiveDate, to: NaiveDate },
    #[error("date_range has {got} date(s) but the view expects {expected} starting {from}")]
    RangeMismatch {
        from: NaiveDate,
        expected: usize,
        got: usize,
    },
}

impl DailyMatrixResponse {
    /// Check that `date_range` is ascending with no gaps and that every cell
    /// holds non-negative numbers.
    pub fn validate(&self) -> Result<(), ContractError> {
        for pair in self.date_range.windows(2) {
            if pair[0].succ_opt() != Some(pair[1]) {
                return Err(ContractError::NonContiguousRange {
                    prev: pair[0],
                    next: pair[1],
                });
            }
        }
        for (item_id, cells) in &self.matrix {
            for (date, cell) in cells {
                let negative = [
                    ("planned", cell.planned),
                    ("actual", cell.actual),
                    ("qty_done", cell.qty_done),
                ]
                .into_iter()
                .find(|(_, v)| *v < 0.0);
                if let Some((field, _)) = negative {
                    return Err(ContractError::NegativeValue {
                        item_id: item_id.clone(),
                        date: *date,
                        field,
                    });
                }
            }
        }
        Ok(())
    }

    /// Look up a single cell, if the server sent one
    pub fn cell(&self, item_id: &str, date: NaiveDate) -> Option<&DailyCell> {
        self.matrix.get(item_id).and_then(|cells| cells.get(&date))
    }
}

/// Every date from `from` to `to` inclusive
pub fn date_window(from: NaiveDate, to: NaiveDate) -> Result<Vec<NaiveDate>, ContractError> {
    if from > to {
        return Err(ContractError::InvertedWindow { from, to });
    }
    Ok(from.iter_days().take_while(|d| *d <= to).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_deserialize_response() {
        let json = r#"{
            "wbs_items": [{"id": "a", "wbs_code": "A", "wbs_name": "Alpha", "qty": 10,
                           "done": 2, "remaining": 8, "progress_pct": 20,
                           "total_actual_manday": 4, "working_days": 2, "productivity_rate": 0.5}],
            "date_range": ["2026-02-16", "2026-02-17"],
            "matrix": {"a": {"2026-02-17": {"planned": 5, "actual": 5, "qty_done": 1, "is_future": false}}},
            "totals": {"2026-02-17": {"planned": 5, "actual": 5}}
        }"#;
        let response: DailyMatrixResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.date_range, vec![d("2026-02-16"), d("2026-02-17")]);
        assert_eq!(response.cell("a", d("2026-02-17")).unwrap().actual, 5.0);
        assert!(response.cell("a", d("2026-02-16")).is_none());
        assert!(response.validate().is_ok());
    }

    #[test]
    fn test_validate_gap() {
        let response = DailyMatrixResponse {
            date_range: vec![d("2026-02-16"), d("2026-02-18")],
            ..Default::default()
        };
        assert_eq!(
            response.validate(),
            Err(ContractError::NonContiguousRange {
                prev: d("2026-02-16"),
                next: d("2026-02-18"),
            })
        );
    }

    #[test]
    fn test_validate_descending() {
        let response = DailyMatrixResponse {
            date_range: vec![d("2026-02-17"), d("2026-02-16")],
            ..Default::default()
        };
        assert!(response.validate().is_err());
    }

    #[test]
    fn test_validate_negative_cell() {
        let mut response = DailyMatrixResponse {
            date_range: vec![d("2026-02-16")],
            ..Default::default()
        };
        response.matrix.entry("a".into()).or_default().insert(
            d("2026-02-16"),
            DailyCell {
                actual: -1.0,
                ..Default::default()
            },
        );
        assert!(matches!(
            response.validate(),
            Err(ContractError::NegativeValue { field: "actual", .. })
        ));
    }

    #[test]
    fn test_missing_cell_future_flag() {
        let today = d("2026-02-17");
        assert!(!DailyCell::missing(d("2026-02-17"), today).is_future);
        assert!(DailyCell::missing(d("2026-02-18"), today).is_future);
        assert_eq!(DailyCell::missing(d("2026-02-18"), today).actual, 0.0);
    }

    #[test]
    fn test_date_window() {
        let days = date_window(d("2026-02-27"), d("2026-03-02")).unwrap();
        assert_eq!(days.len(), 4);
        assert_eq!(days[1], d("2026-02-28"));
        assert_eq!(days[2], d("2026-03-01"));
        assert!(date_window(d("2026-03-02"), d("2026-03-01")).is_err());
        assert_eq!(date_window(d("2026-03-01"), d("2026-03-01")).unwrap().len(), 1);
    }
}
