use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A raw edit event from the grid surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellEdit {
    pub item_id: String,
    pub date: NaiveDate,
    pub new_value: f64,
    /// Quantity completed that day, when the edit reports progress too
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qty_done: Option<f64>,
}

impl CellEdit {
    pub fn new(item_id: &str, date: NaiveDate, new_value: f64) -> Self {
        CellEdit {
            item_id: item_id.to_string(),
            date,
            new_value,
            qty_done: None,
        }
    }

    pub fn with_qty_done(mut self, qty_done: f64) -> Self {
        self.qty_done = Some(qty_done);
        self
    }

    pub fn key(&self) -> EditKey {
        (self.item_id.clone(), self.date)
    }
}

/// Coalescing key: one pending value per (item, date)
pub type EditKey = (String, NaiveDate);

/// A queued cell update, as sent to the allocation-write endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEdit {
    #[serde(rename = "wbs_id", alias = "item_id")]
    pub item_id: String,
    pub date: NaiveDate,
    pub actual_manpower: f64,
    /// Left untouched on the stored cell when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qty_done: Option<f64>,
}

impl PendingEdit {
    pub fn key(&self) -> EditKey {
        (self.item_id.clone(), self.date)
    }

    /// Overwrite with a newer edit of the same cell. A quantity reported
    /// earlier survives a newer edit that carries none.
    pub fn merge(&mut self, newer: PendingEdit) {
        let qty_done = newer.qty_done.or(self.qty_done);
        *self = newer;
        self.qty_done = qty_done;
    }
}

impl From<CellEdit> for PendingEdit {
    fn from(edit: CellEdit) -> Self {
        PendingEdit {
            item_id: edit.item_id,
            date: edit.date,
            actual_manpower: edit.new_value,
            qty_done: edit.qty_done,
        }
    }
}

/// Where a batch originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditSource {
    #[default]
    Grid,
    Chat,
}

/// One batched mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub updates: Vec<PendingEdit>,
    #[serde(default)]
    pub source: EditSource,
}

/// A per-cell rejection reported by the write endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellError {
    #[serde(rename = "wbs_id", alias = "item_id")]
    pub item_id: String,
    pub date: NaiveDate,
    pub error: String,
}

/// The write endpoint's reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub updated_count: usize,
    #[serde(default)]
    pub errors: Vec<CellError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_request_wire_shape() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let request = BatchRequest {
            updates: vec![CellEdit::new("A", date, 8.0).into()],
            source: EditSource::Grid,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "updates": [{"wbs_id": "A", "date": "2026-02-01", "actual_manpower": 8.0}],
                "source": "grid"
            })
        );
    }

    #[test]
    fn test_qty_done_on_the_wire_only_when_set() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let edit: PendingEdit = CellEdit::new("A", date, 4.0).with_qty_done(12.5).into();
        let value = serde_json::to_value(&edit).unwrap();
        assert_eq!(value["qty_done"], 12.5);

        let parsed: PendingEdit =
            serde_json::from_str(r#"{"wbs_id": "A", "date": "2026-02-01", "actual_manpower": 2}"#)
                .unwrap();
        assert_eq!(parsed.qty_done, None);
    }

    #[test]
    fn test_merge_keeps_earlier_quantity() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let mut edit: PendingEdit = CellEdit::new("A", date, 4.0).with_qty_done(3.0).into();
        edit.merge(CellEdit::new("A", date, 6.0).into());
        assert_eq!((edit.actual_manpower, edit.qty_done), (6.0, Some(3.0)));
        edit.merge(CellEdit::new("A", date, 6.0).with_qty_done(5.0).into());
        assert_eq!(edit.qty_done, Some(5.0));
    }

    #[test]
    fn test_batch_response_accepts_both_id_names() {
        let json = r#"{"updated_count": 1, "errors": [
            {"wbs_id": "A", "date": "2026-02-01", "error": "locked"},
            {"item_id": "B", "date": "2026-02-02", "error": "unknown item"}
        ]}"#;
        let response: BatchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.updated_count, 1);
        assert_eq!(response.errors[0].item_id, "A");
        assert_eq!(response.errors[1].item_id, "B");
    }

    #[test]
    fn test_batch_response_errors_default_empty() {
        let response: BatchResponse = serde_json::from_str(r#"{"updated_count": 3}"#).unwrap();
        assert!(response.errors.is_empty());
    }
}
