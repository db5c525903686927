use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value, json};

use super::period::{MonthKey, WeekKey};
use super::status::CellStatus;
use super::wbs::WbsNode;

/// The editable value of one dated cell plus the shadow data needed to color it
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DayValue {
    pub actual: f64,
    pub planned: f64,
    pub qty_done: f64,
    pub is_future: bool,
}

impl DayValue {
    pub fn status(&self) -> CellStatus {
        CellStatus::classify(self.planned, self.actual, self.is_future)
    }
}

/// Summed actual and planned manpower for one week or month bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BucketSum {
    pub actual: f64,
    pub planned: f64,
}

impl BucketSum {
    pub fn is_zero(&self) -> bool {
        self.actual == 0.0 && self.planned == 0.0
    }

    /// Buckets are never future; they color by variance only
    pub fn status(&self) -> CellStatus {
        CellStatus::classify(self.planned, self.actual, false)
    }

    pub fn add(&mut self, other: BucketSum) {
        self.actual += other.actual;
        self.planned += other.planned;
    }
}

/// One grid row: a WBS node joined with its cells for the visible window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixRow {
    pub node: WbsNode,
    /// Dotted position number, e.g. `3.2`. Empty until numbering runs.
    pub number: String,
    /// One entry per visible date. Empty for summary rows.
    pub days: IndexMap<NaiveDate, DayValue>,
    pub weeks: IndexMap<WeekKey, BucketSum>,
    pub months: IndexMap<MonthKey, BucketSum>,
    pub done: f64,
    pub remaining: f64,
    pub progress_pct: f64,
    pub total_actual_manday: f64,
    pub working_days: u32,
    pub productivity_rate: f64,
}

impl MatrixRow {
    /// A row with no dated data and zeroed progress
    pub fn placeholder(node: WbsNode) -> Self {
        let remaining = node.quantity.max(0.0);
        MatrixRow {
            node,
            number: String::new(),
            days: IndexMap::new(),
            weeks: IndexMap::new(),
            months: IndexMap::new(),
            done: 0.0,
            remaining,
            progress_pct: 0.0,
            total_actual_manday: 0.0,
            working_days: 0,
            productivity_rate: 0.0,
        }
    }

    pub fn id(&self) -> &str {
        &self.node.id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.node.parent_id.as_deref()
    }

    pub fn is_summary(&self) -> bool {
        self.node.is_summary
    }

    pub fn level(&self) -> u32 {
        self.node.level
    }

    /// Σ actual over the visible dates
    pub fn window_actual(&self) -> f64 {
        self.days.values().map(|d| d.actual).sum()
    }

    /// Σ planned over the visible dates
    pub fn window_planned(&self) -> f64 {
        self.days.values().map(|d| d.planned).sum()
    }

    /// Flatten into the grid record consumed by the rendering layer.
    ///
    /// Dated fields: `<date>` actual, `_p_<date>` planned, `_f_<date>` 0/1.
    /// Buckets: `_wk_<key>`/`_mo_<key>` actual and `_p_wk_<key>`/`_p_mo_<key>`
    /// planned, each omitted when zero.
    pub fn to_grid_record(&self) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert("id".into(), json!(self.node.id));
        record.insert("parent_id".into(), json!(self.node.parent_id));
        record.insert("wbs_number".into(), json!(self.number));
        record.insert("wbs_code".into(), json!(self.node.code));
        record.insert("wbs_name".into(), json!(self.node.name));
        record.insert("qty".into(), json!(self.node.quantity));
        record.insert("unit".into(), json!(self.node.unit));
        record.insert("level".into(), json!(self.node.level));
        record.insert("is_summary".into(), json!(self.node.is_summary));
        record.insert("done".into(), json!(self.done));
        record.insert("remaining".into(), json!(self.remaining));
        record.insert("progress_pct".into(), json!(self.progress_pct));
        record.insert(
            "total_actual_manday".into(),
            json!(self.total_actual_manday),
        );
        record.insert("working_days".into(), json!(self.working_days));
        record.insert("productivity_rate".into(), json!(self.productivity_rate));

        if let Ok(Value::Object(attrs)) = serde_json::to_value(&self.node.attributes) {
            for (key, value) in attrs {
                record.entry(key).or_insert(value);
            }
        }

        for (date, day) in &self.days {
            record.insert(date.to_string(), json!(day.actual));
            record.insert(format!("_p_{}", date), json!(day.planned));
            record.insert(format!("_f_{}", date), json!(u8::from(day.is_future)));
        }
        for (key, sum) in &self.weeks {
            insert_bucket(&mut record, "wk", &key.to_string(), sum);
        }
        for (key, sum) in &self.months {
            insert_bucket(&mut record, "mo", &key.to_string(), sum);
        }
        record
    }
}

fn insert_bucket(record: &mut Map<String, Value>, kind: &str, key: &str, sum: &BucketSum) {
    if sum.actual != 0.0 {
        record.insert(format!("_{}_{}", kind, key), json!(sum.actual));
    }
    if sum.planned != 0.0 {
        record.insert(format!("_p_{}_{}", kind, key), json!(sum.planned));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_placeholder_row() {
        let node = WbsNode::new("cw", None, "CW", "Curtain wall")
            .summary()
            .with_quantity(250.0, "m2");
        let row = MatrixRow::placeholder(node);
        assert!(row.is_summary());
        assert_eq!(row.done, 0.0);
        assert_eq!(row.remaining, 250.0);
        assert!(row.days.is_empty());
    }

    #[test]
    fn test_grid_record_fields() {
        let mut node = WbsNode::new("a", Some("cw"), "CW-01", "East").with_quantity(100.0, "m2");
        node.attributes.building = Some("B1".into());
        let mut row = MatrixRow::placeholder(node);
        row.number = "1.1".into();
        row.days.insert(
            d("2026-02-17"),
            DayValue {
                actual: 5.0,
                planned: 4.0,
                qty_done: 1.0,
                is_future: false,
            },
        );
        row.days.insert(
            d("2026-02-18"),
            DayValue {
                is_future: true,
                ..Default::default()
            },
        );
        row.weeks.insert(
            WeekKey::of(d("2026-02-17")),
            BucketSum {
                actual: 5.0,
                planned: 0.0,
            },
        );

        let record = row.to_grid_record();
        assert_eq!(record["wbs_number"], "1.1");
        assert_eq!(record["building"], "B1");
        assert_eq!(record["2026-02-17"], 5.0);
        assert_eq!(record["_p_2026-02-17"], 4.0);
        assert_eq!(record["_f_2026-02-17"], 0);
        assert_eq!(record["_f_2026-02-18"], 1);
        assert_eq!(record["_wk_2026-KW08"], 5.0);
        assert!(!record.contains_key("_p_wk_2026-KW08"));
    }

    #[test]
    fn test_window_sums() {
        let mut row = MatrixRow::placeholder(WbsNode::new("a", None, "A", "A"));
        for (date, actual, planned) in [("2026-02-16", 2.0, 3.0), ("2026-02-17", 4.0, 1.0)] {
            row.days.insert(
                d(date),
                DayValue {
                    actual,
                    planned,
                    ..Default::default()
                },
            );
        }
        assert_eq!(row.window_actual(), 6.0);
        assert_eq!(row.window_planned(), 4.0);
    }
}
