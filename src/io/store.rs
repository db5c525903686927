use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::io::lock::WriteLock;
use crate::io::project_io::{ProjectError, read_json_or_default, write_json};
use crate::io::recovery::{RecoveryCategory, RecoveryEntry, log_recovery};
use crate::model::baseline::DailyPlan;
use crate::model::cell::{
    ContractError, DailyCell, DailyMatrixResponse, DayTotals, WbsProgress, date_window,
};
use crate::model::edit::{BatchRequest, BatchResponse, CellError, EditKey};
use crate::ops::metrics;
use crate::ops::session::{BatchSink, TransportError};
use crate::ops::tree::WbsTree;

pub const ALLOCATIONS_FILE: &str = "allocations.json";

/// One stored (item, date) allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub wbs_item_id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub planned_manpower: f64,
    #[serde(default)]
    pub actual_manpower: f64,
    #[serde(default)]
    pub qty_done: f64,
}

impl AllocationRecord {
    fn empty(item_id: &str, date: NaiveDate) -> Self {
        AllocationRecord {
            wbs_item_id: item_id.to_string(),
            date,
            planned_manpower: 0.0,
            actual_manpower: 0.0,
            qty_done: 0.0,
        }
    }
}

/// The local stand-in for the allocation endpoints: serves the daily matrix
/// and applies batched updates.
#[derive(Debug, Clone, Default)]
pub struct AllocationStore {
    records: IndexMap<EditKey, AllocationRecord>,
}

impl AllocationStore {
    /// Later records for the same (item, date) replace earlier ones
    pub fn from_records(records: Vec<AllocationRecord>) -> Self {
        let mut map = IndexMap::with_capacity(records.len());
        for record in records {
            map.insert((record.wbs_item_id.clone(), record.date), record);
        }
        AllocationStore { records: map }
    }

    pub fn load(data_dir: &Path) -> Result<Self, ProjectError> {
        let records: Vec<AllocationRecord> =
            read_json_or_default(&data_dir.join(ALLOCATIONS_FILE))?;
        Ok(Self::from_records(records))
    }

    /// Write all records, sorted by date then item
    pub fn save(&self, data_dir: &Path) -> Result<(), ProjectError> {
        let mut records: Vec<&AllocationRecord> = self.records.values().collect();
        records.sort_by(|a, b| (a.date, &a.wbs_item_id).cmp(&(b.date, &b.wbs_item_id)));
        write_json(&data_dir.join(ALLOCATIONS_FILE), &records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, item_id: &str, date: NaiveDate) -> Option<&AllocationRecord> {
        self.records.get(&(item_id.to_string(), date))
    }

    /// Every stored (item, date) key
    pub fn keys(&self) -> Vec<EditKey> {
        self.records.keys().cloned().collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &AllocationRecord> {
        self.records.values()
    }

    /// Build the matrix response for `from..=to`.
    ///
    /// Every non-summary node gets a progress entry computed over all of its
    /// records, not just the window, and a dense cell for every date in the
    /// window. A cell's planned crew comes from `plan` when it has a non-zero
    /// value for that day, else from the stored record.
    pub fn daily_matrix(
        &self,
        tree: &WbsTree,
        plan: &DailyPlan,
        from: NaiveDate,
        to: NaiveDate,
        today: NaiveDate,
    ) -> Result<DailyMatrixResponse, ContractError> {
        let dates = date_window(from, to)?;

        let mut by_item: HashMap<&str, Vec<&AllocationRecord>> = HashMap::new();
        for record in self.records.values() {
            by_item
                .entry(record.wbs_item_id.as_str())
                .or_default()
                .push(record);
        }

        let mut wbs_items = Vec::new();
        let mut matrix = HashMap::new();
        let mut totals: IndexMap<NaiveDate, DayTotals> =
            dates.iter().map(|d| (*d, DayTotals::default())).collect();

        for node in tree.nodes().filter(|n| !n.is_summary) {
            let records = by_item.get(node.id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            let done: f64 = records.iter().map(|r| r.qty_done).sum();
            let manday: f64 = records.iter().map(|r| r.actual_manpower).sum();
            let working_days = records.iter().filter(|r| r.actual_manpower > 0.0).count() as u32;
            wbs_items.push(WbsProgress {
                id: node.id.clone(),
                wbs_code: node.code.clone(),
                wbs_name: node.name.clone(),
                qty: node.quantity,
                done,
                remaining: metrics::remaining_qty(node.quantity, done),
                progress_pct: metrics::progress_pct(node.quantity, done),
                total_actual_manday: manday,
                working_days,
                productivity_rate: metrics::productivity_rate(done, manday),
            });

            let mut cells = HashMap::with_capacity(dates.len());
            for &date in &dates {
                let record = self.get(&node.id, date);
                let mut cell = match record {
                    Some(r) => DailyCell {
                        planned: r.planned_manpower,
                        actual: r.actual_manpower,
                        qty_done: r.qty_done,
                        is_future: date > today,
                    },
                    None => DailyCell::missing(date, today),
                };
                if let Some(planned) = plan.planned(&node.id, date)
                    && planned != 0.0
                {
                    cell.planned = planned;
                }
                if let Some(t) = totals.get_mut(&date) {
                    t.planned += cell.planned;
                    t.actual += cell.actual;
                }
                cells.insert(date, cell);
            }
            matrix.insert(node.id.clone(), cells);
        }

        Ok(DailyMatrixResponse {
            wbs_items,
            date_range: dates,
            matrix,
            totals,
        })
    }

    /// Upsert each update's actual manpower, and its quantity done when
    /// given, rejecting per cell what the write endpoint would reject. The
    /// planned value is never written here.
    pub fn apply_batch(
        &mut self,
        tree: &WbsTree,
        request: &BatchRequest,
        max_manpower: f64,
    ) -> BatchResponse {
        let mut response = BatchResponse::default();
        for update in &request.updates {
            let error = match tree.get(&update.item_id) {
                None => Some("unknown WBS item".to_string()),
                Some(node) if node.is_summary => {
                    Some("summary items are not editable".to_string())
                }
                Some(_)
                    if !update.actual_manpower.is_finite()
                        || update.actual_manpower < 0.0
                        || update.actual_manpower > max_manpower =>
                {
                    Some(format!("actual_manpower must be between 0 and {}", max_manpower))
                }
                Some(_) if update.qty_done.is_some_and(|q| !q.is_finite() || q < 0.0) => {
                    Some("qty_done must be a non-negative number".to_string())
                }
                Some(_) => None,
            };
            if let Some(error) = error {
                response.errors.push(CellError {
                    item_id: update.item_id.clone(),
                    date: update.date,
                    error,
                });
                continue;
            }
            let record = self
                .records
                .entry(update.key())
                .or_insert_with(|| AllocationRecord::empty(&update.item_id, update.date));
            record.actual_manpower = update.actual_manpower;
            if let Some(qty) = update.qty_done {
                record.qty_done = qty;
            }
            response.updated_count += 1;
        }
        tracing::debug!(
            updated = response.updated_count,
            rejected = response.errors.len(),
            source = ?request.source,
            "applied batch to allocation store"
        );
        response
    }
}

/// Applies batches to `allocations.json` under the project write lock
pub struct FileSink {
    data_dir: PathBuf,
    tree: WbsTree,
    max_manpower: f64,
    lock_timeout: Duration,
}

impl FileSink {
    pub fn new(data_dir: &Path, tree: WbsTree, max_manpower: f64) -> Self {
        FileSink {
            data_dir: data_dir.to_path_buf(),
            tree,
            max_manpower,
            lock_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

impl BatchSink for FileSink {
    fn dispatch(&mut self, request: &BatchRequest) -> Result<BatchResponse, TransportError> {
        let _lock = WriteLock::acquire(&self.data_dir, self.lock_timeout)
            .map_err(|e| TransportError::Busy(e.to_string()))?;
        let mut store = AllocationStore::load(&self.data_dir)
            .map_err(|e| TransportError::InvalidReply(e.to_string()))?;
        let response = store.apply_batch(&self.tree, request, self.max_manpower);
        if response.updated_count > 0 {
            if let Err(e) = store.save(&self.data_dir) {
                log_recovery(
                    &self.data_dir,
                    RecoveryEntry {
                        timestamp: chrono::Utc::now(),
                        category: RecoveryCategory::Write,
                        description: "allocation write failed".to_string(),
                        fields: vec![("Error".to_string(), e.to_string())],
                        body: serde_json::to_string_pretty(&request.updates).unwrap_or_default(),
                    },
                );
                return Err(TransportError::Unreachable(e.to_string()));
            }
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::edit::{EditSource, PendingEdit};
    use crate::model::wbs::WbsNode;
    use crate::ops::tree::build_tree;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn tree() -> WbsTree {
        build_tree(vec![
            WbsNode::new("cw", None, "CW", "Curtain wall").summary(),
            WbsNode::new("cw1", Some("cw"), "CW-01", "East").with_quantity(100.0, "m2"),
            WbsNode::new("cw2", Some("cw"), "CW-02", "West").with_quantity(150.0, "m2"),
        ])
        .unwrap()
    }

    fn record(item: &str, date: &str, planned: f64, actual: f64, qty: f64) -> AllocationRecord {
        AllocationRecord {
            wbs_item_id: item.into(),
            date: d(date),
            planned_manpower: planned,
            actual_manpower: actual,
            qty_done: qty,
        }
    }

    fn update(item: &str, date: &str, value: f64) -> PendingEdit {
        PendingEdit {
            item_id: item.into(),
            date: d(date),
            actual_manpower: value,
            qty_done: None,
        }
    }

    #[test]
    fn test_daily_matrix_progress_over_all_time() {
        let store = AllocationStore::from_records(vec![
            record("cw1", "2026-01-05", 4.0, 4.0, 20.0),
            record("cw1", "2026-02-17", 5.0, 5.0, 5.0),
            record("cw1", "2026-02-18", 5.0, 0.0, 0.0),
        ]);
        let m = store
            .daily_matrix(&tree(), &DailyPlan::default(), d("2026-02-16"), d("2026-02-19"), d("2026-02-17"))
            .unwrap();
        assert_eq!(m.date_range.len(), 4);
        assert_eq!(m.wbs_items.len(), 2);
        let cw1 = &m.wbs_items[0];
        assert_eq!(cw1.done, 25.0);
        assert_eq!(cw1.total_actual_manday, 9.0);
        assert_eq!(cw1.working_days, 2);
        assert_eq!(cw1.progress_pct, 25.0);
        assert_eq!(cw1.productivity_rate, 2.778);

        assert_eq!(m.cell("cw1", d("2026-02-17")).unwrap().actual, 5.0);
        assert!(m.cell("cw1", d("2026-02-18")).unwrap().is_future);
        assert!(!m.cell("cw2", d("2026-02-16")).unwrap().is_future);
        assert_eq!(m.totals[&d("2026-02-18")].planned, 5.0);
        assert!(m.validate().is_ok());
    }

    #[test]
    fn test_apply_batch_rejects_per_cell() {
        let mut store = AllocationStore::default();
        let request = BatchRequest {
            updates: vec![
                update("cw1", "2026-02-17", 6.0),
                update("cw", "2026-02-17", 1.0),
                update("ghost", "2026-02-17", 1.0),
                update("cw2", "2026-02-17", 250.0),
            ],
            source: EditSource::Grid,
        };
        let response = store.apply_batch(&tree(), &request, 200.0);
        assert_eq!(response.updated_count, 1);
        let errors: Vec<(&str, &str)> = response
            .errors
            .iter()
            .map(|e| (e.item_id.as_str(), e.error.as_str()))
            .collect();
        assert_eq!(
            errors,
            vec![
                ("cw", "summary items are not editable"),
                ("ghost", "unknown WBS item"),
                ("cw2", "actual_manpower must be between 0 and 200"),
            ]
        );
        assert_eq!(store.get("cw1", d("2026-02-17")).unwrap().actual_manpower, 6.0);
    }

    #[test]
    fn test_apply_keeps_planned_and_qty() {
        let mut store =
            AllocationStore::from_records(vec![record("cw1", "2026-02-17", 5.0, 2.0, 3.0)]);
        let request = BatchRequest {
            updates: vec![update("cw1", "2026-02-17", 7.0)],
            source: EditSource::Chat,
        };
        store.apply_batch(&tree(), &request, 200.0);
        let r = store.get("cw1", d("2026-02-17")).unwrap();
        assert_eq!((r.planned_manpower, r.actual_manpower, r.qty_done), (5.0, 7.0, 3.0));
    }

    #[test]
    fn test_apply_writes_reported_quantity() {
        let mut store =
            AllocationStore::from_records(vec![record("cw1", "2026-02-17", 5.0, 2.0, 3.0)]);
        let mut with_qty = update("cw1", "2026-02-17", 6.0);
        with_qty.qty_done = Some(8.0);
        let mut bad_qty = update("cw2", "2026-02-17", 1.0);
        bad_qty.qty_done = Some(-1.0);
        let request = BatchRequest {
            updates: vec![with_qty, bad_qty],
            source: EditSource::Grid,
        };
        let response = store.apply_batch(&tree(), &request, 200.0);
        assert_eq!(response.updated_count, 1);
        assert_eq!(response.errors[0].error, "qty_done must be a non-negative number");
        let r = store.get("cw1", d("2026-02-17")).unwrap();
        assert_eq!((r.planned_manpower, r.actual_manpower, r.qty_done), (5.0, 6.0, 8.0));
        assert!(store.get("cw2", d("2026-02-17")).is_none());
    }

    #[test]
    fn test_baseline_plan_wins_over_stored_planned() {
        use crate::model::baseline::{Baseline, BaselineSnapshot};

        let store = AllocationStore::from_records(vec![
            record("cw1", "2026-02-16", 4.0, 4.0, 0.0),
            record("cw1", "2026-02-17", 5.0, 5.0, 0.0),
        ]);
        let baseline = Baseline {
            version: 1,
            name: "Initial".into(),
            notes: None,
            approved_at: chrono::Utc::now(),
            is_active: true,
            snapshots: vec![BaselineSnapshot {
                wbs_item_id: "cw1".into(),
                total_manday: 15.0,
                start_date: Some(d("2026-02-16")),
                end_date: Some(d("2026-02-18")),
                manpower_per_day: 5.0,
                daily_plan: [
                    (d("2026-02-16"), 0.0),
                    (d("2026-02-17"), 6.0),
                    (d("2026-02-18"), 9.0),
                ]
                .into_iter()
                .collect(),
            }],
        };
        let m = store
            .daily_matrix(
                &tree(),
                &baseline.plan(),
                d("2026-02-16"),
                d("2026-02-18"),
                d("2026-02-17"),
            )
            .unwrap();
        // A zero in the plan falls back to the stored value
        assert_eq!(m.cell("cw1", d("2026-02-16")).unwrap().planned, 4.0);
        assert_eq!(m.cell("cw1", d("2026-02-17")).unwrap().planned, 6.0);
        // Planned with no record at all
        let future = m.cell("cw1", d("2026-02-18")).unwrap();
        assert_eq!((future.planned, future.actual, future.is_future), (9.0, 0.0, true));
        assert_eq!(m.totals[&d("2026-02-18")].planned, 9.0);
    }

    #[test]
    fn test_file_sink_round_trip() {
        let tmp = TempDir::new().unwrap();
        let mut sink = FileSink::new(tmp.path(), tree(), 200.0);
        let request = BatchRequest {
            updates: vec![update("cw2", "2026-02-18", 9.0), update("cw1", "2026-02-17", 4.0)],
            source: EditSource::Grid,
        };
        let response = sink.dispatch(&request).unwrap();
        assert_eq!(response.updated_count, 2);

        let store = AllocationStore::load(tmp.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("cw2", d("2026-02-18")).unwrap().actual_manpower, 9.0);

        // Saved sorted by date
        let text = std::fs::read_to_string(tmp.path().join(ALLOCATIONS_FILE)).unwrap();
        assert!(text.find("2026-02-17").unwrap() < text.find("2026-02-18").unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_sink_busy_when_locked() {
        let tmp = TempDir::new().unwrap();
        let _held = WriteLock::acquire_default(tmp.path()).unwrap();
        let mut sink = FileSink::new(tmp.path(), tree(), 200.0)
            .with_lock_timeout(Duration::from_millis(50));
        let request = BatchRequest {
            updates: vec![update("cw1", "2026-02-17", 4.0)],
            source: EditSource::Grid,
        };
        assert!(matches!(
            sink.dispatch(&request),
            Err(TransportError::Busy(_))
        ));
        assert!(!tmp.path().join(ALLOCATIONS_FILE).exists());
    }
}
