use std::time::{Duration, Instant};

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Serialize;

use crate::model::edit::{BatchResponse, EditKey, PendingEdit};
use crate::ops::session::TransportError;

/// Error type for an edit rejected before it reaches the pending map
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("value for {item_id} on {date} is not a finite number")]
    NotFinite { item_id: String, date: NaiveDate },
    #[error("negative manpower {value} for {item_id} on {date}")]
    Negative {
        item_id: String,
        date: NaiveDate,
        value: f64,
    },
    #[error("manpower {value} for {item_id} on {date} exceeds the maximum of {max}")]
    AboveMax {
        item_id: String,
        date: NaiveDate,
        value: f64,
        max: f64,
    },
    #[error("quantity done {value} for {item_id} on {date} must be a non-negative number")]
    BadQuantity {
        item_id: String,
        date: NaiveDate,
        value: f64,
    },
    #[error("unknown WBS item: {0}")]
    UnknownItem(String),
    #[error("{0} is a summary item and cannot be edited")]
    SummaryItem(String),
    #[error("{date} is outside the visible range {from}..{to}")]
    OutsideRange {
        date: NaiveDate,
        from: NaiveDate,
        to: NaiveDate,
    },
}

/// Check a manpower value against the numeric domain `0..=max`
pub fn validate_value(
    item_id: &str,
    date: NaiveDate,
    value: f64,
    max: f64,
) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite {
            item_id: item_id.to_string(),
            date,
        });
    }
    if value < 0.0 {
        return Err(ValidationError::Negative {
            item_id: item_id.to_string(),
            date,
            value,
        });
    }
    if value > max {
        return Err(ValidationError::AboveMax {
            item_id: item_id.to_string(),
            date,
            value,
            max,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoalescerState {
    /// Nothing pending, no timer armed
    Idle,
    /// Edits pending, waiting for the debounce timer
    Accumulating,
    /// A batch is out; new edits queue behind it
    Flushing,
}

/// An edit the server did not apply, with the reason
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedEdit {
    pub edit: PendingEdit,
    pub error: String,
}

/// How one dispatched batch resolved
#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    Applied {
        updated: usize,
    },
    /// Some cells were applied, the rest were rejected per cell
    Partial {
        updated: usize,
        rejected: Vec<RejectedEdit>,
    },
    /// Nothing was applied
    TransportFailure {
        error: TransportError,
        unsaved: usize,
    },
}

impl FlushOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, FlushOutcome::Applied { .. })
    }
}

/// Debounced last-write-wins queue for cell edits.
///
/// Time is passed in by the caller, so the coalescer never sleeps or spawns.
/// At most one batch is in flight; edits that arrive meanwhile wait for the
/// next window. Edits the server did not apply stay in `unsaved` until the
/// user edits that cell again or calls `retry_unsaved`.
#[derive(Debug, Clone)]
pub struct EditCoalescer {
    debounce: Duration,
    pending: IndexMap<EditKey, PendingEdit>,
    deadline: Option<Instant>,
    in_flight: Option<Vec<PendingEdit>>,
    unsaved: IndexMap<EditKey, RejectedEdit>,
}

impl EditCoalescer {
    pub fn new(debounce: Duration) -> Self {
        EditCoalescer {
            debounce,
            pending: IndexMap::new(),
            deadline: None,
            in_flight: None,
            unsaved: IndexMap::new(),
        }
    }

    pub fn state(&self) -> CoalescerState {
        if self.in_flight.is_some() {
            CoalescerState::Flushing
        } else if self.pending.is_empty() {
            CoalescerState::Idle
        } else {
            CoalescerState::Accumulating
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// When the armed timer fires, if one is armed
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingEdit> {
        self.pending.values()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight(&self) -> Option<&[PendingEdit]> {
        self.in_flight.as_deref()
    }

    pub fn unsaved(&self) -> impl Iterator<Item = &RejectedEdit> {
        self.unsaved.values()
    }

    pub fn unsaved_len(&self) -> usize {
        self.unsaved.len()
    }

    /// Merge an edit into the pending map and re-arm the timer.
    ///
    /// A prior pending value for the same cell is overwritten in place. A
    /// fresh edit supersedes any unsaved value for that cell.
    pub fn push(&mut self, edit: PendingEdit, now: Instant) {
        let key = edit.key();
        self.unsaved.shift_remove(&key);
        match self.pending.get_mut(&key) {
            Some(pending) => pending.merge(edit),
            None => {
                self.pending.insert(key, edit);
            }
        }
        self.deadline = Some(now + self.debounce);
    }

    /// Take the next batch if the timer has fired and nothing is in flight
    pub fn poll(&mut self, now: Instant) -> Option<Vec<PendingEdit>> {
        if self.in_flight.is_some() {
            return None;
        }
        match self.deadline {
            Some(due) if now >= due => self.take_batch(),
            _ => None,
        }
    }

    /// Take the pending edits as a batch without waiting for the timer.
    /// Returns `None` while a batch is in flight.
    pub fn flush_now(&mut self) -> Option<Vec<PendingEdit>> {
        if self.in_flight.is_some() {
            return None;
        }
        self.take_batch()
    }

    fn take_batch(&mut self) -> Option<Vec<PendingEdit>> {
        self.deadline = None;
        if self.pending.is_empty() {
            return None;
        }
        let batch: Vec<PendingEdit> = std::mem::take(&mut self.pending).into_values().collect();
        self.in_flight = Some(batch.clone());
        Some(batch)
    }

    /// Resolve the in-flight batch.
    ///
    /// Rejected and undelivered edits move to `unsaved` unless a newer edit for
    /// the same cell is already pending. If edits queued during the flight, the
    /// timer re-arms from `now`.
    pub fn complete(
        &mut self,
        result: Result<BatchResponse, TransportError>,
        now: Instant,
    ) -> FlushOutcome {
        let batch = self.in_flight.take().unwrap_or_default();
        let outcome = match result {
            Ok(response) if response.errors.is_empty() => FlushOutcome::Applied {
                updated: response.updated_count,
            },
            Ok(response) => {
                let mut rejected = Vec::with_capacity(response.errors.len());
                for err in response.errors {
                    let key = (err.item_id.clone(), err.date);
                    let Some(edit) = batch.iter().find(|e| e.key() == key) else {
                        tracing::warn!(item_id = %err.item_id, date = %err.date, "rejection for a cell not in the batch");
                        continue;
                    };
                    let r = RejectedEdit {
                        edit: edit.clone(),
                        error: err.error,
                    };
                    if !self.pending.contains_key(&key) {
                        self.unsaved.insert(key, r.clone());
                    }
                    rejected.push(r);
                }
                tracing::warn!(
                    updated = response.updated_count,
                    rejected = rejected.len(),
                    "batch partially applied"
                );
                FlushOutcome::Partial {
                    updated: response.updated_count,
                    rejected,
                }
            }
            Err(error) => {
                let mut unsaved = 0;
                for edit in batch {
                    let key = edit.key();
                    if self.pending.contains_key(&key) {
                        continue;
                    }
                    self.unsaved.insert(
                        key,
                        RejectedEdit {
                            edit,
                            error: error.to_string(),
                        },
                    );
                    unsaved += 1;
                }
                tracing::warn!(%error, unsaved, "batch dispatch failed");
                FlushOutcome::TransportFailure { error, unsaved }
            }
        };

        self.deadline = if self.pending.is_empty() {
            None
        } else {
            Some(now + self.debounce)
        };
        outcome
    }

    /// Re-queue every unsaved edit that has no newer pending value. Returns
    /// how many were re-queued.
    pub fn retry_unsaved(&mut self, now: Instant) -> usize {
        let mut count = 0;
        for (key, rejected) in std::mem::take(&mut self.unsaved) {
            if self.pending.contains_key(&key) {
                continue;
            }
            self.pending.insert(key, rejected.edit);
            count += 1;
        }
        if count > 0 {
            self.deadline = Some(now + self.debounce);
        }
        count
    }
}
