use std::time::Instant;

use crate::model::config::GridConfig;
use crate::model::edit::{BatchRequest, BatchResponse, CellEdit, EditSource, PendingEdit};
use crate::ops::coalesce::{CoalescerState, EditCoalescer, FlushOutcome, RejectedEdit, ValidationError};
use crate::ops::pipeline::Grid;
use crate::util::clock::Clock;

/// Error type for a batch that could not be delivered at all
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("allocation endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("allocation endpoint busy: {0}")]
    Busy(String),
    #[error("invalid reply from allocation endpoint: {0}")]
    InvalidReply(String),
}

/// Where batched mutations go: the remote write endpoint or a local store
pub trait BatchSink {
    fn dispatch(&mut self, request: &BatchRequest) -> Result<BatchResponse, TransportError>;
}

impl<S: BatchSink + ?Sized> BatchSink for &mut S {
    fn dispatch(&mut self, request: &BatchRequest) -> Result<BatchResponse, TransportError> {
        (**self).dispatch(request)
    }
}

/// Receives edits that were still unsaved when a session was dropped
pub type UnsavedHandler = Box<dyn FnMut(&[RejectedEdit])>;

/// The single editing actor for one open view.
///
/// Edits are validated against the grid, coalesced, and dispatched through
/// the sink when `tick` finds the debounce timer expired.
///
/// Prefer `close`, which returns the flush outcome and the unsaved edits.
/// Dropping an unclosed session also flushes what is pending, but its outcome
/// has no caller: edits left unsaved go to the handler set with
/// `on_unsaved`, or are only logged at `warn` and lost when there is none.
pub struct EditSession<C: Clock, S: BatchSink> {
    clock: C,
    sink: S,
    coalescer: EditCoalescer,
    source: EditSource,
    max_manpower: f64,
    on_unsaved: Option<UnsavedHandler>,
    closed: bool,
}

impl<C: Clock, S: BatchSink> EditSession<C, S> {
    pub fn new(clock: C, sink: S, config: &GridConfig) -> Self {
        EditSession {
            clock,
            sink,
            coalescer: EditCoalescer::new(config.debounce()),
            source: config.source,
            max_manpower: config.max_manpower,
            on_unsaved: None,
            closed: false,
        }
    }

    /// Hand edits still unsaved at drop time to `handler`
    pub fn on_unsaved(mut self, handler: impl FnMut(&[RejectedEdit]) + 'static) -> Self {
        self.on_unsaved = Some(Box::new(handler));
        self
    }

    pub fn state(&self) -> CoalescerState {
        self.coalescer.state()
    }

    pub fn pending_len(&self) -> usize {
        self.coalescer.pending_len()
    }

    pub fn unsaved(&self) -> Vec<RejectedEdit> {
        self.coalescer.unsaved().cloned().collect()
    }

    /// When the next batch is due, if any edits are waiting
    pub fn next_due(&self) -> Option<Instant> {
        self.coalescer.deadline()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Validate a grid edit and queue it
    pub fn edit(&mut self, grid: &Grid, edit: CellEdit) -> Result<(), ValidationError> {
        let pending = grid.check_edit(&edit, self.max_manpower).inspect_err(|e| {
            tracing::info!(error = %e, "edit rejected");
        })?;
        self.coalescer.push(pending, self.clock.now());
        Ok(())
    }

    /// Dispatch the pending batch if its timer has fired
    pub fn tick(&mut self) -> Option<FlushOutcome> {
        let batch = self.coalescer.poll(self.clock.now())?;
        Some(self.dispatch(batch))
    }

    /// Dispatch whatever is pending right away
    pub fn flush(&mut self) -> Option<FlushOutcome> {
        let batch = self.coalescer.flush_now()?;
        Some(self.dispatch(batch))
    }

    /// Put unsaved edits back in the queue
    pub fn retry_unsaved(&mut self) -> usize {
        self.coalescer.retry_unsaved(self.clock.now())
    }

    /// Flush pending edits before the view goes away. Returns the outcome
    /// and anything still unsaved afterwards.
    pub fn close(mut self) -> (Option<FlushOutcome>, Vec<RejectedEdit>) {
        let outcome = self.flush();
        let unsaved = self.unsaved();
        self.closed = true;
        (outcome, unsaved)
    }

    fn dispatch(&mut self, updates: Vec<PendingEdit>) -> FlushOutcome {
        let request = BatchRequest {
            updates,
            source: self.source,
        };
        tracing::debug!(updates = request.updates.len(), source = ?request.source, "dispatching batch");
        let result = self.sink.dispatch(&request);
        self.coalescer.complete(result, self.clock.now())
    }
}

impl<C: Clock, S: BatchSink> Drop for EditSession<C, S> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if self.coalescer.pending_len() > 0 {
            tracing::debug!(pending = self.coalescer.pending_len(), "flushing edits on drop");
            self.flush();
        }
        let unsaved = self.unsaved();
        if unsaved.is_empty() {
            return;
        }
        match self.on_unsaved.as_mut() {
            Some(handler) => handler(&unsaved),
            None => tracing::warn!(unsaved = unsaved.len(), "session dropped with unsaved edits"),
        }
    }
}
