use std::time::{Duration, Instant};

use super::state::EditOp;

struct PendingEdit {
    op: EditOp,
    due: Instant,
}

/// Coalesces rapid edits to the same `(id, key)`.
///
/// Each new value for a pending key replaces the old one and pushes its
/// deadline back by the window; only the last value is ever dispatched.
/// At most one flush timer is armed at a time.
pub struct EditDebouncer {
    window: Duration,
    pending: Vec<PendingEdit>,
    armed: bool,
}

impl EditDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Vec::new(),
            armed: false,
        }
    }

    pub fn push(&mut self, op: EditOp, now: Instant) {
        let due = now + self.window;
        match self
            .pending
            .iter_mut()
            .find(|p| p.op.id == op.id && p.op.key == op.key)
        {
            Some(existing) => {
                existing.op.value = op.value;
                existing.due = due;
            }
            None => self.pending.push(PendingEdit { op, due }),
        }
    }

    /// Remove and return the edits whose window has elapsed, oldest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<EditOp> {
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|p| p.due <= now);
        self.pending = waiting;
        due.into_iter().map(|p| p.op).collect()
    }

    pub fn take_all(&mut self) -> Vec<EditOp> {
        self.pending.drain(..).map(|p| p.op).collect()
    }

    /// Earliest pending deadline, for scheduling the next flush.
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.iter().map(|p| p.due).min()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Claim the flush timer. `false` when one is already running.
    pub fn arm(&mut self) -> bool {
        !std::mem::replace(&mut self.armed, true)
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }
}
