//! EditStore: dispatch/subscribe container around [`EditState`].
//!
//! # Dispatch model
//!
//! State lives behind an `Arc` that is replaced copy-on-write, so a snapshot
//! handed to a subscriber never changes under it. A dispatch runs the reducer,
//! then notifies every subscriber synchronously with the new snapshot.
//!
//! A dispatch issued from inside a subscriber is queued and runs after the
//! current round of notifications has finished. Subscribers therefore always
//! observe transitions one at a time, in dispatch order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::Timeline;
use crate::reactive::{EventEmitter, Unsubscribe};

use super::action::Action;
use super::reducer::reduce;
use super::state::EditState;

pub type Snapshot = Arc<EditState>;

#[derive(Default)]
struct DispatchQueue {
    running: bool,
    queue: VecDeque<Action>,
}

/// Releases the dispatch loop if a subscriber unwinds out of it. Actions
/// queued during that round are dropped with it.
struct RunningGuard<'a> {
    queue: &'a Mutex<DispatchQueue>,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut q = self.queue.lock();
            let dropped = q.queue.len();
            q.queue.clear();
            q.running = false;
            tracing::warn!(dropped, "subscriber panicked during dispatch");
        }
    }
}

pub struct EditStore {
    state: Mutex<Snapshot>,
    emitter: Arc<EventEmitter<Snapshot>>,
    dispatch: Mutex<DispatchQueue>,
    timeline: Arc<Timeline>,
    version: AtomicU64,
}

impl EditStore {
    pub fn new(timeline: Arc<Timeline>) -> Self {
        Self {
            state: Mutex::new(Arc::new(EditState::new())),
            emitter: Arc::new(EventEmitter::new()),
            dispatch: Mutex::new(DispatchQueue::default()),
            timeline,
            version: AtomicU64::new(0),
        }
    }

    pub fn get_snapshot(&self) -> Snapshot {
        Arc::clone(&self.state.lock())
    }

    /// Register a listener called after every state-changing dispatch.
    pub fn subscribe(
        &self,
        listener: impl Fn(&Snapshot) + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.emitter.subscribe(listener)
    }

    /// Incremented by every state-changing dispatch.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Apply `action` and notify subscribers.
    ///
    /// Returns `true` if this call changed state (including any actions that
    /// subscribers queued while it ran). A call made re-entrantly from a
    /// subscriber is queued and returns `false`; the outer dispatch runs it.
    ///
    /// A panicking subscriber propagates out of this call. The state change
    /// that triggered it is kept and the store keeps accepting dispatches.
    pub fn dispatch(&self, action: Action) -> bool {
        {
            let mut q = self.dispatch.lock();
            q.queue.push_back(action);
            if q.running {
                return false;
            }
            q.running = true;
        }

        let _guard = RunningGuard {
            queue: &self.dispatch,
        };
        let mut any_changed = false;
        loop {
            let next = {
                let mut q = self.dispatch.lock();
                match q.queue.pop_front() {
                    Some(action) => action,
                    None => {
                        q.running = false;
                        break;
                    }
                }
            };

            let name = next.name();
            let snapshot = {
                let mut guard = self.state.lock();
                let changed = reduce(Arc::make_mut(&mut guard), next, &self.timeline);
                if changed {
                    self.version.fetch_add(1, Ordering::SeqCst);
                }
                changed.then(|| Arc::clone(&guard))
            };

            match snapshot {
                Some(snapshot) => {
                    tracing::trace!(action = name, "store changed");
                    any_changed = true;
                    self.emitter.emit(&snapshot);
                }
                None => tracing::trace!(action = name, "store unchanged"),
            }
        }
        any_changed
    }
}

impl std::fmt::Debug for EditStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditStore")
            .field("subscribers", &self.emitter.size())
            .finish()
    }
}
