//! EventEmitter<T>: typed listener registry with snapshot-on-emit.
//!
//! A listener removed during an emission round is still called in that round;
//! a listener added during a round is first called on the next one. The lock
//! is released before any callback runs, so callbacks may subscribe,
//! unsubscribe or emit again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

pub type ListenerId = u64;

pub type ListenerFn<T> = dyn Fn(&T) + Send + Sync;

/// One-shot handle that removes a subscription when called.
pub type Unsubscribe = Box<dyn FnOnce() + Send + Sync>;

pub struct EventEmitter<T> {
    listeners: Mutex<Vec<(ListenerId, Arc<ListenerFn<T>>)>>,
    next_id: AtomicU64,
}

impl<T> EventEmitter<T> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn on(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(callback)));
        id
    }

    /// Safe to call with an id that is already gone.
    pub fn off(&self, id: ListenerId) {
        self.listeners.lock().retain(|(lid, _)| *lid != id);
    }

    /// Deliver `event` to every listener registered when the call started.
    /// Returns how many listeners were called.
    pub fn emit(&self, event: &T) -> usize {
        let snapshot: Vec<Arc<ListenerFn<T>>> = {
            let guard = self.listeners.lock();
            guard.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        for cb in &snapshot {
            cb(event);
        }
        snapshot.len()
    }

    pub fn size(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl<T: 'static> EventEmitter<T> {
    /// Register `callback` and return a closure that removes it again.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(&T) + Send + Sync + 'static,
    ) -> Unsubscribe
    where
        T: Send + Sync,
    {
        let id = self.on(callback);
        let emitter = Arc::clone(self);
        Box::new(move || emitter.off(id))
    }
}

impl<T> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}
