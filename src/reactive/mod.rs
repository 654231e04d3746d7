//! Synchronous typed pub/sub shared by the edit store and the event bus.

pub mod emitter;

pub use emitter::{EventEmitter, ListenerId, Unsubscribe};
