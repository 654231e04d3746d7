//! Optimistic edit store: pending inserts, field patches and deletions
//! layered over the base feature set of the active layer.
//!
//! # Modules
//!
//! - [`state`]: [`EditState`] snapshot and its query helpers.
//! - [`action`]: [`Action`] transitions.
//! - [`store`]: [`EditStore`] dispatch/subscribe container.
//! - [`debounce`]: [`EditDebouncer`] for keystroke-rate edits.

pub mod action;
pub mod debounce;
mod reducer;
pub mod state;
pub mod store;

pub use action::{Action, DeleteMode};
pub use debounce::EditDebouncer;
pub(crate) use reducer::clone_editable;
pub use state::{Draft, EditOp, EditState, PendingTag, StoreUndoEntry, UnsavedSummary};
pub use store::{EditStore, Snapshot};
