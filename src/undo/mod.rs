//! Multi-surface undo.
//!
//! Table cells, form fields and geometries are edited at different
//! granularities and keep separate stacks; [`UndoCoordinator`] merges them
//! by timestamp.

pub mod coordinator;
pub mod stacks;

pub use coordinator::{UndoApplied, UndoCoordinator, UndoStacks, UndoTarget};
pub use stacks::{
    FormUndoEntry, FormUndoStack, GeometryUndoEntry, GeometryUndoStack, TableUndoEntry,
    TableUndoStack,
};
