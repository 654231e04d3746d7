//! Map/table synchronization bridge.
//!
//! The bridge never mutates the edit store directly: it dispatches actions
//! and reads snapshots. The map engine is reached only through [`MapPort`].

pub mod cache;
pub mod filter;
pub mod locate;
pub mod port;
pub mod selection;
pub mod style;
pub mod sync;

pub use cache::BoundedCache;
pub use filter::{facet_key, ColumnFilters};
pub use locate::locate_feature;
pub use port::{LayerKind, MapFeature, MapPort, Overlay, Pixel};
pub use selection::{FormBuffer, PickCandidate, PickResult, Selection, ViewMode};
pub use style::{resolve_style, StyleCategory, StyleContext, StyleKey};
pub use sync::{clone_for_row, resolve_map_feature, DraftSync, SyncOutcome};
