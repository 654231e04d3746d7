//! The editing session of the active service and the [`Editor`] façade.

mod commit;
mod editor;
mod state;

pub use commit::CommitReport;
pub use editor::{Editor, TOOLTIP_OVERLAY};
pub use state::EditSession;
