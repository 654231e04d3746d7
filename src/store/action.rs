use serde::{Deserialize, Serialize};

use crate::geometry::Geometry;
use crate::identity::FeatureId;
use crate::types::{Feature, Properties};

use super::state::EditOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    Mark,
    Unmark,
    Toggle,
}

impl DeleteMode {
    pub(crate) fn resolve(self, currently_deleted: bool) -> bool {
        match self {
            Self::Mark => true,
            Self::Unmark => false,
            Self::Toggle => !currently_deleted,
        }
    }
}

/// State transitions understood by [`EditStore::dispatch`](super::EditStore::dispatch).
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Replace the base feature set and drop all pending state.
    Init { features: Vec<Feature> },
    Edit {
        id: FeatureId,
        key: String,
        value: serde_json::Value,
    },
    /// Several edits sharing one undo timestamp.
    BatchEdit { ops: Vec<EditOp> },
    /// Same as `BatchEdit` but not recorded on the store's undo stack. Used
    /// by surfaces with their own undo stack and by undo itself.
    ApplyEdits { ops: Vec<EditOp> },
    SetDeleteState { ids: Vec<FeatureId>, mode: DeleteMode },
    /// The i-th source becomes draft `next_temp_id - i`.
    DuplicateRows {
        ids: Vec<FeatureId>,
        read_only_keys: Vec<String>,
    },
    CreateDraft {
        properties: Properties,
        geometry: Option<Geometry>,
    },
    DiscardDrafts { ids: Vec<FeatureId> },
    /// Clear edits, drafts, deletions and undo history. Base features stay.
    Commit,
    Undo,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "INIT",
            Self::Edit { .. } => "EDIT",
            Self::BatchEdit { .. } => "BATCH_EDIT",
            Self::ApplyEdits { .. } => "APPLY_EDITS",
            Self::SetDeleteState { .. } => "SET_DELETE_STATE",
            Self::DuplicateRows { .. } => "DUPLICATE_ROWS",
            Self::CreateDraft { .. } => "CREATE_DRAFT",
            Self::DiscardDrafts { .. } => "DISCARD_DRAFTS",
            Self::Commit => "COMMIT",
            Self::Undo => "UNDO",
        }
    }
}
