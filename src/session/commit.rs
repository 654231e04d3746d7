//! Turning the pending overlay into one WFS-T transaction.

use crate::bridge::MapPort;
use crate::ogc::{InsertFeature, TransactionOutcome, TransactionRequest, UpdateFeature};
use crate::store::clone_editable;

use super::state::EditSession;

/// Result of [`Editor::commit`](super::Editor::commit).
#[derive(Debug, Clone, PartialEq)]
pub enum CommitReport {
    /// Nothing was pending; the transport was not called.
    NothingToCommit,
    /// A newer action cancelled the commit. Local state is untouched.
    Aborted,
    /// The server accepted the transaction, possibly with partial failures
    /// listed in the outcome.
    Committed(TransactionOutcome),
}

impl CommitReport {
    pub fn outcome(&self) -> Option<&TransactionOutcome> {
        match self {
            Self::Committed(outcome) => Some(outcome),
            _ => None,
        }
    }
}

/// Collect inserts, updates and deletes from the session.
///
/// Draft geometry comes from the map when the draft is drawn there, else
/// from the geometry captured with the draft. Rows whose only change is a
/// redrawn geometry become geometry-only updates.
pub(crate) fn build_request(session: &EditSession, map: &dyn MapPort) -> TransactionRequest {
    let state = session.store.get_snapshot();

    let inserts = state
        .pending_adds
        .iter()
        .filter(|draft| !draft.is_deleted())
        .map(|draft| InsertFeature {
            properties: clone_editable(&draft.properties, &session.read_only),
            geometry: session.geometry_of(map, &draft.id),
        })
        .collect();

    let mut updates: Vec<UpdateFeature> = state
        .pending_edits
        .iter()
        .filter(|(id, patch)| !patch.is_empty() && !state.pending_deletes.contains(*id))
        .map(|(id, patch)| UpdateFeature {
            id: id.clone(),
            properties: clone_editable(patch, &session.read_only),
            geometry: session
                .undo
                .geometry
                .is_edited(id)
                .then(|| session.geometry_of(map, id))
                .flatten(),
        })
        .filter(|update| !update.properties.is_empty() || update.geometry.is_some())
        .collect();

    for id in session.undo.geometry.edited_ids() {
        if id.is_draft() || state.pending_deletes.contains(id) || state.is_edited(id) {
            continue;
        }
        if let Some(geometry) = session.geometry_of(map, id) {
            updates.push(UpdateFeature {
                id: id.clone(),
                properties: Default::default(),
                geometry: Some(geometry),
            });
        }
    }

    TransactionRequest {
        inserts,
        updates,
        deletes: state.pending_deletes.iter().cloned().collect(),
        srs_name: session.crs_name.clone(),
        geometry_name: None,
    }
}
