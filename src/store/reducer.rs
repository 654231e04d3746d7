//! Pure state transitions. `reduce` returns whether the state changed; the
//! store only notifies subscribers when it did.

use std::collections::HashSet;

use crate::clock::Timeline;
use crate::identity::FeatureId;
use crate::schema::ID_FIELD;
use crate::types::{Properties, FID_PROPERTY};

use super::action::{Action, DeleteMode};
use super::state::{Draft, EditOp, EditState, PendingTag, StoreUndoEntry};

pub(crate) fn reduce(state: &mut EditState, action: Action, timeline: &Timeline) -> bool {
    match action {
        Action::Init { features } => {
            state.set_features(features);
            state.clear_pending();
            true
        }
        Action::Edit { id, key, value } => {
            apply_tracked(state, vec![EditOp { id, key, value }], timeline)
        }
        Action::BatchEdit { ops } => apply_tracked(state, ops, timeline),
        Action::ApplyEdits { ops } => {
            let mut changed = false;
            for op in &ops {
                changed |= state.apply_field(op).is_some();
            }
            changed
        }
        Action::SetDeleteState { ids, mode } => set_delete_state(state, &ids, mode),
        Action::DuplicateRows {
            ids,
            read_only_keys,
        } => duplicate_rows(state, &ids, &read_only_keys),
        Action::CreateDraft {
            properties,
            geometry,
        } => {
            let id = state.allocate_temp_id();
            state.pending_adds.push(Draft {
                id,
                properties,
                geometry,
                pending: PendingTag::None,
            });
            true
        }
        Action::DiscardDrafts { ids } => {
            let doomed: HashSet<&FeatureId> = ids.iter().filter(|id| id.is_draft()).collect();
            let before = state.pending_adds.len();
            state.pending_adds.retain(|d| !doomed.contains(&d.id));
            state.undo_stack.retain(|e| !doomed.contains(&e.id));
            state.pending_adds.len() != before
        }
        Action::Commit => {
            let had_pending = !state.pending_edits.is_empty()
                || !state.pending_adds.is_empty()
                || !state.pending_deletes.is_empty()
                || !state.undo_stack.is_empty();
            state.clear_pending();
            had_pending
        }
        Action::Undo => undo(state),
    }
}

fn apply_tracked(state: &mut EditState, ops: Vec<EditOp>, timeline: &Timeline) -> bool {
    let mut when: Option<u64> = None;
    let mut changed = false;
    for op in ops {
        let Some(change) = state.apply_field(&op) else {
            continue;
        };
        changed = true;
        if change.newly_staged {
            let when = *when.get_or_insert_with(|| timeline.stamp());
            state.undo_stack.push(StoreUndoEntry {
                id: op.id,
                key: op.key,
                prev_value: change.prev,
                when,
            });
        }
    }
    changed
}

fn set_delete_state(state: &mut EditState, ids: &[FeatureId], mode: DeleteMode) -> bool {
    let mut changed = false;
    for id in ids {
        if let Some(draft) = state.draft_mut(id) {
            let target = if mode.resolve(draft.is_deleted()) {
                PendingTag::Delete
            } else {
                PendingTag::None
            };
            if draft.pending != target {
                draft.pending = target;
                changed = true;
            }
            continue;
        }
        if state.feature(id).is_none() {
            tracing::debug!(%id, "delete state for unknown feature ignored");
            continue;
        }
        let deleted = state.pending_deletes.contains(id);
        match (deleted, mode.resolve(deleted)) {
            (false, true) => {
                state.pending_deletes.insert(id.clone());
                changed = true;
            }
            (true, false) => {
                state.pending_deletes.remove(id);
                changed = true;
            }
            _ => {}
        }
    }
    changed
}

fn copyable(key: &str, read_only: &HashSet<&str>) -> bool {
    key != ID_FIELD && key != FID_PROPERTY && !read_only.contains(key)
}

fn duplicate_rows(state: &mut EditState, ids: &[FeatureId], read_only_keys: &[String]) -> bool {
    let read_only: HashSet<&str> = read_only_keys.iter().map(String::as_str).collect();
    let mut changed = false;
    for source in ids {
        // The id is consumed even for an unknown source so that precomputed
        // ids (`next_temp_id - i`) stay valid.
        let id = state.allocate_temp_id();
        let Some(props) = state.effective_properties(source) else {
            tracing::debug!(%source, "duplicate of unknown feature skipped");
            continue;
        };
        let properties: Properties = props
            .into_iter()
            .filter(|(k, _)| copyable(k, &read_only))
            .collect();
        state.pending_adds.push(Draft {
            id,
            properties,
            geometry: None,
            pending: PendingTag::None,
        });
        changed = true;
    }
    changed
}

fn undo(state: &mut EditState) -> bool {
    while let Some(entry) = state.undo_stack.pop() {
        let op = EditOp {
            id: entry.id,
            key: entry.key,
            value: entry.prev_value,
        };
        if state.apply_field(&op).is_some() {
            return true;
        }
        // Entry no longer applies (draft discarded, value already restored);
        // keep unwinding to the next one.
    }
    false
}

/// Copy of `props` without read-only keys, id or internal fid.
pub(crate) fn clone_editable(props: &Properties, read_only_keys: &[String]) -> Properties {
    let read_only: HashSet<&str> = read_only_keys.iter().map(String::as_str).collect();
    props
        .iter()
        .filter(|(k, _)| copyable(k, &read_only))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
