//! Store transitions: pruning, drafts, deletion marks and the store undo.

use std::sync::Arc;

use serde_json::{json, Value};

use wfst_edit::clock::{ManualClock, Timeline};
use wfst_edit::store::{Action, DeleteMode, EditOp, EditStore, PendingTag};
use wfst_edit::types::{Feature, Properties};
use wfst_edit::FeatureId;

fn props(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        _ => unreachable!("fixture properties are objects"),
    }
}

fn server(id: &str) -> FeatureId {
    FeatureId::Server(id.to_string())
}

fn seeded() -> EditStore {
    let timeline = Arc::new(Timeline::new(Arc::new(ManualClock::new(1_000))));
    let store = EditStore::new(timeline);
    store.dispatch(Action::Init {
        features: vec![
            Feature::new(
                server("1"),
                props(json!({ "id": 1, "name": "Main", "lanes": 2, "created": "2024" })),
            ),
            Feature::new(
                server("2"),
                props(json!({ "id": 2, "name": "Mill", "lanes": 1, "created": "2024" })),
            ),
        ],
    });
    store
}

fn edit(id: FeatureId, key: &str, value: Value) -> Action {
    Action::Edit {
        id,
        key: key.to_string(),
        value,
    }
}

#[test]
fn reverting_a_field_prunes_the_patch() {
    let store = seeded();
    assert!(store.dispatch(edit(server("1"), "lanes", json!(3))));
    assert!(store.get_snapshot().is_edited(&server("1")));

    assert!(store.dispatch(edit(server("1"), "lanes", json!(2))));
    let snap = store.get_snapshot();
    assert!(snap.pending_edits.is_empty());
    assert_eq!(snap.undo_stack.len(), 1);

    // The only entry restores a value the row already has.
    assert!(!store.dispatch(Action::Undo));
    assert!(store.get_snapshot().undo_stack.is_empty());
}

#[test]
fn assigning_the_current_value_changes_nothing() {
    let store = seeded();
    let version = store.version();
    assert!(!store.dispatch(edit(server("1"), "name", json!("Main"))));
    assert!(!store.dispatch(edit(server("9"), "name", json!("Ghost"))));
    assert_eq!(store.version(), version);
}

#[test]
fn batch_edits_share_one_undo_stamp() {
    let store = seeded();
    store.dispatch(Action::BatchEdit {
        ops: vec![
            EditOp::new(server("1"), "lanes", json!(4)),
            EditOp::new(server("2"), "lanes", json!(4)),
        ],
    });
    store.dispatch(edit(server("1"), "name", json!("High")));

    let stack = &store.get_snapshot().undo_stack;
    assert_eq!(stack.len(), 3);
    assert_eq!(stack[0].when, stack[1].when);
    assert!(stack[2].when > stack[1].when);
}

#[test]
fn undo_restores_the_prior_snapshot() {
    let store = seeded();
    let before = store.get_snapshot();

    store.dispatch(edit(server("2"), "name", json!("Mill Road")));
    store.dispatch(edit(server("2"), "name", json!("Mill Lane")));
    assert!(store.dispatch(Action::Undo));

    let after = store.get_snapshot();
    assert_eq!(after.pending_edits, before.pending_edits);
    assert_eq!(
        after.effective_properties(&server("2")),
        before.effective_properties(&server("2"))
    );
    assert!(after.undo_stack.is_empty());
}

#[test]
fn apply_edits_bypass_the_store_undo_stack() {
    let store = seeded();
    assert!(store.dispatch(Action::ApplyEdits {
        ops: vec![EditOp::new(server("1"), "lanes", json!(6))],
    }));
    let snap = store.get_snapshot();
    assert_eq!(snap.effective_value(&server("1"), "lanes"), Some(json!(6)));
    assert!(snap.undo_stack.is_empty());
    assert_eq!(snap.last_undo_when(), None);
}

#[test]
fn draft_edits_change_the_draft_itself() {
    let store = seeded();
    store.dispatch(Action::CreateDraft {
        properties: props(json!({ "name": "New" })),
        geometry: None,
    });
    let draft = FeatureId::Draft(-1);
    store.dispatch(edit(draft.clone(), "lanes", json!(1)));

    let snap = store.get_snapshot();
    assert!(snap.pending_edits.is_empty());
    assert_eq!(
        snap.draft(&draft).map(|d| d.properties.clone()),
        Some(props(json!({ "name": "New", "lanes": 1 })))
    );
    assert_eq!(snap.summary().inserts, 1);
}

#[test]
fn delete_marks_apply_to_features_and_drafts() {
    let store = seeded();
    store.dispatch(Action::CreateDraft {
        properties: Properties::new(),
        geometry: None,
    });
    let draft = FeatureId::Draft(-1);

    assert!(store.dispatch(Action::SetDeleteState {
        ids: vec![server("1"), draft.clone()],
        mode: DeleteMode::Toggle,
    }));
    let snap = store.get_snapshot();
    assert!(snap.pending_deletes.contains(&server("1")));
    assert_eq!(snap.draft(&draft).map(|d| d.pending), Some(PendingTag::Delete));
    assert_eq!(snap.summary().inserts, 0);
    assert_eq!(snap.summary().deletes, 1);

    // Marking again is a no-op; unknown ids are ignored.
    assert!(!store.dispatch(Action::SetDeleteState {
        ids: vec![server("1"), server("77")],
        mode: DeleteMode::Mark,
    }));

    assert!(store.dispatch(Action::SetDeleteState {
        ids: vec![server("1"), draft.clone()],
        mode: DeleteMode::Unmark,
    }));
    let snap = store.get_snapshot();
    assert!(snap.pending_deletes.is_empty());
    assert!(snap.pending_edits.is_empty());
    assert!(!snap.is_deleted(&draft));
}

#[test]
fn duplicates_take_the_precomputed_ids() {
    let store = seeded();
    let expected = store.get_snapshot().peek_next_temp_ids(3);
    assert_eq!(
        expected,
        vec![FeatureId::Draft(-1), FeatureId::Draft(-2), FeatureId::Draft(-3)]
    );

    store.dispatch(Action::DuplicateRows {
        ids: vec![server("1"), server("404"), server("2")],
        read_only_keys: vec!["created".to_string()],
    });

    let snap = store.get_snapshot();
    let ids: Vec<_> = snap.pending_adds.iter().map(|d| d.id.clone()).collect();
    // The unknown source still consumes its id.
    assert_eq!(ids, vec![FeatureId::Draft(-1), FeatureId::Draft(-3)]);
    assert_eq!(
        snap.pending_adds[0].properties,
        props(json!({ "name": "Main", "lanes": 2 }))
    );
    assert_eq!(snap.next_temp_id, -4);
}

#[test]
fn draft_ids_are_never_reused_after_commit() {
    let store = seeded();
    store.dispatch(Action::CreateDraft {
        properties: Properties::new(),
        geometry: None,
    });
    assert!(store.dispatch(Action::Commit));
    assert!(!store.dispatch(Action::Commit));

    store.dispatch(Action::CreateDraft {
        properties: Properties::new(),
        geometry: None,
    });
    let snap = store.get_snapshot();
    assert_eq!(snap.pending_adds.len(), 1);
    assert_eq!(snap.pending_adds[0].id, FeatureId::Draft(-2));
    assert_eq!(snap.features.len(), 2);
}

#[test]
fn discarding_drafts_drops_their_undo_entries() {
    let store = seeded();
    store.dispatch(Action::CreateDraft {
        properties: Properties::new(),
        geometry: None,
    });
    let draft = FeatureId::Draft(-1);
    store.dispatch(edit(draft.clone(), "name", json!("Tmp")));
    store.dispatch(edit(server("1"), "name", json!("Kept")));

    assert!(store.dispatch(Action::DiscardDrafts {
        ids: vec![draft, server("1")],
    }));
    let snap = store.get_snapshot();
    assert!(snap.pending_adds.is_empty());
    assert_eq!(snap.undo_stack.len(), 1);
    assert!(snap.is_edited(&server("1")));
}

#[test]
fn init_replaces_features_and_clears_pending_state() {
    let store = seeded();
    store.dispatch(edit(server("1"), "name", json!("Changed")));
    store.dispatch(Action::SetDeleteState {
        ids: vec![server("2")],
        mode: DeleteMode::Mark,
    });

    store.dispatch(Action::Init {
        features: vec![Feature::new(server("5"), props(json!({ "name": "Quay" })))],
    });
    let snap = store.get_snapshot();
    assert!(!snap.has_unsaved());
    assert!(snap.undo_stack.is_empty());
    assert!(snap.contains(&server("5")));
    assert!(!snap.contains(&server("1")));
}
