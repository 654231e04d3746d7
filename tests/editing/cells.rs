//! Table cell edits: staging, pruning, validation and debouncing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::json;

use wfst_edit::bus::{BusEvent, EventKind};
use wfst_edit::{EditError, FeatureId};

use crate::support::{editor, roads_api, roads_editor};

fn road(local: &str) -> FeatureId {
    FeatureId::parse(&format!("roads.{local}")).unwrap()
}

#[tokio::test]
async fn edit_stages_a_patch_and_reverting_prunes_it() {
    let (editor, _api, _map) = roads_editor().await;

    assert!(editor.edit_cell(&road("1"), "name", json!("Main St")).unwrap());
    let snap = editor.snapshot().unwrap();
    assert_eq!(snap.pending_edits[&road("1")]["name"], json!("Main St"));
    assert_eq!(editor.summary().updates, 1);

    assert!(editor.edit_cell(&road("1"), "name", json!("Main")).unwrap());
    let snap = editor.snapshot().unwrap();
    assert!(snap.pending_edits.is_empty());
    assert!(!editor.has_unsaved());
}

#[tokio::test]
async fn setting_the_current_value_is_not_an_edit() {
    let (editor, _api, _map) = roads_editor().await;
    assert!(!editor.edit_cell(&road("2"), "name", json!("Mill")).unwrap());
    assert_eq!(editor.undo_depths(), (0, 0, 0));
}

#[tokio::test]
async fn every_alias_of_an_id_edits_the_same_row() {
    let (editor, _api, _map) = roads_editor().await;
    let canonical = road("42");
    let spellings = [
        canonical.clone(),
        FeatureId::Server("42".to_string()),
        FeatureId::from_value(&json!(42)).unwrap(),
    ];
    for (i, id) in spellings.iter().enumerate() {
        editor.edit_cell(id, "lanes", json!(10 + i)).unwrap();
    }
    let snap = editor.snapshot().unwrap();
    assert_eq!(snap.pending_edits.len(), 1);
    assert_eq!(snap.pending_edits[&canonical]["lanes"], json!(12));
}

#[tokio::test]
async fn values_are_coerced_to_the_field_type() {
    let (editor, _api, _map) = roads_editor().await;
    editor.edit_cell(&road("1"), "lanes", json!("3")).unwrap();
    let snap = editor.snapshot().unwrap();
    assert_eq!(snap.effective_value(&road("1"), "lanes"), Some(json!(3)));

    let err = editor
        .edit_cell(&road("1"), "lanes", json!("three"))
        .unwrap_err();
    assert!(matches!(err, EditError::InvalidValue { ref key, .. } if key == "lanes"));
}

#[tokio::test]
async fn read_only_unknown_fields_and_rows_are_rejected() {
    let (editor, _api, _map) = roads_editor().await;

    for key in ["created", "id", "nope"] {
        let err = editor.edit_cell(&road("1"), key, json!("x")).unwrap_err();
        assert!(matches!(err, EditError::InvalidValue { .. }), "{key}: {err}");
    }
    let err = editor.edit_cell(&road("99"), "name", json!("x")).unwrap_err();
    assert!(matches!(err, EditError::UnknownFeature(_)));
    assert!(!editor.has_unsaved());
}

#[tokio::test]
async fn keystrokes_coalesce_into_one_edit() {
    let (editor, _api, _map) = roads_editor().await;
    let t0 = Instant::now();
    for (i, text) in ["M", "Ma", "Mai"].into_iter().enumerate() {
        let at = t0 + Duration::from_millis(10 * i as u64);
        editor
            .queue_cell_edit(&road("1"), "name", json!(text), at)
            .unwrap();
    }

    assert_eq!(editor.flush_cell_edits(t0 + Duration::from_millis(50)).unwrap(), 0);
    assert_eq!(editor.next_flush_due(), Some(t0 + Duration::from_millis(140)));

    assert_eq!(editor.flush_cell_edits(t0 + Duration::from_millis(200)).unwrap(), 1);
    let snap = editor.snapshot().unwrap();
    assert_eq!(snap.effective_value(&road("1"), "name"), Some(json!("Mai")));
    assert_eq!(editor.undo_depths(), (1, 0, 0));
    assert_eq!(editor.next_flush_due(), None);
}

#[tokio::test]
async fn typed_cells_apply_once_the_window_passes() {
    let (editor, _api, _map) = roads_editor().await;
    for text in ["H", "Hi", "Hig", "High"] {
        editor.type_cell(&road("1"), "name", json!(text)).unwrap();
    }
    assert!(!editor.has_unsaved());

    tokio::time::sleep(Duration::from_millis(400)).await;

    let snap = editor.snapshot().unwrap();
    assert_eq!(snap.effective_value(&road("1"), "name"), Some(json!("High")));
    assert!(editor.has_unsaved());
    assert_eq!(editor.undo_depths(), (1, 0, 0));
    assert_eq!(editor.next_flush_due(), None);

    // The timer was released, so a later keystroke arms a new one.
    editor.type_cell(&road("1"), "name", json!("Highway")).unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    let snap = editor.snapshot().unwrap();
    assert_eq!(snap.effective_value(&road("1"), "name"), Some(json!("Highway")));
}

#[tokio::test]
async fn clearing_the_service_cancels_typed_cells() {
    let (editor, _api, _map) = roads_editor().await;
    editor.type_cell(&road("1"), "name", json!("Gone")).unwrap();
    assert!(editor.clear_service());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(editor.snapshot().is_none());
}

#[tokio::test]
async fn edits_publish_unsaved_state() {
    let (editor, _api, _map) = roads_editor().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    let _unsub = editor
        .bus()
        .on_kind(EventKind::UnsavedState, move |e| s.lock().push(e.clone()));

    editor.edit_cell(&road("1"), "name", json!("Main St")).unwrap();

    let seen = seen.lock();
    let Some(BusEvent::UnsavedState {
        has_unsaved,
        summary,
    }) = seen.last()
    else {
        panic!("no unsaved-state event: {seen:?}");
    };
    assert!(*has_unsaved);
    assert_eq!(summary.updates, 1);
}

#[test]
fn editing_without_a_service_fails() {
    let (editor, _map) = editor(roads_api());
    let err = editor
        .edit_cell(&road("1"), "name", json!("x"))
        .unwrap_err();
    assert!(matches!(err, EditError::NoActiveService));
}
