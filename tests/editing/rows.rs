//! Deletion marks, drafts, map draft sync, split and merge.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use wfst_edit::bridge::{LayerKind, MapFeature, MapPort, SyncOutcome};
use wfst_edit::bus::{BusEvent, EventKind};
use wfst_edit::error::NetworkError;
use wfst_edit::geometry::Geometry;
use wfst_edit::store::DeleteMode;
use wfst_edit::types::Properties;
use wfst_edit::{CommitReport, EditError, FeatureId};

use crate::support::{roads_editor, transaction_response};

fn road(local: &str) -> FeatureId {
    FeatureId::parse(&format!("roads.{local}")).unwrap()
}

fn named(name: &str) -> Properties {
    let mut p = Properties::new();
    p.insert("name".to_string(), json!(name));
    p
}

#[tokio::test]
async fn mark_then_unmark_leaves_no_trace() {
    let (editor, _api, _map) = roads_editor().await;
    let bare = FeatureId::Server("42".to_string());

    assert!(editor.set_delete_state(&[bare.clone()], DeleteMode::Mark).unwrap());
    let snap = editor.snapshot().unwrap();
    assert!(snap.pending_deletes.contains(&road("42")));
    assert_eq!(editor.summary().deletes, 1);

    assert!(editor.set_delete_state(&[bare], DeleteMode::Unmark).unwrap());
    let snap = editor.snapshot().unwrap();
    assert!(!snap.pending_deletes.contains(&road("42")));
    assert!(snap.pending_edits.is_empty());
    assert!(!editor.has_unsaved());
}

#[tokio::test]
async fn toggle_flips_drafts_and_features_alike() {
    let (editor, _api, _map) = roads_editor().await;
    let draft = editor.create_draft(&named("Spur"), None).unwrap();
    editor
        .set_delete_state(&[draft.clone(), road("1")], DeleteMode::Toggle)
        .unwrap();
    let snap = editor.snapshot().unwrap();
    assert!(snap.is_deleted(&draft));
    assert!(snap.is_deleted(&road("1")));
    assert_eq!(editor.summary().inserts, 0);
}

#[tokio::test]
async fn duplicate_copies_editable_attributes_and_map_geometry() {
    let (editor, _api, map) = roads_editor().await;
    let ids = editor.duplicate(&[road("1")]).unwrap();
    assert_eq!(ids, vec![FeatureId::Draft(-1)]);

    let snap = editor.snapshot().unwrap();
    let draft = snap.draft(&ids[0]).unwrap();
    assert_eq!(draft.properties["name"], json!("Main"));
    assert_eq!(draft.properties["lanes"], json!(2));
    for key in ["created", "id", "@_fid"] {
        assert!(!draft.properties.contains_key(key), "{key} copied");
    }

    let copy = map.find("-1").expect("copy on the map");
    assert_eq!(copy.geometry, Some(Geometry::Point([10.0, 100.0])));
}

#[tokio::test]
async fn draft_ids_stay_negative_and_unique_across_commits() {
    let (editor, api, _map) = roads_editor().await;
    api.on_transaction(&transaction_response(3, 0, 0));

    let mut ids = editor.duplicate(&[road("1"), road("2")]).unwrap();
    ids.push(editor.create_draft(&named("A"), None).unwrap());
    editor.undo().unwrap();
    assert!(matches!(
        editor.commit().await.unwrap(),
        CommitReport::Committed(_)
    ));
    ids.push(editor.create_draft(&named("B"), None).unwrap());
    ids.extend(editor.duplicate(&[road("42")]).unwrap());

    assert!(ids.iter().all(|id| matches!(id, FeatureId::Draft(n) if *n < 0)));
    let distinct: HashSet<_> = ids.iter().collect();
    assert_eq!(distinct.len(), ids.len(), "{ids:?}");
}

#[tokio::test]
async fn discarded_drafts_leave_the_map_and_the_selection() {
    let (editor, _api, map) = roads_editor().await;
    let draft = editor
        .create_draft(&named("Spur"), Some(Geometry::Point([1.0, 2.0])))
        .unwrap();
    editor
        .select(
            &[draft.clone(), road("1")],
            wfst_edit::bus::SelectMode::Replace,
            wfst_edit::bus::SelectionSource::Table,
        )
        .unwrap();
    assert_eq!(map.layer(LayerKind::AttributeEdit).len(), 4);

    assert_eq!(editor.discard_drafts(&[draft.clone(), road("2")]).unwrap(), 1);
    assert!(editor.snapshot().unwrap().pending_adds.is_empty());
    assert_eq!(map.layer(LayerKind::AttributeEdit).len(), 3);
    assert_eq!(editor.selection().unwrap().current(), &[road("1")]);
    assert!(!editor.has_unsaved());
}

#[tokio::test]
async fn drawn_feature_moves_to_the_edit_layer_as_a_draft() {
    let (editor, _api, map) = roads_editor().await;
    let drawn = MapFeature {
        geometry: Some(Geometry::Point([5.0, 5.0])),
        attribute_edit: true,
        ..MapFeature::default()
    };
    let uid = map.add_feature(LayerKind::FreeDraw, drawn.clone());
    let drawn = MapFeature { uid, ..drawn };

    let outcome = editor
        .handle_draw_added(LayerKind::FreeDraw, drawn.clone())
        .unwrap();
    assert_eq!(outcome, SyncOutcome::DraftCreated(FeatureId::Draft(-1)));
    assert!(map.layer(LayerKind::FreeDraw).is_empty());
    let moved = map.find("-1").expect("draft on the edit layer");
    assert_eq!(editor.summary().inserts, 1);

    // The engine now reports the move; both notifications are echoes.
    assert_eq!(
        editor.handle_feature_removed(LayerKind::FreeDraw, drawn).unwrap(),
        SyncOutcome::Echo
    );
    assert_eq!(
        editor.handle_draw_added(LayerKind::AttributeEdit, moved).unwrap(),
        SyncOutcome::Echo
    );
    assert_eq!(editor.summary().inserts, 1);
}

#[tokio::test]
async fn sketches_not_meant_for_editing_are_ignored() {
    let (editor, _api, map) = roads_editor().await;
    let sketch = MapFeature {
        geometry: Some(Geometry::Point([5.0, 5.0])),
        ..MapFeature::default()
    };
    let uid = map.add_feature(LayerKind::FreeDraw, sketch.clone());
    let outcome = editor
        .handle_draw_added(LayerKind::FreeDraw, MapFeature { uid, ..sketch })
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Ignored);
    assert!(!editor.has_unsaved());
}

#[tokio::test]
async fn removing_on_the_map_marks_deleted_and_unmarking_restores() {
    let (editor, _api, map) = roads_editor().await;
    let feature = map.find("roads.2").unwrap();
    map.remove_feature(LayerKind::AttributeEdit, &feature.uid);

    let outcome = editor
        .handle_feature_removed(LayerKind::AttributeEdit, feature)
        .unwrap();
    assert_eq!(outcome, SyncOutcome::MarkedDeleted(road("2")));
    assert!(editor.snapshot().unwrap().is_deleted(&road("2")));
    assert!(map.find("roads.2").is_none());

    editor
        .set_delete_state(&[road("2")], DeleteMode::Unmark)
        .unwrap();
    assert!(map.find("roads.2").is_some());
    assert!(!editor.has_unsaved());
}

#[tokio::test]
async fn split_complete_on_the_bus_creates_one_draft_per_part() {
    let (editor, _api, map) = roads_editor().await;
    let _unsub = editor.connect_bus();
    let parts = vec![Geometry::Point([1.0, 1.0]), Geometry::Point([2.0, 2.0])];

    editor.start_split(&road("1")).unwrap();
    editor.bus().publish(BusEvent::SplitComplete {
        source_id: road("1"),
        parts,
    });

    let snap = editor.snapshot().unwrap();
    assert_eq!(snap.pending_adds.len(), 2);
    for draft in &snap.pending_adds {
        assert_eq!(draft.properties["name"], json!("Main"));
        assert!(!draft.properties.contains_key("created"));
    }
    assert!(snap.is_deleted(&road("1")));
    assert!(map.find("-1").is_some());
    assert!(map.find("-2").is_some());
}

#[tokio::test]
async fn split_of_an_unknown_row_is_rejected() {
    let (editor, _api, _map) = roads_editor().await;
    let err = editor.start_split(&road("7")).unwrap_err();
    assert!(matches!(err, EditError::UnknownFeature(_)));
}

#[tokio::test]
async fn merge_needs_two_rows_and_combines_their_geometry() {
    let (editor, _api, _map) = roads_editor().await;
    let requests = Arc::new(Mutex::new(Vec::new()));
    let r = Arc::clone(&requests);
    let _unsub = editor
        .bus()
        .on_kind(EventKind::MergeFeatures, move |e| r.lock().push(e.clone()));

    assert!(editor.start_merge(&[road("1")]).is_err());
    editor.start_merge(&[road("1"), road("2")]).unwrap();
    assert_eq!(requests.lock().len(), 1);

    let merged = editor
        .finish_merge(&[road("1"), road("2")], None)
        .unwrap()
        .expect("merged draft");
    let snap = editor.snapshot().unwrap();
    let draft = snap.draft(&merged).unwrap();
    assert_eq!(draft.properties["name"], json!("Main"));
    assert_eq!(
        draft.geometry,
        Some(Geometry::MultiPoint(vec![[10.0, 100.0], [20.0, 100.0]]))
    );
    assert!(snap.is_deleted(&road("1")) && snap.is_deleted(&road("2")));
}

#[tokio::test]
async fn captured_position_becomes_a_point_draft() {
    let (editor, _api, map) = roads_editor().await;
    let id = editor
        .capture_position(async { Ok::<_, EditError>([7.0, 8.0]) }, &named("Gate"))
        .await
        .unwrap()
        .expect("draft created");
    let snap = editor.snapshot().unwrap();
    assert_eq!(snap.draft(&id).unwrap().geometry, Some(Geometry::Point([7.0, 8.0])));
    assert!(map.find(&id.to_string()).is_some());
}

#[tokio::test]
async fn cancelled_position_fix_is_swallowed() {
    let (editor, _api, _map) = roads_editor().await;
    let out = editor
        .capture_position(async { Err::<[f64; 2], _>(EditError::Aborted) }, &named("Gate"))
        .await
        .unwrap();
    assert_eq!(out, None);
    assert!(!editor.has_unsaved());

    let err = editor
        .capture_position(
            async { Err::<[f64; 2], EditError>(NetworkError::new("no fix").into()) },
            &named("Gate"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EditError::Network(_)));
}
