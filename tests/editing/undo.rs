//! Undo across the table, form and geometry surfaces.

use serde_json::json;

use wfst_edit::bridge::{LayerKind, MapPort, StyleCategory};
use wfst_edit::bus::{SelectMode, SelectionSource};
use wfst_edit::geometry::Geometry;
use wfst_edit::types::Properties;
use wfst_edit::undo::UndoApplied;
use wfst_edit::FeatureId;

use crate::support::roads_editor;

fn road(local: &str) -> FeatureId {
    FeatureId::parse(&format!("roads.{local}")).unwrap()
}

fn props(pairs: &[(&str, serde_json::Value)]) -> Properties {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn nothing_to_undo_on_a_fresh_session() {
    let (editor, _api, _map) = roads_editor().await;
    assert_eq!(editor.undo().unwrap(), None);
}

#[tokio::test]
async fn table_undo_restores_the_previous_snapshot() {
    let (editor, _api, _map) = roads_editor().await;
    let before = editor.snapshot().unwrap().rows();

    editor.edit_cell(&road("1"), "lanes", json!(6)).unwrap();
    let applied = editor.undo().unwrap();

    assert!(matches!(applied, Some(UndoApplied::Table { ref key, .. }) if key == "lanes"));
    let snap = editor.snapshot().unwrap();
    assert_eq!(snap.rows(), before);
    assert!(snap.pending_edits.is_empty());
}

#[tokio::test]
async fn form_edit_over_several_rows_undoes_as_one_group() {
    let (editor, _api, _map) = roads_editor().await;
    let before = editor.snapshot().unwrap().rows();

    let rows = editor
        .apply_form_edit(&[road("1"), road("2")], &props(&[("name", json!("Ring"))]))
        .unwrap();
    assert_eq!(rows, 2);
    assert_eq!(editor.undo_depths(), (0, 2, 0));

    let Some(UndoApplied::Form { ids, .. }) = editor.undo().unwrap() else {
        panic!("expected a form undo");
    };
    assert_eq!(ids.len(), 2);
    assert_eq!(editor.snapshot().unwrap().rows(), before);
    assert_eq!(editor.undo_depths(), (0, 0, 0));
}

#[tokio::test]
async fn form_undo_restores_the_focused_buffer() {
    let (editor, _api, _map) = roads_editor().await;
    editor
        .select(&[road("1")], SelectMode::Replace, SelectionSource::Table)
        .unwrap();
    editor.enter_form_mode().unwrap();
    assert_eq!(editor.form_buffer().unwrap().values["name"], json!("Main"));

    editor
        .apply_form_edit(&[road("1")], &props(&[("name", json!("High"))]))
        .unwrap();
    assert_eq!(editor.form_buffer().unwrap().values["name"], json!("High"));

    let applied = editor.undo().unwrap();
    assert!(matches!(
        applied,
        Some(UndoApplied::Form {
            buffer_restored: true,
            ..
        })
    ));
    assert_eq!(editor.form_buffer().unwrap().values["name"], json!("Main"));
}

#[tokio::test]
async fn geometry_undo_puts_the_old_shape_back_on_the_map() {
    let (editor, _api, map) = roads_editor().await;
    let feature = map.find("roads.1").unwrap();
    let before = feature.geometry.clone();
    let after = Some(Geometry::Point([11.0, 101.0]));

    map.set_feature_geometry(LayerKind::AttributeEdit, &feature.uid, after.clone());
    editor
        .record_geometry_edit(&road("1"), before.clone(), after)
        .unwrap();
    assert!(editor.is_geometry_edited(&road("1")));
    assert_eq!(editor.summary().updates, 1);

    let applied = editor.undo().unwrap();
    assert!(matches!(applied, Some(UndoApplied::Geometry { located: true, .. })));
    assert_eq!(map.find("roads.1").unwrap().geometry, before);
    assert!(!editor.is_geometry_edited(&road("1")));
    assert!(!editor.has_unsaved());
}

#[tokio::test]
async fn newest_surface_is_undone_first() {
    let (editor, _api, _map) = roads_editor().await;

    // table < geometry < form
    editor.edit_cell(&road("1"), "lanes", json!(5)).unwrap();
    editor
        .record_geometry_edit(&road("2"), None, Some(Geometry::Point([0.0, 0.0])))
        .unwrap();
    editor
        .apply_form_edit(&[road("42")], &props(&[("name", json!("Quay"))]))
        .unwrap();

    assert!(matches!(editor.undo().unwrap(), Some(UndoApplied::Form { .. })));
    let snap = editor.snapshot().unwrap();
    assert_eq!(snap.effective_value(&road("1"), "lanes"), Some(json!(5)));
    assert_eq!(snap.effective_value(&road("42"), "name"), Some(json!("Harbour")));
    assert_eq!(editor.undo_depths(), (1, 0, 1));

    assert!(matches!(editor.undo().unwrap(), Some(UndoApplied::Geometry { .. })));
    assert!(matches!(editor.undo().unwrap(), Some(UndoApplied::Table { .. })));
    assert_eq!(editor.undo().unwrap(), None);
}

#[tokio::test]
async fn geometry_stamps_after_an_attribute_edit_on_a_frozen_clock() {
    let (editor, _api, _map) = roads_editor().await;
    editor.edit_cell(&road("1"), "lanes", json!(5)).unwrap();
    editor
        .record_geometry_edit(&road("1"), None, Some(Geometry::Point([0.0, 0.0])))
        .unwrap();
    assert!(matches!(editor.undo().unwrap(), Some(UndoApplied::Geometry { .. })));
}

#[tokio::test]
async fn table_undo_widens_the_column_filter() {
    let (editor, _api, _map) = roads_editor().await;
    editor.set_column_filter("surface", &[json!("gravel")]).unwrap();
    assert_eq!(editor.style_for(&road("1")).unwrap(), None);

    editor.edit_cell(&road("1"), "surface", json!("gravel")).unwrap();
    assert!(editor.style_for(&road("1")).unwrap().is_some());

    let applied = editor.undo().unwrap();
    assert!(matches!(
        applied,
        Some(UndoApplied::Table {
            filter_widened: true,
            ..
        })
    ));
    let style = editor.style_for(&road("1")).unwrap().unwrap();
    assert_eq!(style.category, StyleCategory::Plain);
}
