//! Selection, picker, hover tooltips, styling and column facets.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use wfst_edit::bridge::{MapFeature, PickResult, Pixel, StyleCategory, ViewMode};
use wfst_edit::bus::{BusEvent, EventKind, SelectMode, SelectionSource};
use wfst_edit::session::TOOLTIP_OVERLAY;
use wfst_edit::store::DeleteMode;
use wfst_edit::types::Properties;
use wfst_edit::FeatureId;

use crate::support::roads_editor;

fn road(local: &str) -> FeatureId {
    FeatureId::parse(&format!("roads.{local}")).unwrap()
}

const CLICK: Pixel = Pixel { x: 40.0, y: 40.0 };

fn record(editor: &wfst_edit::Editor, kind: EventKind) -> Arc<Mutex<Vec<BusEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    let _ = editor.bus().on_kind(kind, move |e| s.lock().push(e.clone()));
    seen
}

#[tokio::test]
async fn overlapping_features_open_a_deduplicated_picker() {
    let (editor, _api, map) = roads_editor().await;
    let selects = record(&editor, EventKind::SelectIds);

    let main = map.find("roads.1").unwrap();
    // Same row again, known to the engine only by its bare `id` property.
    let mut echo = MapFeature::default();
    echo.properties.insert("id".to_string(), json!(1));
    map.put_under_cursor(vec![main, map.find("roads.2").unwrap(), echo]);

    let PickResult::Choose(candidates) = editor.pick_at(CLICK).unwrap() else {
        panic!("expected a picker");
    };
    let ids: Vec<_> = candidates.iter().map(|c| c.id.clone()).collect();
    assert_eq!(ids, vec![road("1"), road("2")]);
    let labels: Vec<_> = candidates.iter().map(|c| c.label.as_str()).collect();
    assert_eq!(labels, vec!["Main", "Mill"]);

    editor
        .select(&[road("42")], SelectMode::Replace, SelectionSource::Table)
        .unwrap();
    assert!(editor.choose_picked(&road("2")).unwrap());
    let selection = editor.selection().unwrap();
    assert_eq!(selection.current(), &[road("2")]);
    assert!(selection.picker().is_empty());

    let last = selects.lock().last().cloned();
    assert_eq!(
        last,
        Some(BusEvent::SelectIds {
            ids: vec![road("2")],
            source: SelectionSource::Picker,
            mode: SelectMode::Replace,
        })
    );
}

#[tokio::test]
async fn a_single_feature_is_selected_directly() {
    let (editor, _api, map) = roads_editor().await;
    map.put_under_cursor(vec![map.find("roads.42").unwrap()]);
    assert_eq!(editor.pick_at(CLICK).unwrap(), PickResult::Selected(road("42")));
    assert_eq!(editor.selection().unwrap().current(), &[road("42")]);

    map.put_under_cursor(Vec::new());
    assert_eq!(editor.pick_at(CLICK).unwrap(), PickResult::Nothing);
    assert_eq!(editor.selection().unwrap().current(), &[road("42")]);
}

#[tokio::test]
async fn choosing_an_id_that_was_not_offered_does_nothing() {
    let (editor, _api, _map) = roads_editor().await;
    assert!(!editor.choose_picked(&road("1")).unwrap());
    assert!(editor.selection().unwrap().current().is_empty());
}

#[tokio::test]
async fn external_selection_is_applied_without_echo() {
    let (editor, _api, _map) = roads_editor().await;
    let _unsub = editor.connect_bus();
    let selects = record(&editor, EventKind::SelectIds);

    editor.bus().publish(BusEvent::SelectIds {
        ids: vec![FeatureId::Server("2".to_string())],
        source: SelectionSource::External,
        mode: SelectMode::Replace,
    });

    assert_eq!(editor.selection().unwrap().current(), &[road("2")]);
    assert_eq!(selects.lock().len(), 1);
}

#[tokio::test]
async fn form_mode_is_seeded_from_the_table_selection() {
    let (editor, _api, _map) = roads_editor().await;
    let focus = record(&editor, EventKind::FocusId);
    editor
        .select(&[road("2"), road("1")], SelectMode::Replace, SelectionSource::Table)
        .unwrap();

    editor.enter_form_mode().unwrap();
    let selection = editor.selection().unwrap();
    assert_eq!(selection.mode(), ViewMode::Form);
    assert_eq!(selection.form_ids(), &[road("2"), road("1")]);
    assert_eq!(selection.focused(), Some(&road("2")));
    assert_eq!(editor.form_buffer().unwrap().values["name"], json!("Mill"));
    assert_eq!(
        focus.lock().as_slice(),
        &[BusEvent::FocusId { id: Some(road("2")) }]
    );

    editor
        .select(&[road("42")], SelectMode::Replace, SelectionSource::Form)
        .unwrap();
    editor.enter_table_mode().unwrap();
    assert_eq!(editor.selection().unwrap().table_ids(), &[road("42")]);
}

#[tokio::test]
async fn hover_places_a_tooltip_with_the_row_label() {
    let (editor, _api, map) = roads_editor().await;
    editor.hover(Some(&road("2"))).unwrap();

    let overlays = map.overlays();
    assert_eq!(overlays.len(), 1);
    assert_eq!(overlays[0].id, TOOLTIP_OVERLAY);
    assert_eq!(overlays[0].text, "Mill");
    assert_eq!(overlays[0].position, [20.0, 100.0]);
    assert_eq!(
        editor.style_for(&road("2")).unwrap().map(|s| s.category),
        Some(StyleCategory::Hover)
    );

    editor.hover(None).unwrap();
    assert!(map.overlays().is_empty());
}

#[tokio::test]
async fn style_precedence_follows_row_state() {
    let (editor, _api, _map) = roads_editor().await;
    let mut props = Properties::new();
    props.insert("name".to_string(), json!("Spur"));
    let draft = editor.create_draft(&props, None).unwrap();
    editor.edit_cell(&draft, "lanes", json!(1)).unwrap();
    editor.edit_cell(&road("1"), "lanes", json!(9)).unwrap();
    editor
        .set_delete_state(&[road("42")], DeleteMode::Mark)
        .unwrap();
    editor
        .select(&[road("1")], SelectMode::Replace, SelectionSource::Table)
        .unwrap();

    let style = |id: &FeatureId| editor.style_for(id).unwrap().unwrap();
    assert_eq!(style(&draft).name(), "draft");
    assert_eq!(style(&road("1")).name(), "editedSelected");
    assert_eq!(style(&road("2")).name(), "plain");
    assert_eq!(style(&road("42")).name(), "deleted");
}

#[tokio::test]
async fn column_filters_hide_rows_and_facets_list_distinct_values() {
    let (editor, _api, _map) = roads_editor().await;
    assert_eq!(
        editor.unique_values("surface").unwrap(),
        vec![json!("asphalt"), json!("gravel")]
    );

    editor.set_column_filter("surface", &[json!("gravel")]).unwrap();
    assert_eq!(editor.style_for(&road("1")).unwrap(), None);
    assert!(editor.style_for(&road("2")).unwrap().is_some());

    editor.edit_cell(&road("2"), "surface", json!("dirt")).unwrap();
    assert_eq!(
        editor.unique_values("surface").unwrap(),
        vec![json!("asphalt"), json!("dirt")]
    );

    editor.clear_column_filter("surface").unwrap();
    assert!(editor.style_for(&road("1")).unwrap().is_some());
}
