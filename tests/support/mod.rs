//! Hand-written doubles shared by the integration tests: a recording
//! [`FeatureApi`] and an in-memory [`MapPort`].

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;

use wfst_edit::bridge::{LayerKind, MapFeature, MapPort, Overlay, Pixel};
use wfst_edit::clock::{ManualClock, Timeline};
use wfst_edit::error::NetworkError;
use wfst_edit::geometry::Geometry;
use wfst_edit::ogc::{FeatureApi, Query};
use wfst_edit::{Editor, EditorOptions};

// ============================================================================
// Mock FeatureApi
// ============================================================================

#[derive(Debug, Clone)]
pub struct GetCall {
    pub path: String,
    pub query: Query,
}

#[derive(Debug, Clone)]
pub struct PostCall {
    pub path: String,
    pub body: Value,
}

#[derive(Default)]
struct MockApiInner {
    gets: Vec<GetCall>,
    posts: Vec<PostCall>,
    routes: HashMap<String, Result<Value, NetworkError>>,
    post_response: Option<Value>,
    holds: HashMap<String, Arc<Notify>>,
}

/// Answers GETs from a path → body table and POSTs with one canned body.
/// Unknown paths answer 404.
#[derive(Default)]
pub struct MockApi {
    inner: Mutex<MockApiInner>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, path: &str, body: Value) {
        self.inner.lock().routes.insert(path.to_string(), Ok(body));
    }

    pub fn fail(&self, path: &str, status: u16) {
        self.inner.lock().routes.insert(
            path.to_string(),
            Err(NetworkError::with_status(status, "mock failure")),
        );
    }

    /// Answer transaction POSTs with `{wfsResponse: xml}`.
    pub fn on_transaction(&self, xml: &str) {
        self.inner.lock().post_response = Some(json!({ "wfsResponse": xml }));
    }

    /// Make GETs of `path` wait until the returned notifier fires.
    pub fn hold(&self, path: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.inner
            .lock()
            .holds
            .insert(path.to_string(), Arc::clone(&notify));
        notify
    }

    pub fn gets(&self) -> Vec<GetCall> {
        self.inner.lock().gets.clone()
    }

    pub fn posts(&self) -> Vec<PostCall> {
        self.inner.lock().posts.clone()
    }

    /// The transaction XML of every POST so far.
    pub fn transactions(&self) -> Vec<String> {
        self.posts()
            .into_iter()
            .filter_map(|p| p.body["transactionXml"].as_str().map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl FeatureApi for MockApi {
    async fn get(&self, path: &str, query: &Query) -> wfst_edit::Result<Value> {
        let hold = {
            let mut inner = self.inner.lock();
            inner.gets.push(GetCall {
                path: path.to_string(),
                query: query.clone(),
            });
            inner.holds.get(path).cloned()
        };
        if let Some(notify) = hold {
            notify.notified().await;
        }
        self.inner
            .lock()
            .routes
            .get(path)
            .cloned()
            .unwrap_or_else(|| Err(NetworkError::with_status(404, format!("no route {path}"))))
            .map_err(Into::into)
    }

    async fn post(&self, path: &str, body: &Value) -> wfst_edit::Result<Value> {
        let mut inner = self.inner.lock();
        inner.posts.push(PostCall {
            path: path.to_string(),
            body: body.clone(),
        });
        inner
            .post_response
            .clone()
            .ok_or_else(|| NetworkError::with_status(500, "no transaction response").into())
    }
}

// ============================================================================
// Fake MapPort
// ============================================================================

#[derive(Default)]
struct FakeMapInner {
    layers: HashMap<LayerKind, Vec<MapFeature>>,
    next_uid: u64,
    overlays: Vec<Overlay>,
    under_cursor: Vec<MapFeature>,
    refreshes: usize,
}

/// Map engine double. Never calls back into the editor; tests forward
/// add/remove notifications themselves.
#[derive(Default)]
pub struct FakeMap {
    inner: Mutex<FakeMapInner>,
}

impl FakeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(&self, layer: LayerKind) -> Vec<MapFeature> {
        self.inner.lock().layers.get(&layer).cloned().unwrap_or_default()
    }

    pub fn overlays(&self) -> Vec<Overlay> {
        self.inner.lock().overlays.clone()
    }

    pub fn refreshes(&self) -> usize {
        self.inner.lock().refreshes
    }

    /// Features reported by the next `features_at_pixel`.
    pub fn put_under_cursor(&self, features: Vec<MapFeature>) {
        self.inner.lock().under_cursor = features;
    }

    /// Engine-side lookup by feature id, as a user would see it.
    pub fn find(&self, feature_id: &str) -> Option<MapFeature> {
        self.layer(LayerKind::AttributeEdit)
            .into_iter()
            .find(|f| f.feature_id.as_deref() == Some(feature_id))
    }
}

impl MapPort for FakeMap {
    fn add_feature(&self, layer: LayerKind, mut feature: MapFeature) -> String {
        let mut inner = self.inner.lock();
        if feature.uid.is_empty() {
            inner.next_uid += 1;
            feature.uid = format!("ol{}", inner.next_uid);
        }
        let uid = feature.uid.clone();
        inner.layers.entry(layer).or_default().push(feature);
        uid
    }

    fn remove_feature(&self, layer: LayerKind, uid: &str) -> Option<MapFeature> {
        let mut inner = self.inner.lock();
        let features = inner.layers.get_mut(&layer)?;
        let pos = features.iter().position(|f| f.uid == uid)?;
        Some(features.remove(pos))
    }

    fn clear_layer(&self, layer: LayerKind) {
        self.inner.lock().layers.remove(&layer);
    }

    fn features(&self, layer: LayerKind) -> Vec<MapFeature> {
        self.layer(layer)
    }

    fn feature_by_id(&self, layer: LayerKind, id: &str) -> Option<MapFeature> {
        self.layer(layer)
            .into_iter()
            .find(|f| f.feature_id.as_deref() == Some(id))
    }

    fn set_feature_geometry(&self, layer: LayerKind, uid: &str, geometry: Option<Geometry>) -> bool {
        let mut inner = self.inner.lock();
        let Some(feature) = inner
            .layers
            .get_mut(&layer)
            .and_then(|fs| fs.iter_mut().find(|f| f.uid == uid))
        else {
            return false;
        };
        feature.geometry = geometry;
        true
    }

    fn features_at_pixel(&self, _pixel: Pixel) -> Vec<MapFeature> {
        self.inner.lock().under_cursor.clone()
    }

    fn add_overlay(&self, overlay: Overlay) {
        let mut inner = self.inner.lock();
        inner.overlays.retain(|o| o.id != overlay.id);
        inner.overlays.push(overlay);
    }

    fn remove_overlay(&self, id: &str) {
        self.inner.lock().overlays.retain(|o| o.id != id);
    }

    fn refresh(&self, _layer: LayerKind) {
        self.inner.lock().refreshes += 1;
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub const ROADS_PATH: &str = "/ogc/wfst/roads";
pub const ROADS_FEATURES_PATH: &str = "/ogc/wfst/roads/features";
pub const ROADS_TRANSACTION_PATH: &str = "/ogc/wfst/roads/transaction";

pub fn roads_config() -> Value {
    json!({
        "id": "roads",
        "title": "Roads",
        "url": "https://maps.example.org/geoserver/wfs",
        "typeName": "ws:roads",
        "geometryField": "geom",
        "geometryType": "Point",
        "projection": "EPSG:3006",
        "editableFields": [
            { "name": "name", "type": "string" },
            { "name": "lanes", "type": "int" },
            { "name": "surface", "type": "string", "options": ["asphalt", "gravel"] }
        ],
        "nonEditableFields": [
            { "name": "created", "type": "dateTime" }
        ]
    })
}

fn road(local: u32, name: &str, lanes: i64, surface: &str, x: f64) -> Value {
    json!({
        "type": "Feature",
        "id": format!("roads.{local}"),
        "properties": {
            "ws:name": name,
            "lanes": lanes,
            "surface": surface,
            "created": "2024-03-01T10:00:00Z"
        },
        "geometry": { "type": "Point", "coordinates": [x, 100.0] }
    })
}

/// Three roads: `roads.1`, `roads.2`, `roads.42`.
pub fn roads_features() -> Value {
    json!({
        "format": "json",
        "data": {
            "type": "FeatureCollection",
            "features": [
                road(1, "Main", 2, "asphalt", 10.0),
                road(2, "Mill", 1, "gravel", 20.0),
                road(42, "Harbour", 4, "asphalt", 30.0)
            ]
        },
        "srsName": "EPSG:3006"
    })
}

pub fn transaction_response(inserted: usize, updated: usize, deleted: usize) -> String {
    format!(
        r#"<wfs:TransactionResponse xmlns:wfs="http://www.opengis.net/wfs" xmlns:ogc="http://www.opengis.net/ogc">
  <wfs:TransactionSummary>
    <wfs:totalInserted>{inserted}</wfs:totalInserted>
    <wfs:totalUpdated>{updated}</wfs:totalUpdated>
    <wfs:totalDeleted>{deleted}</wfs:totalDeleted>
  </wfs:TransactionSummary>
</wfs:TransactionResponse>"#
    )
}

pub fn roads_api() -> Arc<MockApi> {
    let api = Arc::new(MockApi::new());
    api.respond(ROADS_PATH, roads_config());
    api.respond(ROADS_FEATURES_PATH, roads_features());
    api
}

/// An editor on a frozen clock with no service selected.
pub fn editor(api: Arc<MockApi>) -> (Arc<Editor>, Arc<FakeMap>) {
    let map = Arc::new(FakeMap::new());
    let timeline = Arc::new(Timeline::new(Arc::new(ManualClock::new(1_000))));
    let editor = Editor::with_timeline(
        api,
        Arc::clone(&map) as Arc<dyn MapPort>,
        EditorOptions::default(),
        timeline,
    );
    (Arc::new(editor), map)
}

/// An editor with the `roads` service selected.
pub async fn roads_editor() -> (Arc<Editor>, Arc<MockApi>, Arc<FakeMap>) {
    let api = roads_api();
    let (editor, map) = editor(Arc::clone(&api));
    assert!(editor.select_service("roads").await.expect("select roads"));
    (editor, api, map)
}
