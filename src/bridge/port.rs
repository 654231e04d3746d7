use serde_json::Value;

use crate::geometry::{Geometry, Position};
use crate::identity::FeatureId;
use crate::types::{Properties, FID_PROPERTY};

/// The two map layers the editor touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// Features of the active service, styled by the editor.
    AttributeEdit,
    /// Scratch layer owned by the sketch tool.
    FreeDraw,
}

/// A feature as the map engine holds it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapFeature {
    /// Engine-internal id. Empty on a feature the engine has not seen yet.
    pub uid: String,
    /// The engine's own feature id, when one was assigned.
    pub feature_id: Option<String>,
    pub properties: Properties,
    pub geometry: Option<Geometry>,
    /// Set by the sketch tool on features drawn for attribute editing.
    pub attribute_edit: bool,
}

impl MapFeature {
    /// A map feature mirroring an editor row.
    pub fn for_row(id: &FeatureId, properties: Properties, geometry: Option<Geometry>) -> Self {
        Self {
            uid: String::new(),
            feature_id: Some(id.to_string()),
            properties,
            geometry,
            attribute_edit: true,
        }
    }

    /// Every id the feature carries, most specific first: engine id, then
    /// the `@_fid` and `id` properties.
    pub fn id_candidates(&self) -> Vec<Value> {
        let mut out = Vec::new();
        if let Some(fid) = &self.feature_id {
            out.push(Value::String(fid.clone()));
        }
        for key in [FID_PROPERTY, "id"] {
            if let Some(v) = self.properties.get(key).filter(|v| !v.is_null()) {
                out.push(v.clone());
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pixel {
    pub x: f64,
    pub y: f64,
}

/// A positioned DOM overlay (tooltips).
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub id: String,
    pub position: Position,
    pub text: String,
}

/// Capabilities the editor needs from the map engine.
///
/// Implementations must not call back into the editor from inside these
/// methods; map events caused by them (add/remove notifications) should be
/// forwarded once the call has returned. The editor recognises and drops
/// those echoes.
pub trait MapPort: Send + Sync {
    /// Add `feature` to `layer` and return its engine uid.
    fn add_feature(&self, layer: LayerKind, feature: MapFeature) -> String;

    fn remove_feature(&self, layer: LayerKind, uid: &str) -> Option<MapFeature>;

    fn clear_layer(&self, layer: LayerKind);

    fn features(&self, layer: LayerKind) -> Vec<MapFeature>;

    /// Lookup by the engine's feature id.
    fn feature_by_id(&self, layer: LayerKind, id: &str) -> Option<MapFeature>;

    /// Replace the geometry of a feature. Returns `false` for an unknown uid.
    fn set_feature_geometry(&self, layer: LayerKind, uid: &str, geometry: Option<Geometry>)
        -> bool;


    /// Features under a screen pixel, topmost first.
    fn features_at_pixel(&self, pixel: Pixel) -> Vec<MapFeature>;

    fn add_overlay(&self, overlay: Overlay);

    fn remove_overlay(&self, id: &str);

    /// Re-run styling for a layer.
    fn refresh(&self, layer: LayerKind);
}
