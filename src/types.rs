use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::geometry::Geometry;
use crate::identity::FeatureId;

/// Attribute key → scalar value.
pub type Properties = Map<String, Value>;

/// Property injected on every loaded feature carrying the server feature id.
pub const FID_PROPERTY: &str = "@_fid";

// ============================================================================
// Features
// ============================================================================

/// A geographic entity: id, attributes and an optional geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: FeatureId,
    pub properties: Properties,
    pub geometry: Option<Geometry>,
}

impl Feature {
    pub fn new(id: FeatureId, properties: Properties) -> Self {
        Self {
            id,
            properties,
            geometry: None,
        }
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Build from a GeoJSON `Feature` object.
    ///
    /// The id is taken from `id`, then from `properties.@_fid`, then from
    /// `properties.id`.
    pub fn from_geojson(value: &Value) -> Result<Self, ParseError> {
        let obj = value
            .as_object()
            .ok_or_else(|| ParseError::shape("feature", "not an object"))?;
        let properties = match obj.get("properties") {
            Some(Value::Object(p)) => p.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(other) => {
                return Err(ParseError::shape(
                    "feature",
                    format!("properties is {other}"),
                ))
            }
        };
        let id = obj
            .get("id")
            .and_then(FeatureId::from_value)
            .or_else(|| properties.get(FID_PROPERTY).and_then(FeatureId::from_value))
            .or_else(|| properties.get("id").and_then(FeatureId::from_value))
            .ok_or_else(|| ParseError::shape("feature", "feature has no id"))?;
        let geometry = match obj.get("geometry") {
            Some(g) => Geometry::from_geojson(g)?,
            None => None,
        };
        Ok(Self {
            id,
            properties,
            geometry,
        })
    }

    pub fn to_geojson(&self) -> Value {
        serde_json::json!({
            "type": "Feature",
            "id": self.id.to_value(),
            "properties": Value::Object(self.properties.clone()),
            "geometry": self.geometry.as_ref().map(|g| serde_json::to_value(g).unwrap_or(Value::Null)),
        })
    }
}

/// Features for one layer plus the CRS metadata that came with them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
    pub crs_name: Option<String>,
    pub layer_projection: Option<String>,
}

// ============================================================================
// Layer configuration
// ============================================================================

/// Row of the editable-layer listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSummary {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `typeName` may be configured as one string, a comma list, or an array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeNames {
    One(String),
    Many(Vec<String>),
}

impl TypeNames {
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::One(s) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Self::Many(v) => v
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

/// A field as described by the backend's layer schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub name: String,
    #[serde(default, rename = "type")]
    pub field_type: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<Value>>,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub hidden: bool,
}

/// Full configuration of one editable WFS-T layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayerConfig {
    pub id: String,
    pub title: Option<String>,
    /// WFS endpoint of the upstream server.
    pub url: Option<String>,
    /// `geoserver`, `qgis`, ...: overrides URL sniffing.
    pub server_type: Option<String>,
    pub type_name: Option<TypeNames>,
    /// Namespace URI for the feature type prefix.
    pub uri: Option<String>,
    /// Namespace host used when `uri` is absent.
    pub namespace: Option<String>,
    pub geometry_field: Option<String>,
    pub geometry_type: Option<String>,
    pub projection: Option<String>,
    pub editable_fields: Vec<FieldDef>,
    pub non_editable_fields: Vec<FieldDef>,
    pub hidden_fields: Vec<String>,
}

impl LayerConfig {
    pub fn geometry_name(&self) -> &str {
        self.geometry_field.as_deref().unwrap_or("geometry")
    }
}
