//! Decoding of `/features` payloads into a [`FeatureCollection`].
//!
//! The backend answers either with pre-parsed GeoJSON (`format: "json"`) or
//! with the raw WFS response (`format: "xml"`). XML goes through the strict
//! GML3 reader first; when that yields nothing but the document carries
//! GML2-style `featureMember` elements it is read again with the GML2 reader.
//! Some servers advertise WFS 1.1.0 and still encode GML2 polygons.

use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::geometry::gml::{self, GmlVersion};
use crate::geometry::Geometry;
use crate::identity::FeatureId;
use crate::types::{Feature, FeatureCollection, Properties, FID_PROPERTY};
use crate::xml::{self, XmlElement};

const GML2_MARKER: &str = "featureMember";

/// Decode the body of `GET /ogc/wfst/{id}/features`.
pub fn decode_features(payload: &Value) -> Result<FeatureCollection, ParseError> {
    let format = payload.get("format").and_then(Value::as_str);
    let data = payload.get("data").unwrap_or(payload);

    let mut collection = match (format, data) {
        (Some("xml"), Value::String(text)) => decode_xml(text)?,
        (Some("xml"), _) => return Err(ParseError::shape("features", "xml data is not a string")),
        (_, Value::String(text)) => decode_json(&serde_json::from_str(text)?)?,
        (_, value) => decode_json(value)?,
    };

    if let Some(srs) = payload.get("srsName").and_then(Value::as_str) {
        collection.crs_name = Some(srs.to_string());
    }
    collection.layer_projection = payload
        .get("layerProjection")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(collection)
}

// ============================================================================
// JSON
// ============================================================================

fn strip_namespace(key: &str) -> &str {
    if key.starts_with("@_") {
        return key;
    }
    key.rsplit_once(':').map(|(_, local)| local).unwrap_or(key)
}

fn normalize_json_feature(raw: &Value) -> Value {
    let Some(obj) = raw.as_object() else {
        return raw.clone();
    };
    let mut out = obj.clone();
    let mut props: Properties = obj
        .get("properties")
        .and_then(Value::as_object)
        .map(|p| {
            p.iter()
                .map(|(k, v)| (strip_namespace(k).to_string(), v.clone()))
                .collect()
        })
        .unwrap_or_default();
    if let Some(id) = obj.get("id").filter(|id| !id.is_null()) {
        props.insert(FID_PROPERTY.to_string(), id.clone());
    }
    out.insert("properties".to_string(), Value::Object(props));
    Value::Object(out)
}

/// Decode a GeoJSON FeatureCollection, stripping `ns:` prefixes from
/// property keys and injecting `@_fid` from each feature id.
pub fn decode_json(value: &Value) -> Result<FeatureCollection, ParseError> {
    let raw_features = value
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::shape("features", "no features array"))?;

    let mut features = Vec::with_capacity(raw_features.len());
    for raw in raw_features {
        match Feature::from_geojson(&normalize_json_feature(raw)) {
            Ok(f) => features.push(f),
            Err(err) => tracing::warn!(%err, "skipping undecodable feature"),
        }
    }

    let crs_name = value
        .pointer("/crs/properties/name")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(FeatureCollection {
        features,
        crs_name,
        layer_projection: None,
    })
}

// ============================================================================
// GML
// ============================================================================

fn feature_elements(root: &XmlElement) -> Vec<&XmlElement> {
    let mut out = Vec::new();
    for child in &root.children {
        match child.local_name() {
            "featureMember" | "member" | "featureMembers" => out.extend(child.children.iter()),
            _ => {}
        }
    }
    out
}

fn is_nil(el: &XmlElement) -> bool {
    el.attr("nil") == Some("true") || (el.text().is_empty() && el.children.is_empty())
}

fn read_feature(
    el: &XmlElement,
    version: GmlVersion,
    srs: &mut Option<String>,
) -> Result<Option<Feature>, ParseError> {
    let Some(id) = el
        .attr("id")
        .or_else(|| el.attr("fid"))
        .and_then(FeatureId::parse)
    else {
        tracing::debug!(element = %el.name, "feature member without id skipped");
        return Ok(None);
    };

    let mut properties = Map::new();
    let mut geometry: Option<Geometry> = None;
    for child in &el.children {
        let key = child.local_name();
        if key == "boundedBy" {
            continue;
        }
        if let Some(geom_el) = gml::geometry_child(child) {
            if srs.is_none() {
                *srs = geom_el.attr("srsName").map(str::to_string);
            }
            geometry = Some(gml::read_geometry(geom_el, version)?);
            continue;
        }
        let value = if is_nil(child) {
            Value::Null
        } else {
            Value::String(child.text().to_string())
        };
        properties.insert(key.to_string(), value);
    }
    properties.insert(FID_PROPERTY.to_string(), id.to_value());

    Ok(Some(Feature {
        id,
        properties,
        geometry,
    }))
}

/// Read every feature member of a WFS FeatureCollection with one GML reader.
/// A member whose geometry the reader rejects is skipped.
pub fn read_gml_features(root: &XmlElement, version: GmlVersion) -> FeatureCollection {
    let mut crs_name = None;
    let mut features = Vec::new();
    for el in feature_elements(root) {
        match read_feature(el, version, &mut crs_name) {
            Ok(Some(f)) => features.push(f),
            Ok(None) => {}
            Err(err) => tracing::debug!(?version, %err, "feature member rejected"),
        }
    }
    FeatureCollection {
        features,
        crs_name,
        layer_projection: None,
    }
}

/// Decode a raw WFS GetFeature response.
pub fn decode_xml(text: &str) -> Result<FeatureCollection, ParseError> {
    let root = xml::parse(text)?;
    let collection = read_gml_features(&root, GmlVersion::Gml3);
    if collection.features.is_empty() && text.contains(GML2_MARKER) {
        tracing::debug!("GML3 reader found no features, retrying as GML2");
        return Ok(read_gml_features(&root, GmlVersion::Gml2));
    }
    Ok(collection)
}
