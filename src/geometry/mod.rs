//! GeoJSON geometry model and the GML codec used on the WFS wire.

pub mod gml;

use serde::{Deserialize, Serialize};

/// A coordinate tuple. Only X/Y are carried; Z is dropped on read.
pub type Position = [f64; 2];

/// GeoJSON geometry, serialized as `{"type": ..., "coordinates": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    LineString(Vec<Position>),
    Polygon(Vec<Vec<Position>>),
    MultiPoint(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Point(_) => "Point",
            Self::LineString(_) => "LineString",
            Self::Polygon(_) => "Polygon",
            Self::MultiPoint(_) => "MultiPoint",
            Self::MultiLineString(_) => "MultiLineString",
            Self::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// First coordinate, used to anchor overlays.
    pub fn first_position(&self) -> Option<Position> {
        match self {
            Self::Point(p) => Some(*p),
            Self::LineString(line) | Self::MultiPoint(line) => line.first().copied(),
            Self::Polygon(rings) | Self::MultiLineString(rings) => {
                rings.first().and_then(|r| r.first()).copied()
            }
            Self::MultiPolygon(polys) => polys
                .first()
                .and_then(|rings| rings.first())
                .and_then(|r| r.first())
                .copied(),
        }
    }

    /// Parse a GeoJSON geometry object; `null` yields `Ok(None)`.
    pub fn from_geojson(value: &serde_json::Value) -> Result<Option<Self>, serde_json::Error> {
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value.clone()).map(Some)
    }

    /// Collapse a multi-part geometry built from several single parts, the
    /// way a merge produces it. Mixed or already-multi input is returned as is.
    pub fn merge_parts(parts: Vec<Geometry>) -> Option<Geometry> {
        if parts.len() <= 1 {
            return parts.into_iter().next();
        }
        if parts.iter().all(|g| matches!(g, Self::Polygon(_))) {
            let polys = parts
                .into_iter()
                .filter_map(|g| match g {
                    Self::Polygon(rings) => Some(rings),
                    _ => None,
                })
                .collect();
            return Some(Self::MultiPolygon(polys));
        }
        if parts.iter().all(|g| matches!(g, Self::LineString(_))) {
            let lines = parts
                .into_iter()
                .filter_map(|g| match g {
                    Self::LineString(line) => Some(line),
                    _ => None,
                })
                .collect();
            return Some(Self::MultiLineString(lines));
        }
        if parts.iter().all(|g| matches!(g, Self::Point(_))) {
            let points = parts
                .into_iter()
                .filter_map(|g| match g {
                    Self::Point(p) => Some(p),
                    _ => None,
                })
                .collect();
            return Some(Self::MultiPoint(points));
        }
        parts.into_iter().next()
    }
}
