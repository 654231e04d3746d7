//! GML encoding of [`Geometry`].
//!
//! Writing always produces GML 3.1.1 (what WFS-T 1.1.0 transactions carry).
//! Reading has two dialects: [`GmlVersion::Gml3`] is strict and refuses the
//! GML2 constructs (`coordinates`, `outerBoundaryIs`, ...), which is what lets
//! the feature decoder notice a GML2 payload and retry with the lenient
//! [`GmlVersion::Gml2`] reader.

use std::fmt::Write as _;

use crate::error::ParseError;
use crate::xml::{escape, XmlElement};

use super::{Geometry, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GmlVersion {
    Gml2,
    Gml3,
}

const GEOMETRY_ELEMENTS: &[&str] = &[
    "Point",
    "LineString",
    "LinearRing",
    "Polygon",
    "MultiPoint",
    "MultiLineString",
    "MultiCurve",
    "MultiPolygon",
    "MultiSurface",
];

// ============================================================================
// Writing
// ============================================================================

fn write_positions(out: &mut String, positions: &[Position]) {
    let mut first = true;
    for [x, y] in positions {
        if !first {
            out.push(' ');
        }
        first = false;
        let _ = write!(out, "{x} {y}");
    }
}

fn write_pos_list(out: &mut String, positions: &[Position]) {
    out.push_str("<gml:posList srsDimension=\"2\">");
    write_positions(out, positions);
    out.push_str("</gml:posList>");
}

fn write_polygon_body(out: &mut String, rings: &[Vec<Position>]) {
    for (i, ring) in rings.iter().enumerate() {
        let tag = if i == 0 { "exterior" } else { "interior" };
        let _ = write!(out, "<gml:{tag}><gml:LinearRing>");
        write_pos_list(out, ring);
        let _ = write!(out, "</gml:LinearRing></gml:{tag}>");
    }
}

fn open(out: &mut String, tag: &str, srs_name: Option<&str>) {
    match srs_name {
        Some(srs) => {
            let _ = write!(out, "<gml:{tag} srsName=\"{}\">", escape(srs));
        }
        None => {
            let _ = write!(out, "<gml:{tag}>");
        }
    }
}

/// Serialize a geometry as a GML 3.1.1 fragment using the `gml:` prefix.
pub fn write_geometry(geometry: &Geometry, srs_name: Option<&str>) -> String {
    let mut out = String::new();
    let tag = geometry.type_name();
    open(&mut out, tag, srs_name);
    match geometry {
        Geometry::Point([x, y]) => {
            let _ = write!(out, "<gml:pos>{x} {y}</gml:pos>");
        }
        Geometry::LineString(line) => write_pos_list(&mut out, line),
        Geometry::Polygon(rings) => write_polygon_body(&mut out, rings),
        Geometry::MultiPoint(points) => {
            for [x, y] in points {
                let _ = write!(
                    out,
                    "<gml:pointMember><gml:Point><gml:pos>{x} {y}</gml:pos></gml:Point></gml:pointMember>"
                );
            }
        }
        Geometry::MultiLineString(lines) => {
            for line in lines {
                out.push_str("<gml:lineStringMember><gml:LineString>");
                write_pos_list(&mut out, line);
                out.push_str("</gml:LineString></gml:lineStringMember>");
            }
        }
        Geometry::MultiPolygon(polys) => {
            for rings in polys {
                out.push_str("<gml:polygonMember><gml:Polygon>");
                write_polygon_body(&mut out, rings);
                out.push_str("</gml:Polygon></gml:polygonMember>");
            }
        }
    }
    let _ = write!(out, "</gml:{tag}>");
    out
}

// ============================================================================
// Reading
// ============================================================================

/// The first direct child that is a GML geometry element.
pub fn geometry_child(el: &XmlElement) -> Option<&XmlElement> {
    el.children
        .iter()
        .find(|c| GEOMETRY_ELEMENTS.contains(&c.local_name()))
}

fn numbers(text: &str) -> Result<Vec<f64>, ParseError> {
    text.split_whitespace()
        .map(|t| {
            t.parse::<f64>()
                .map_err(|_| ParseError::Geometry(format!("not a number: {t}")))
        })
        .collect()
}

fn chunk(values: Vec<f64>, dim: usize) -> Result<Vec<Position>, ParseError> {
    if dim < 2 || values.len() % dim != 0 {
        return Err(ParseError::Geometry(format!(
            "{} ordinates do not fit dimension {dim}",
            values.len()
        )));
    }
    Ok(values.chunks(dim).map(|c| [c[0], c[1]]).collect())
}

fn dimension(el: &XmlElement) -> usize {
    el.attr("srsDimension")
        .or_else(|| el.attr("dimension"))
        .and_then(|d| d.parse().ok())
        .unwrap_or(2)
}

fn read_pos(el: &XmlElement) -> Result<Position, ParseError> {
    let values = numbers(el.text())?;
    if values.len() < 2 {
        return Err(ParseError::Geometry("pos needs two ordinates".to_string()));
    }
    Ok([values[0], values[1]])
}

fn read_coordinates(el: &XmlElement) -> Result<Vec<Position>, ParseError> {
    let cs = el.attr("cs").unwrap_or(",");
    let decimal = el.attr("decimal").unwrap_or(".");
    el.text()
        .split_whitespace()
        .map(|tuple| {
            let parts: Result<Vec<f64>, ParseError> = tuple
                .split(cs)
                .map(|p| {
                    let p = if decimal == "." {
                        p.to_string()
                    } else {
                        p.replace(decimal, ".")
                    };
                    p.parse::<f64>()
                        .map_err(|_| ParseError::Geometry(format!("bad coordinate: {tuple}")))
                })
                .collect();
            let parts = parts?;
            if parts.len() < 2 {
                return Err(ParseError::Geometry(format!("bad coordinate: {tuple}")));
            }
            Ok([parts[0], parts[1]])
        })
        .collect()
}

fn read_coord(el: &XmlElement) -> Result<Position, ParseError> {
    let axis = |name: &str| -> Result<f64, ParseError> {
        el.child(name)
            .and_then(|c| c.text().parse().ok())
            .ok_or_else(|| ParseError::Geometry(format!("coord missing {name}")))
    };
    Ok([axis("X")?, axis("Y")?])
}

fn gml2_only(construct: &str) -> ParseError {
    ParseError::Geometry(format!("GML2 construct <{construct}> in a GML3 document"))
}

fn read_points(el: &XmlElement, version: GmlVersion) -> Result<Vec<Position>, ParseError> {
    if let Some(list) = el.child("posList") {
        return chunk(numbers(list.text())?, dimension(list));
    }
    let pos: Vec<&XmlElement> = el.children_named("pos").collect();
    if !pos.is_empty() {
        return pos.into_iter().map(read_pos).collect();
    }
    if let Some(coords) = el.child("coordinates") {
        return match version {
            GmlVersion::Gml2 => read_coordinates(coords),
            GmlVersion::Gml3 => Err(gml2_only("coordinates")),
        };
    }
    let coord: Vec<&XmlElement> = el.children_named("coord").collect();
    if !coord.is_empty() {
        return match version {
            GmlVersion::Gml2 => coord.into_iter().map(read_coord).collect(),
            GmlVersion::Gml3 => Err(gml2_only("coord")),
        };
    }
    Err(ParseError::Geometry(format!(
        "<{}> has no coordinates",
        el.name
    )))
}

fn read_ring(boundary: &XmlElement, version: GmlVersion) -> Result<Vec<Position>, ParseError> {
    let ring = boundary
        .child("LinearRing")
        .ok_or_else(|| ParseError::Geometry("boundary without LinearRing".to_string()))?;
    read_points(ring, version)
}

fn read_polygon(el: &XmlElement, version: GmlVersion) -> Result<Vec<Vec<Position>>, ParseError> {
    let mut rings = Vec::new();
    if let Some(exterior) = el.child("exterior") {
        rings.push(read_ring(exterior, version)?);
        for interior in el.children_named("interior") {
            rings.push(read_ring(interior, version)?);
        }
        return Ok(rings);
    }
    if let Some(outer) = el.child("outerBoundaryIs") {
        if version == GmlVersion::Gml3 {
            return Err(gml2_only("outerBoundaryIs"));
        }
        rings.push(read_ring(outer, version)?);
        for inner in el.children_named("innerBoundaryIs") {
            rings.push(read_ring(inner, version)?);
        }
        return Ok(rings);
    }
    Err(ParseError::Geometry("polygon without exterior ring".to_string()))
}

/// Geometries nested under `singular` member elements or a `plural` wrapper.
fn members<'a>(el: &'a XmlElement, singular: &'a str, plural: &str) -> Vec<&'a XmlElement> {
    let mut out: Vec<&XmlElement> = el
        .children_named(singular)
        .filter_map(geometry_child)
        .collect();
    if let Some(wrapper) = el.child(plural) {
        out.extend(
            wrapper
                .children
                .iter()
                .filter(|c| GEOMETRY_ELEMENTS.contains(&c.local_name())),
        );
    }
    out
}

/// Read the geometry element `el` (e.g. a `gml:Polygon`).
pub fn read_geometry(el: &XmlElement, version: GmlVersion) -> Result<Geometry, ParseError> {
    match el.local_name() {
        "Point" => {
            if let Some(pos) = el.child("pos") {
                return read_pos(pos).map(Geometry::Point);
            }
            let points = read_points(el, version)?;
            points
                .first()
                .copied()
                .map(Geometry::Point)
                .ok_or_else(|| ParseError::Geometry("empty point".to_string()))
        }
        "LineString" | "LinearRing" => read_points(el, version).map(Geometry::LineString),
        "Polygon" => read_polygon(el, version).map(Geometry::Polygon),
        "MultiPoint" => {
            let mut points = Vec::new();
            for member in members(el, "pointMember", "pointMembers") {
                match read_geometry(member, version)? {
                    Geometry::Point(p) => points.push(p),
                    other => {
                        return Err(ParseError::Geometry(format!(
                            "{} inside MultiPoint",
                            other.type_name()
                        )))
                    }
                }
            }
            Ok(Geometry::MultiPoint(points))
        }
        "MultiLineString" | "MultiCurve" => {
            let mut lines = Vec::new();
            let mut found = members(el, "lineStringMember", "lineStringMembers");
            found.extend(members(el, "curveMember", "curveMembers"));
            for member in found {
                match read_geometry(member, version)? {
                    Geometry::LineString(line) => lines.push(line),
                    other => {
                        return Err(ParseError::Geometry(format!(
                            "{} inside {}",
                            other.type_name(),
                            el.local_name()
                        )))
                    }
                }
            }
            Ok(Geometry::MultiLineString(lines))
        }
        "MultiPolygon" | "MultiSurface" => {
            let mut polys = Vec::new();
            let mut found = members(el, "polygonMember", "polygonMembers");
            found.extend(members(el, "surfaceMember", "surfaceMembers"));
            for member in found {
                match read_geometry(member, version)? {
                    Geometry::Polygon(rings) => polys.push(rings),
                    other => {
                        return Err(ParseError::Geometry(format!(
                            "{} inside {}",
                            other.type_name(),
                            el.local_name()
                        )))
                    }
                }
            }
            Ok(Geometry::MultiPolygon(polys))
        }
        other => Err(ParseError::Geometry(format!("unsupported element <{other}>"))),
    }
}
