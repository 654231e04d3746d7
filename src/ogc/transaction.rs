//! WFS-T 1.1.0 Transaction documents.
//!
//! Servers disagree on feature id spelling in filters: GeoServer wants the
//! `typeName.id` form, QGIS Server and most others take the bare id. The
//! dialect is picked from the configured `serverType`, falling back to a URL
//! substring match. This is a best-effort heuristic, not capability
//! negotiation; unknown servers get the bare-id behaviour.

use std::fmt::Write as _;

use serde_json::Value;

use crate::geometry::gml::write_geometry;
use crate::geometry::Geometry;
use crate::identity::FeatureId;
use crate::schema::ID_FIELD;
use crate::types::{LayerConfig, Properties};
use crate::xml::escape;

const WFS_NS: &str = "http://www.opengis.net/wfs";
const GML_NS: &str = "http://www.opengis.net/gml";
const OGC_NS: &str = "http://www.opengis.net/ogc";

// ============================================================================
// Request shapes
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertFeature {
    pub properties: Properties,
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateFeature {
    pub id: FeatureId,
    pub properties: Properties,
    pub geometry: Option<Geometry>,
}

/// Everything one commit sends to the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionRequest {
    pub inserts: Vec<InsertFeature>,
    pub updates: Vec<UpdateFeature>,
    pub deletes: Vec<FeatureId>,
    pub srs_name: Option<String>,
    /// Overrides the layer's configured geometry field.
    pub geometry_name: Option<String>,
}

impl TransactionRequest {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

// ============================================================================
// Dialects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerDialect {
    GeoServer,
    Qgis,
    Generic,
}

impl ServerDialect {
    fn from_hint(hint: &str) -> Option<Self> {
        let hint = hint.to_ascii_lowercase();
        if hint.contains("geoserver") {
            Some(Self::GeoServer)
        } else if hint.contains("qgis") {
            Some(Self::Qgis)
        } else {
            None
        }
    }

    pub fn detect(config: &LayerConfig) -> Self {
        if let Some(server_type) = config.server_type.as_deref() {
            return Self::from_hint(server_type).unwrap_or(Self::Generic);
        }
        config
            .url
            .as_deref()
            .and_then(Self::from_hint)
            .unwrap_or(Self::Generic)
    }
}

/// Spell `id` the way `dialect` expects inside an `ogc:FeatureId` filter.
/// Ids that are already qualified pass through unchanged.
pub fn format_feature_id(id: &FeatureId, type_name: &str, dialect: ServerDialect) -> String {
    let raw = id.to_string();
    if raw.contains('.') || raw.contains(':') {
        return raw;
    }
    match dialect {
        ServerDialect::GeoServer => {
            let local = type_name.rsplit_once(':').map_or(type_name, |(_, l)| l);
            format!("{local}.{raw}")
        }
        ServerDialect::Qgis | ServerDialect::Generic => raw,
    }
}

// ============================================================================
// Layer naming
// ============================================================================

/// Feature type name plus its namespace binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeBinding {
    /// As used in `typeName` attributes (`ws:roads`).
    pub qualified: String,
    pub prefix: Option<String>,
    pub namespace_uri: String,
}

impl TypeBinding {
    fn element(&self, local: &str) -> String {
        match &self.prefix {
            Some(p) => format!("{p}:{local}"),
            None => local.to_string(),
        }
    }

    fn local_type(&self) -> &str {
        self.qualified
            .rsplit_once(':')
            .map_or(self.qualified.as_str(), |(_, l)| l)
    }
}

fn host_of(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map_or(url, |(_, r)| r);
    let host = rest.split(['/', '?', '#']).next()?;
    let host = host.rsplit_once('@').map_or(host, |(_, h)| h);
    (!host.is_empty()).then_some(host)
}

/// Resolve the feature type of `config`. A layer configured with several
/// type names uses the first one.
pub fn resolve_type_binding(config: &LayerConfig) -> TypeBinding {
    let names = config
        .type_name
        .as_ref()
        .map(|t| t.names())
        .unwrap_or_default();
    if names.len() > 1 {
        tracing::warn!(
            layer = %config.id,
            type_names = ?names,
            "layer has several typeNames, using the first"
        );
    }
    let qualified = names.into_iter().next().unwrap_or_else(|| config.id.clone());
    let prefix = qualified.split_once(':').map(|(p, _)| p.to_string());

    let namespace_uri = match config.uri.as_deref().filter(|u| !u.is_empty()) {
        Some(uri) => uri.to_string(),
        None => {
            let ns = config
                .namespace
                .as_deref()
                .filter(|n| !n.is_empty())
                .or_else(|| config.url.as_deref().and_then(host_of))
                .unwrap_or("localhost");
            let tail = prefix.as_deref().unwrap_or(config.id.as_str());
            format!("http://{ns}/wfs/{tail}")
        }
    };

    TypeBinding {
        qualified,
        prefix,
        namespace_uri,
    }
}

// ============================================================================
// Document
// ============================================================================

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(scalar_text)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

fn writable(key: &str, geometry_name: &str) -> bool {
    key != ID_FIELD && !key.starts_with("@_") && key != geometry_name
}

struct Writer<'a> {
    out: String,
    binding: &'a TypeBinding,
    dialect: ServerDialect,
    geometry_name: &'a str,
    srs_name: Option<&'a str>,
}

impl Writer<'_> {
    fn open(&mut self) {
        let _ = write!(
            self.out,
            r#"<wfs:Transaction service="WFS" version="1.1.0" xmlns:wfs="{WFS_NS}" xmlns:gml="{GML_NS}" xmlns:ogc="{OGC_NS}""#
        );
        let ns = escape(&self.binding.namespace_uri);
        match &self.binding.prefix {
            Some(p) => {
                let _ = write!(self.out, r#" xmlns:{p}="{ns}""#);
            }
            None => {
                let _ = write!(self.out, r#" xmlns="{ns}""#);
            }
        }
        self.out.push('>');
    }

    fn filter(&mut self, id: &FeatureId) {
        let fid = format_feature_id(id, self.binding.local_type(), self.dialect);
        let _ = write!(
            self.out,
            r#"<ogc:Filter><ogc:FeatureId fid="{}"/></ogc:Filter>"#,
            escape(&fid)
        );
    }

    fn inserts(&mut self, inserts: &[InsertFeature]) {
        if inserts.is_empty() {
            return;
        }
        self.out.push_str("<wfs:Insert>");
        let type_el = self.binding.element(self.binding.local_type());
        for feature in inserts {
            let _ = write!(self.out, "<{type_el}>");
            for (key, value) in &feature.properties {
                if !writable(key, self.geometry_name) {
                    continue;
                }
                let Some(text) = scalar_text(value) else {
                    continue;
                };
                let el = self.binding.element(key);
                let _ = write!(self.out, "<{el}>{}</{el}>", escape(&text));
            }
            if let Some(geometry) = &feature.geometry {
                let el = self.binding.element(self.geometry_name);
                let gml = write_geometry(geometry, self.srs_name);
                let _ = write!(self.out, "<{el}>{gml}</{el}>");
            }
            let _ = write!(self.out, "</{type_el}>");
        }
        self.out.push_str("</wfs:Insert>");
    }

    fn update(&mut self, update: &UpdateFeature) {
        let _ = write!(
            self.out,
            r#"<wfs:Update typeName="{}">"#,
            escape(&self.binding.qualified)
        );
        for (key, value) in &update.properties {
            if !writable(key, self.geometry_name) {
                continue;
            }
            let _ = write!(self.out, "<wfs:Property><wfs:Name>{}</wfs:Name>", escape(key));
            if let Some(text) = scalar_text(value) {
                let _ = write!(self.out, "<wfs:Value>{}</wfs:Value>", escape(&text));
            }
            self.out.push_str("</wfs:Property>");
        }
        if let Some(geometry) = &update.geometry {
            let gml = write_geometry(geometry, self.srs_name);
            let _ = write!(
                self.out,
                "<wfs:Property><wfs:Name>{}</wfs:Name><wfs:Value>{gml}</wfs:Value></wfs:Property>",
                escape(self.geometry_name)
            );
        }
        self.filter(&update.id);
        self.out.push_str("</wfs:Update>");
    }

    fn delete(&mut self, id: &FeatureId) {
        let _ = write!(
            self.out,
            r#"<wfs:Delete typeName="{}">"#,
            escape(&self.binding.qualified)
        );
        self.filter(id);
        self.out.push_str("</wfs:Delete>");
    }
}

/// Build the Transaction XML for `request` against `config`.
pub fn build_transaction(config: &LayerConfig, request: &TransactionRequest) -> String {
    let binding = resolve_type_binding(config);
    let dialect = ServerDialect::detect(config);
    let geometry_name = request
        .geometry_name
        .as_deref()
        .unwrap_or_else(|| config.geometry_name());
    tracing::debug!(
        layer = %config.id,
        ?dialect,
        type_name = %binding.qualified,
        inserts = request.inserts.len(),
        updates = request.updates.len(),
        deletes = request.deletes.len(),
        "building WFS-T transaction"
    );

    let mut w = Writer {
        out: String::new(),
        binding: &binding,
        dialect,
        geometry_name,
        srs_name: request.srs_name.as_deref(),
    };
    w.open();
    w.inserts(&request.inserts);
    for update in &request.updates {
        w.update(update);
    }
    for id in &request.deletes {
        w.delete(id);
    }
    w.out.push_str("</wfs:Transaction>");
    w.out
}
