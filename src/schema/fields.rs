use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{FieldDef, LayerConfig, FID_PROPERTY};

/// Key of the synthetic read-only id column.
pub const ID_FIELD: &str = "id";

// ============================================================================
// FieldType
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Integer,
    Number,
    Boolean,
    Date,
    Datetime,
    Select,
    Multiselect,
    Textarea,
}

impl FieldType {
    /// Map a backend/XSD type name. Unknown names fall back to `Text`.
    pub fn from_schema_type(raw: &str) -> Self {
        let name = raw.rsplit_once(':').map(|(_, l)| l).unwrap_or(raw);
        match name.to_ascii_lowercase().as_str() {
            "int" | "integer" | "long" | "short" | "byte" | "unsignedint" | "unsignedlong"
            | "nonnegativeinteger" | "positiveinteger" => Self::Integer,
            "double" | "float" | "decimal" | "number" | "real" => Self::Number,
            "boolean" | "bool" => Self::Boolean,
            "date" => Self::Date,
            "datetime" | "timestamp" => Self::Datetime,
            "textarea" => Self::Textarea,
            "select" => Self::Select,
            "multiselect" => Self::Multiselect,
            _ => Self::Text,
        }
    }
}

// ============================================================================
// FieldMeta
// ============================================================================

/// Column/field descriptor shared by the table and form surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMeta {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<Value>>,
}

impl FieldMeta {
    fn from_def(def: &FieldDef, read_only: bool) -> Self {
        let field_type = match (&def.options, def.multiple) {
            (Some(_), true) => FieldType::Multiselect,
            (Some(_), false) => FieldType::Select,
            _ => def
                .field_type
                .as_deref()
                .map(FieldType::from_schema_type)
                .unwrap_or(FieldType::Text),
        };
        Self {
            key: def.name.clone(),
            label: def.label.clone().unwrap_or_else(|| def.name.clone()),
            field_type,
            read_only,
            options: def.options.clone(),
        }
    }

    fn id_column() -> Self {
        Self {
            key: ID_FIELD.to_string(),
            label: "ID".to_string(),
            field_type: FieldType::Text,
            read_only: true,
            options: None,
        }
    }
}

/// Derive the ordered field list for a layer.
///
/// The read-only `id` column always comes first. Editable fields follow, then
/// non-editable ones (read-only). The geometry field, hidden fields and
/// internal `@_` keys are left out, and each key appears once.
pub fn field_metadata(config: &LayerConfig) -> Vec<FieldMeta> {
    let geometry = config.geometry_name();
    let hidden: HashSet<&str> = config.hidden_fields.iter().map(String::as_str).collect();

    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(ID_FIELD.to_string());
    let mut out = vec![FieldMeta::id_column()];

    let groups = [
        (&config.editable_fields, false),
        (&config.non_editable_fields, true),
    ];
    for (defs, read_only) in groups {
        for def in defs {
            let key = def.name.as_str();
            if key == geometry
                || key == FID_PROPERTY
                || key.starts_with("@_")
                || def.hidden
                || hidden.contains(key)
            {
                continue;
            }
            if !seen.insert(key.to_string()) {
                continue;
            }
            out.push(FieldMeta::from_def(def, read_only));
        }
    }
    out
}

/// Keys of read-only fields (never copied when duplicating rows).
pub fn read_only_keys(fields: &[FieldMeta]) -> Vec<String> {
    fields
        .iter()
        .filter(|f| f.read_only)
        .map(|f| f.key.clone())
        .collect()
}
