//! Feature identity: one id type for drafts and server features, plus an
//! alias index that folds every spelling of a server id onto one entry.
//!
//! Server ids arrive in several forms depending on which layer produced them:
//! GeoServer qualifies them as `typeName.123`, GeoJSON may hand back `123` as
//! a number or a string, and a map feature's own id can differ from its `id`
//! property. [`IdIndex`] maps every alias string to the canonical
//! [`FeatureId`] so lookups stay O(1) regardless of the spelling used.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Largest magnitude below which every integral `f64` is exact.
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

// ============================================================================
// FeatureId
// ============================================================================

/// Identifier of a feature in an editing session.
///
/// Drafts always carry a strictly negative number. Server features are either
/// a bare id or a `typeName.local` qualified id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum FeatureId {
    Draft(i64),
    Server(String),
    Qualified { type_name: String, local: String },
}

impl FeatureId {
    /// Parse a textual id. Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(n) = raw.parse::<i64>() {
            if n < 0 {
                return Some(Self::Draft(n));
            }
            return Some(Self::Server(raw.to_string()));
        }
        if let Some((prefix, local)) = raw.rsplit_once('.') {
            if !prefix.is_empty() && !local.is_empty() && local.bytes().all(|b| b.is_ascii_digit())
            {
                return Some(Self::Qualified {
                    type_name: prefix.to_string(),
                    local: local.to_string(),
                });
            }
        }
        Some(Self::Server(raw.to_string()))
    }

    /// Interpret a JSON id (number or string).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                // `42.0` names the same feature as `42`.
                let integral = n.as_i64().or_else(|| {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT)
                        .map(|f| f as i64)
                });
                match integral {
                    Some(i) if i < 0 => Some(Self::Draft(i)),
                    Some(i) => Some(Self::Server(i.to_string())),
                    None => Some(Self::Server(n.to_string())),
                }
            }
            Value::String(s) => Self::parse(s),
            _ => None,
        }
    }

    pub fn is_draft(&self) -> bool {
        matches!(self, Self::Draft(_))
    }

    /// Every equivalent textual form of this id, canonical spelling first.
    pub fn aliases(&self) -> Vec<String> {
        match self {
            Self::Draft(n) => vec![n.to_string()],
            Self::Server(s) => vec![s.clone()],
            Self::Qualified { local, .. } => vec![self.to_string(), local.clone()],
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Draft(n) => Value::from(*n),
            other => Value::String(other.to_string()),
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft(n) => write!(f, "{n}"),
            Self::Server(s) => write!(f, "{s}"),
            Self::Qualified { type_name, local } => write!(f, "{type_name}.{local}"),
        }
    }
}

impl TryFrom<Value> for FeatureId {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(&value).ok_or_else(|| format!("not a feature id: {value}"))
    }
}

impl From<FeatureId> for Value {
    fn from(id: FeatureId) -> Self {
        id.to_value()
    }
}

/// Alias list for a raw JSON id. Empty when the value is not an id at all.
pub fn id_aliases(raw: &Value) -> Vec<String> {
    FeatureId::from_value(raw)
        .map(|id| id.aliases())
        .unwrap_or_default()
}

/// Prefer a server id over a draft id; otherwise take the first element.
pub fn pick_preferred_id(ids: &[FeatureId]) -> Option<&FeatureId> {
    ids.iter().find(|id| !id.is_draft()).or_else(|| ids.first())
}

// ============================================================================
// IdIndex
// ============================================================================

/// Alias string → canonical id. First registration of an alias wins.
#[derive(Debug, Clone, Default)]
pub struct IdIndex {
    by_alias: HashMap<String, FeatureId>,
}

impl IdIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(ids: impl IntoIterator<Item = FeatureId>) -> Self {
        let mut index = Self::new();
        for id in ids {
            index.insert(id);
        }
        index
    }

    pub fn insert(&mut self, id: FeatureId) {
        for alias in id.aliases() {
            self.by_alias.entry(alias).or_insert_with(|| id.clone());
        }
    }

    /// Drop every alias that currently resolves to `id`.
    pub fn remove(&mut self, id: &FeatureId) {
        self.by_alias.retain(|_, canonical| canonical != id);
    }

    pub fn canonical(&self, alias: &str) -> Option<&FeatureId> {
        self.by_alias.get(alias.trim())
    }

    pub fn len(&self) -> usize {
        self.by_alias.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_alias.is_empty()
    }
}

/// Resolve any id spelling to the canonical id known to `index`.
///
/// Ids unknown to the index resolve to their own parsed form.
pub fn to_canonical_id(id_like: &Value, index: &IdIndex) -> Option<FeatureId> {
    let parsed = FeatureId::from_value(id_like)?;
    for alias in parsed.aliases() {
        if let Some(found) = index.canonical(&alias) {
            return Some(found.clone());
        }
    }
    Some(parsed)
}
