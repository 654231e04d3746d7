use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::types::Properties;

/// Facet key of a cell value. Null and empty string share one facet.
pub fn facet_key(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Per-column allowed-value filters of the table view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnFilters {
    allowed: BTreeMap<String, BTreeSet<String>>,
}

impl ColumnFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict `key` to `values`. An empty set hides every row.
    pub fn set<'a>(&mut self, key: impl Into<String>, values: impl IntoIterator<Item = &'a Value>) {
        self.allowed
            .insert(key.into(), values.into_iter().map(facet_key).collect());
    }

    pub fn clear(&mut self, key: &str) {
        self.allowed.remove(key);
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.allowed.contains_key(key)
    }

    /// Widen an active filter so `value` passes. Returns `true` when the
    /// filter changed.
    pub fn allow(&mut self, key: &str, value: &Value) -> bool {
        match self.allowed.get_mut(key) {
            Some(set) => set.insert(facet_key(value)),
            None => false,
        }
    }

    pub fn allows(&self, key: &str, value: &Value) -> bool {
        self.allowed
            .get(key)
            .map_or(true, |set| set.contains(&facet_key(value)))
    }

    pub fn matches(&self, properties: &Properties) -> bool {
        self.allowed.iter().all(|(key, set)| {
            let value = properties.get(key).unwrap_or(&Value::Null);
            set.contains(&facet_key(value))
        })
    }
}
