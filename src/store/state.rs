use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::geometry::Geometry;
use crate::identity::FeatureId;
use crate::types::{Feature, Properties};

/// Local-only marker on a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PendingTag {
    #[default]
    None,
    /// Deleted locally before ever being saved.
    Delete,
}

/// A feature created on the client and not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    /// Always `FeatureId::Draft(n)` with `n < 0`.
    pub id: FeatureId,
    pub properties: Properties,
    /// Geometry captured at creation (GPS, split, merge). Duplicates start
    /// without one; the map bridge clones theirs.
    pub geometry: Option<Geometry>,
    pub pending: PendingTag,
}

impl Draft {
    pub fn is_deleted(&self) -> bool {
        self.pending == PendingTag::Delete
    }
}

/// Field-level store undo record.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreUndoEntry {
    pub id: FeatureId,
    pub key: String,
    pub prev_value: Value,
    pub when: u64,
}

/// One field assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOp {
    pub id: FeatureId,
    pub key: String,
    pub value: Value,
}

impl EditOp {
    pub fn new(id: FeatureId, key: impl Into<String>, value: Value) -> Self {
        Self {
            id,
            key: key.into(),
            value,
        }
    }
}

/// Counts of uncommitted work, published as `edit:unsaved-state`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsavedSummary {
    pub inserts: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl UnsavedSummary {
    pub fn is_empty(&self) -> bool {
        self.inserts == 0 && self.updates == 0 && self.deletes == 0
    }
}

/// Result of applying one field assignment.
pub(crate) struct FieldChange {
    pub prev: Value,
    /// True when the key was not staged for this id before the edit.
    pub newly_staged: bool,
}

// ============================================================================
// EditState
// ============================================================================

/// Snapshot of the store: base features plus the pending overlay.
#[derive(Debug, Clone)]
pub struct EditState {
    pub features: Vec<Feature>,
    pub pending_edits: BTreeMap<FeatureId, Properties>,
    pub pending_adds: Vec<Draft>,
    pub pending_deletes: BTreeSet<FeatureId>,
    pub undo_stack: Vec<StoreUndoEntry>,
    pub next_temp_id: i64,
    index: HashMap<FeatureId, usize>,
}

impl Default for EditState {
    fn default() -> Self {
        Self::new()
    }
}

impl EditState {
    pub fn new() -> Self {
        Self {
            features: Vec::new(),
            pending_edits: BTreeMap::new(),
            pending_adds: Vec::new(),
            pending_deletes: BTreeSet::new(),
            undo_stack: Vec::new(),
            next_temp_id: -1,
            index: HashMap::new(),
        }
    }

    pub(crate) fn set_features(&mut self, features: Vec<Feature>) {
        self.index = features
            .iter()
            .enumerate()
            .map(|(i, f)| (f.id.clone(), i))
            .collect();
        self.features = features;
    }

    pub(crate) fn clear_pending(&mut self) {
        self.pending_edits.clear();
        self.pending_adds.clear();
        self.pending_deletes.clear();
        self.undo_stack.clear();
    }

    pub(crate) fn allocate_temp_id(&mut self) -> FeatureId {
        let id = self.next_temp_id;
        self.next_temp_id -= 1;
        FeatureId::Draft(id)
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn feature(&self, id: &FeatureId) -> Option<&Feature> {
        self.index.get(id).and_then(|&i| self.features.get(i))
    }

    pub fn draft(&self, id: &FeatureId) -> Option<&Draft> {
        self.pending_adds.iter().find(|d| &d.id == id)
    }

    pub(crate) fn draft_mut(&mut self, id: &FeatureId) -> Option<&mut Draft> {
        self.pending_adds.iter_mut().find(|d| &d.id == id)
    }

    pub fn contains(&self, id: &FeatureId) -> bool {
        self.feature(id).is_some() || self.draft(id).is_some()
    }

    /// Current value of `key` with the pending overlay applied.
    pub fn effective_value(&self, id: &FeatureId, key: &str) -> Option<Value> {
        if let Some(draft) = self.draft(id) {
            return Some(draft.properties.get(key).cloned().unwrap_or(Value::Null));
        }
        let feature = self.feature(id)?;
        if let Some(v) = self.pending_edits.get(id).and_then(|patch| patch.get(key)) {
            return Some(v.clone());
        }
        Some(feature.properties.get(key).cloned().unwrap_or(Value::Null))
    }

    /// All properties of a row with the pending overlay applied.
    pub fn effective_properties(&self, id: &FeatureId) -> Option<Properties> {
        if let Some(draft) = self.draft(id) {
            return Some(draft.properties.clone());
        }
        let feature = self.feature(id)?;
        let mut props = feature.properties.clone();
        if let Some(patch) = self.pending_edits.get(id) {
            for (k, v) in patch {
                props.insert(k.clone(), v.clone());
            }
        }
        Some(props)
    }

    /// Every row in display order: base features, then drafts.
    pub fn rows(&self) -> Vec<(FeatureId, Properties)> {
        let base = self.features.iter().filter_map(|f| {
            self.effective_properties(&f.id)
                .map(|props| (f.id.clone(), props))
        });
        let drafts = self
            .pending_adds
            .iter()
            .map(|d| (d.id.clone(), d.properties.clone()));
        base.chain(drafts).collect()
    }

    pub fn is_deleted(&self, id: &FeatureId) -> bool {
        match self.draft(id) {
            Some(d) => d.is_deleted(),
            None => self.pending_deletes.contains(id),
        }
    }

    pub fn is_edited(&self, id: &FeatureId) -> bool {
        self.pending_edits.get(id).is_some_and(|p| !p.is_empty())
    }

    /// The ids the next `n` draft allocations will receive.
    pub fn peek_next_temp_ids(&self, n: usize) -> Vec<FeatureId> {
        (0..n as i64)
            .map(|i| FeatureId::Draft(self.next_temp_id - i))
            .collect()
    }

    pub fn summary(&self) -> UnsavedSummary {
        UnsavedSummary {
            inserts: self.pending_adds.iter().filter(|d| !d.is_deleted()).count(),
            updates: self
                .pending_edits
                .iter()
                .filter(|(id, patch)| !patch.is_empty() && !self.pending_deletes.contains(*id))
                .count(),
            deletes: self.pending_deletes.len(),
        }
    }

    pub fn has_unsaved(&self) -> bool {
        !self.summary().is_empty()
    }

    pub fn last_undo_when(&self) -> Option<u64> {
        self.undo_stack.last().map(|e| e.when)
    }

    // -----------------------------------------------------------------------
    // Field edits
    // -----------------------------------------------------------------------

    /// Apply one assignment. `None` when nothing changed (unknown id, or the
    /// value already matches).
    ///
    /// For base features the patch entry is removed as soon as the value
    /// matches the base feature again, so `pending_edits` never holds no-op
    /// diffs.
    pub(crate) fn apply_field(&mut self, op: &EditOp) -> Option<FieldChange> {
        if let Some(draft) = self.draft_mut(&op.id) {
            let prev = draft.properties.get(&op.key).cloned().unwrap_or(Value::Null);
            if prev == op.value {
                return None;
            }
            draft.properties.insert(op.key.clone(), op.value.clone());
            return Some(FieldChange {
                prev,
                newly_staged: true,
            });
        }

        let original = self
            .feature(&op.id)?
            .properties
            .get(&op.key)
            .cloned()
            .unwrap_or(Value::Null);
        let staged = self
            .pending_edits
            .get(&op.id)
            .and_then(|patch| patch.get(&op.key))
            .cloned();
        let newly_staged = staged.is_none();
        let current = staged.unwrap_or_else(|| original.clone());
        if current == op.value {
            return None;
        }

        if op.value == original {
            if let Some(patch) = self.pending_edits.get_mut(&op.id) {
                patch.remove(&op.key);
                if patch.is_empty() {
                    self.pending_edits.remove(&op.id);
                }
            }
        } else {
            self.pending_edits
                .entry(op.id.clone())
                .or_default()
                .insert(op.key.clone(), op.value.clone());
        }
        Some(FieldChange {
            prev: current,
            newly_staged,
        })
    }
}
