use std::collections::BTreeSet;

use serde_json::Value;

use crate::geometry::Geometry;
use crate::identity::FeatureId;
use crate::types::Properties;

// ============================================================================
// Table
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TableUndoEntry {
    pub id: FeatureId,
    pub key: String,
    pub prev_value: Value,
    pub when: u64,
}

/// Single-cell edits made in the table view.
#[derive(Debug, Clone, Default)]
pub struct TableUndoStack {
    entries: Vec<TableUndoEntry>,
}

impl TableUndoStack {
    pub fn push(&mut self, entry: TableUndoEntry) {
        self.entries.push(entry);
    }

    pub fn last_when(&self) -> Option<u64> {
        self.entries.last().map(|e| e.when)
    }

    pub fn pop(&mut self) -> Option<TableUndoEntry> {
        self.entries.pop()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ============================================================================
// Form
// ============================================================================

/// Values of the changed fields of one row before a form edit.
#[derive(Debug, Clone, PartialEq)]
pub struct FormUndoEntry {
    pub id: FeatureId,
    pub snapshot: Properties,
    pub when: u64,
}

/// Form edits. One apply over several selected rows pushes one entry per
/// row, all sharing a timestamp; they are undone together.
#[derive(Debug, Clone, Default)]
pub struct FormUndoStack {
    entries: Vec<FormUndoEntry>,
}

impl FormUndoStack {
    pub fn push(&mut self, entry: FormUndoEntry) {
        self.entries.push(entry);
    }

    pub fn last_when(&self) -> Option<u64> {
        self.entries.last().map(|e| e.when)
    }

    /// Pop the contiguous run of entries sharing the top entry's timestamp.
    pub fn pop_group(&mut self) -> Vec<FormUndoEntry> {
        let Some(when) = self.last_when() else {
            return Vec::new();
        };
        let start = self
            .entries
            .iter()
            .rposition(|e| e.when != when)
            .map_or(0, |i| i + 1);
        self.entries.split_off(start)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ============================================================================
// Geometry
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct GeometryUndoEntry {
    pub id: FeatureId,
    pub before: Option<Geometry>,
    pub after: Option<Geometry>,
    pub when: u64,
}

/// Geometry redraws, plus the set of features whose geometry is edited.
#[derive(Debug, Clone, Default)]
pub struct GeometryUndoStack {
    entries: Vec<GeometryUndoEntry>,
    edited: BTreeSet<FeatureId>,
}

impl GeometryUndoStack {
    pub fn push(&mut self, entry: GeometryUndoEntry) {
        self.edited.insert(entry.id.clone());
        self.entries.push(entry);
    }

    pub fn last_when(&self) -> Option<u64> {
        self.entries.last().map(|e| e.when)
    }

    /// Pop the newest entry. The edited marker of its feature is cleared
    /// only when no older entry for the same feature remains.
    pub fn pop(&mut self) -> Option<GeometryUndoEntry> {
        let entry = self.entries.pop()?;
        if !self.entries.iter().any(|e| e.id == entry.id) {
            self.edited.remove(&entry.id);
        }
        Some(entry)
    }

    pub fn is_edited(&self, id: &FeatureId) -> bool {
        self.edited.contains(id)
    }

    pub fn edited_ids(&self) -> impl Iterator<Item = &FeatureId> {
        self.edited.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.edited.clear();
    }
}
