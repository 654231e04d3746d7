//! UndoCoordinator: one undo across the table, form and geometry stacks.
//!
//! Each surface records its own entries with timestamps from the shared
//! [`Timeline`](crate::clock::Timeline). An undo reverses exactly one
//! operation: the one on top of whichever stack holds the newest timestamp.
//! When none of the three is newer than the store's own undo stack, the
//! store's `UNDO` runs instead.

use serde_json::Value;

use crate::bridge::{locate_feature, ColumnFilters, FormBuffer, LayerKind, MapPort};
use crate::identity::FeatureId;
use crate::store::{Action, EditOp, EditStore};

use super::stacks::{FormUndoStack, GeometryUndoEntry, GeometryUndoStack, TableUndoStack};

/// The three surface stacks of one session.
#[derive(Debug, Clone, Default)]
pub struct UndoStacks {
    pub table: TableUndoStack,
    pub form: FormUndoStack,
    pub geometry: GeometryUndoStack,
}

impl UndoStacks {
    pub fn clear(&mut self) {
        self.table.clear();
        self.form.clear();
        self.geometry.clear();
    }

    /// Newest attribute edit across the table, form and store stacks.
    /// Geometry entries are stamped strictly after this.
    pub fn latest_model_edit(&self, store_when: Option<u64>) -> Option<u64> {
        [self.table.last_when(), self.form.last_when(), store_when]
            .into_iter()
            .flatten()
            .max()
    }

    /// Which stack the next undo comes from. On equal timestamps form wins
    /// over table, table over geometry, and any surface over the store.
    pub fn next_target(&self, store_when: Option<u64>) -> Option<UndoTarget> {
        let candidates = [
            (UndoTarget::Form, self.form.last_when()),
            (UndoTarget::Table, self.table.last_when()),
            (UndoTarget::Geometry, self.geometry.last_when()),
            (UndoTarget::Store, store_when),
        ];
        let mut best: Option<(UndoTarget, u64)> = None;
        for (target, when) in candidates {
            let Some(when) = when else { continue };
            if best.map_or(true, |(_, w)| when > w) {
                best = Some((target, when));
            }
        }
        best.map(|(target, _)| target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoTarget {
    Form,
    Table,
    Geometry,
    Store,
}

/// What one undo reversed.
#[derive(Debug, Clone, PartialEq)]
pub enum UndoApplied {
    Form {
        ids: Vec<FeatureId>,
        buffer_restored: bool,
    },
    Table {
        id: FeatureId,
        key: String,
        filter_widened: bool,
    },
    Geometry {
        id: FeatureId,
        located: bool,
    },
    Store,
}

pub struct UndoCoordinator<'a> {
    pub stacks: &'a mut UndoStacks,
    pub store: &'a EditStore,
    pub filters: &'a mut ColumnFilters,
    pub buffer: &'a mut FormBuffer,
    pub map: &'a dyn MapPort,
}

impl UndoCoordinator<'_> {
    /// Reverse the newest operation. `None` when there is nothing to undo.
    pub fn undo(self) -> Option<UndoApplied> {
        let store_when = self.store.get_snapshot().last_undo_when();
        let target = self.stacks.next_target(store_when)?;
        tracing::debug!(?target, "undo");
        match target {
            UndoTarget::Form => Some(self.undo_form()),
            UndoTarget::Table => self.undo_table(),
            UndoTarget::Geometry => self.undo_geometry(),
            UndoTarget::Store => self.store.dispatch(Action::Undo).then_some(UndoApplied::Store),
        }
    }

    fn undo_form(self) -> UndoApplied {
        let group = self.stacks.form.pop_group();
        let ops = group
            .iter()
            .flat_map(|entry| {
                entry
                    .snapshot
                    .iter()
                    .map(|(k, v)| EditOp::new(entry.id.clone(), k.clone(), v.clone()))
            })
            .collect();
        self.store.dispatch(Action::ApplyEdits { ops });

        let mut buffer_restored = false;
        for entry in &group {
            buffer_restored |= self.buffer.restore(&entry.id, &entry.snapshot);
        }
        UndoApplied::Form {
            ids: group.into_iter().map(|e| e.id).collect(),
            buffer_restored,
        }
    }

    fn undo_table(self) -> Option<UndoApplied> {
        let entry = self.stacks.table.pop()?;
        self.store.dispatch(Action::ApplyEdits {
            ops: vec![EditOp::new(
                entry.id.clone(),
                entry.key.clone(),
                entry.prev_value.clone(),
            )],
        });
        let filter_widened = widen_filter(self.filters, &entry.key, &entry.prev_value);
        Some(UndoApplied::Table {
            id: entry.id,
            key: entry.key,
            filter_widened,
        })
    }

    fn undo_geometry(self) -> Option<UndoApplied> {
        let GeometryUndoEntry { id, before, .. } = self.stacks.geometry.pop()?;
        let located = match locate_feature(self.map, LayerKind::AttributeEdit, &id) {
            Some(feature) => {
                self.map
                    .set_feature_geometry(LayerKind::AttributeEdit, &feature.uid, before)
            }
            None => {
                tracing::warn!(%id, "geometry undo: feature not found on map");
                false
            }
        };
        Some(UndoApplied::Geometry { id, located })
    }
}

/// Keep a row visible after its value reverts to one the active filter on
/// `key` hides.
fn widen_filter(filters: &mut ColumnFilters, key: &str, value: &Value) -> bool {
    if !filters.is_active(key) || filters.allows(key, value) {
        return false;
    }
    filters.allow(key, value)
}
