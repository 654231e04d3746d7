//! Mirroring of store drafts onto the map.
//!
//! When the sketch tool draws a feature tagged for attribute editing, the
//! feature is moved from the free-draw layer onto the attribute-edit layer
//! and becomes a store draft. The move itself makes the engine report a
//! remove and an add; [`DraftSync`] records those as expected echoes so the
//! handlers drop them instead of acting on them a second time.

use std::collections::HashMap;

use serde_json::Value;

use crate::identity::{FeatureId, IdIndex};
use crate::store::{Action, DeleteMode, EditStore};
use crate::types::{Properties, FID_PROPERTY};

use super::cache::BoundedCache;
use super::port::{LayerKind, MapFeature, MapPort};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Echo {
    Added,
    Removed,
}

/// What the bridge did with a map notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Our own programmatic change coming back.
    Echo,
    /// Not ours to handle.
    Ignored,
    /// A draft was created for a drawn feature.
    DraftCreated(FeatureId),
    /// A feature removed on the map was marked deleted.
    MarkedDeleted(FeatureId),
}

#[derive(Debug, Default)]
pub struct DraftSync {
    pending: HashMap<(LayerKind, String, Echo), usize>,
}

impl DraftSync {
    pub fn new() -> Self {
        Self::default()
    }

    fn expect(&mut self, layer: LayerKind, uid: &str, echo: Echo) {
        *self.pending.entry((layer, uid.to_string(), echo)).or_default() += 1;
    }

    fn consume(&mut self, layer: LayerKind, uid: &str, echo: Echo) -> bool {
        let key = (layer, uid.to_string(), echo);
        match self.pending.get_mut(&key) {
            Some(n) if *n > 1 => {
                *n -= 1;
                true
            }
            Some(_) => {
                self.pending.remove(&key);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Add a feature to the map without treating the resulting `addfeature`
    /// as user input.
    pub fn add_programmatic(
        &mut self,
        port: &dyn MapPort,
        layer: LayerKind,
        feature: MapFeature,
    ) -> String {
        let uid = port.add_feature(layer, feature);
        self.expect(layer, &uid, Echo::Added);
        uid
    }

    pub fn remove_programmatic(
        &mut self,
        port: &dyn MapPort,
        layer: LayerKind,
        uid: &str,
    ) -> Option<MapFeature> {
        let removed = port.remove_feature(layer, uid);
        if removed.is_some() {
            self.expect(layer, uid, Echo::Removed);
        }
        removed
    }

    /// The engine reported `addfeature`.
    pub fn on_added(
        &mut self,
        port: &dyn MapPort,
        store: &EditStore,
        index: &mut IdIndex,
        layer: LayerKind,
        feature: MapFeature,
        defaults: Properties,
    ) -> SyncOutcome {
        if self.consume(layer, &feature.uid, Echo::Added) {
            return SyncOutcome::Echo;
        }
        if layer != LayerKind::FreeDraw || !feature.attribute_edit {
            return SyncOutcome::Ignored;
        }

        let Some(id) = store.get_snapshot().peek_next_temp_ids(1).into_iter().next() else {
            return SyncOutcome::Ignored;
        };
        let mut moved = match self.remove_programmatic(port, LayerKind::FreeDraw, &feature.uid) {
            Some(f) => f,
            None => feature,
        };
        store.dispatch(Action::CreateDraft {
            properties: defaults.clone(),
            geometry: moved.geometry.clone(),
        });

        let mut properties = defaults;
        properties.insert("id".to_string(), id.to_value());
        moved.uid = String::new();
        moved.feature_id = Some(id.to_string());
        moved.properties = properties;
        moved.attribute_edit = true;
        self.add_programmatic(port, LayerKind::AttributeEdit, moved);
        index.insert(id.clone());
        tracing::debug!(%id, "drawn feature became a draft");
        SyncOutcome::DraftCreated(id)
    }

    /// The engine reported `removefeature` on the attribute-edit layer. The
    /// feature is kept in `graveyard` so undoing the deletion can restore it.
    pub fn on_removed(
        &mut self,
        store: &EditStore,
        index: &IdIndex,
        graveyard: &mut BoundedCache<FeatureId, MapFeature>,
        layer: LayerKind,
        feature: MapFeature,
    ) -> SyncOutcome {
        if self.consume(layer, &feature.uid, Echo::Removed) {
            return SyncOutcome::Echo;
        }
        if layer != LayerKind::AttributeEdit {
            return SyncOutcome::Ignored;
        }
        let Some(id) = resolve_map_feature(&feature, index) else {
            tracing::debug!(uid = %feature.uid, "removed feature has no known id");
            return SyncOutcome::Ignored;
        };
        store.dispatch(Action::SetDeleteState {
            ids: vec![id.clone()],
            mode: DeleteMode::Mark,
        });
        graveyard.insert(id.clone(), feature);
        SyncOutcome::MarkedDeleted(id)
    }

    /// Put graveyard features back on the map for every id that is no longer
    /// marked deleted. Returns the restored ids.
    pub fn restore_from_graveyard(
        &mut self,
        port: &dyn MapPort,
        store: &EditStore,
        graveyard: &mut BoundedCache<FeatureId, MapFeature>,
        ids: &[FeatureId],
    ) -> Vec<FeatureId> {
        let snapshot = store.get_snapshot();
        let mut restored = Vec::new();
        for id in ids {
            if snapshot.is_deleted(id) || !graveyard.contains(id) {
                continue;
            }
            if let Some(mut feature) = graveyard.remove(id) {
                feature.uid = String::new();
                self.add_programmatic(port, LayerKind::AttributeEdit, feature);
                restored.push(id.clone());
            }
        }
        restored
    }
}

/// Canonical editor id of a map feature, trying each id it carries.
pub fn resolve_map_feature(feature: &MapFeature, index: &IdIndex) -> Option<FeatureId> {
    feature.id_candidates().iter().find_map(|raw| {
        let alias = match raw {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        index.canonical(&alias).cloned()
    })
}

/// Copy of `feature` for a new row, carrying its id on the map.
pub fn clone_for_row(feature: &MapFeature, id: &FeatureId, properties: &Properties) -> MapFeature {
    let mut properties = properties.clone();
    properties.insert("id".to_string(), id.to_value());
    properties.remove(FID_PROPERTY);
    MapFeature::for_row(id, properties, feature.geometry.clone())
}
