//! EditSession: everything scoped to the active service.
//!
//! A session is created when a service is selected and dropped when it is
//! cleared or replaced, taking its store, undo stacks, caches and alias
//! index with it.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use crate::abort::AbortController;
use crate::bridge::{
    locate_feature, BoundedCache, ColumnFilters, DraftSync, FormBuffer, LayerKind, MapFeature,
    MapPort, Selection,
};
use crate::bus::BusEvent;
use crate::clock::Timeline;
use crate::config::EditorOptions;
use crate::geometry::Geometry;
use crate::identity::{FeatureId, IdIndex};
use crate::schema::{coerce_properties, field_metadata, read_only_keys, FieldMeta, ID_FIELD};
use crate::store::{Action, EditDebouncer, EditState, EditStore, UnsavedSummary};
use crate::types::{FeatureCollection, LayerConfig, Properties};
use crate::undo::UndoStacks;

pub struct EditSession {
    pub(crate) service_id: String,
    pub(crate) config: LayerConfig,
    pub(crate) fields: Vec<FieldMeta>,
    pub(crate) read_only: Vec<String>,
    pub(crate) index: IdIndex,
    pub(crate) store: Arc<EditStore>,
    pub(crate) undo: UndoStacks,
    pub(crate) selection: Selection,
    pub(crate) buffer: FormBuffer,
    pub(crate) filters: ColumnFilters,
    pub(crate) graveyard: BoundedCache<FeatureId, MapFeature>,
    pub(crate) unique_values: BoundedCache<String, Vec<Value>>,
    pub(crate) sync: DraftSync,
    pub(crate) debouncer: EditDebouncer,
    pub(crate) crs_name: Option<String>,
    pub(crate) tooltip_field: Option<String>,
    pub(crate) controller: AbortController,
}

impl EditSession {
    pub(crate) fn new(
        service_id: &str,
        config: LayerConfig,
        options: &EditorOptions,
        timeline: Arc<Timeline>,
        controller: AbortController,
    ) -> Self {
        let fields = field_metadata(&config);
        let read_only = read_only_keys(&fields);
        let tooltip_field = options.tooltip_field.clone().or_else(|| {
            fields
                .iter()
                .find(|f| f.key != ID_FIELD)
                .map(|f| f.key.clone())
        });
        Self {
            service_id: service_id.to_string(),
            config,
            fields,
            read_only,
            index: IdIndex::new(),
            store: Arc::new(EditStore::new(timeline)),
            undo: UndoStacks::default(),
            selection: Selection::new(),
            buffer: FormBuffer::default(),
            filters: ColumnFilters::new(),
            graveyard: BoundedCache::new(options.graveyard_capacity, options.graveyard_evict_batch),
            unique_values: BoundedCache::new(
                options.unique_cache_capacity,
                options.unique_cache_evict_batch,
            ),
            sync: DraftSync::new(),
            debouncer: EditDebouncer::new(options.debounce()),
            crs_name: None,
            tooltip_field,
            controller,
        }
    }

    /// Replace the base features. Pending state, undo history and caches
    /// are reset; selections keep the ids that still exist.
    pub(crate) fn load(&mut self, mut collection: FeatureCollection) {
        for feature in &mut collection.features {
            feature.properties = coerce_properties(&self.fields, &feature.properties);
        }
        self.crs_name = collection
            .crs_name
            .take()
            .or_else(|| self.config.projection.clone());
        self.index = IdIndex::build(collection.features.iter().map(|f| f.id.clone()));
        self.store.dispatch(Action::Init {
            features: collection.features,
        });
        self.undo.clear();
        self.graveyard.clear();
        self.unique_values.clear();
        self.sync.clear();
        let snapshot = self.store.get_snapshot();
        self.selection.retain(|id| snapshot.contains(id));
        if let Some(id) = self.buffer.id.clone() {
            match snapshot.effective_properties(&id) {
                Some(props) => self.buffer.load(Some(id), props),
                None => self.buffer = FormBuffer::default(),
            }
        }
    }

    /// Called after any dispatch that changed the store.
    pub(crate) fn after_store_change(&mut self) {
        self.unique_values.clear();
        let snapshot = self.store.get_snapshot();
        for draft in &snapshot.pending_adds {
            self.index.insert(draft.id.clone());
        }
    }

    pub(crate) fn canonical(&self, id: &FeatureId) -> FeatureId {
        id.aliases()
            .iter()
            .find_map(|alias| self.index.canonical(alias))
            .cloned()
            .unwrap_or_else(|| id.clone())
    }

    pub(crate) fn canonical_all(&self, ids: &[FeatureId]) -> Vec<FeatureId> {
        let mut out: Vec<FeatureId> = Vec::with_capacity(ids.len());
        for id in ids {
            let id = self.canonical(id);
            if !out.contains(&id) {
                out.push(id);
            }
        }
        out
    }

    pub(crate) fn field(&self, key: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Ids of the rows passing the column filters.
    pub(crate) fn visible_ids(&self, state: &EditState) -> HashSet<FeatureId> {
        state
            .rows()
            .into_iter()
            .filter(|(_, props)| self.filters.matches(props))
            .map(|(id, _)| id)
            .collect()
    }

    /// Store summary plus base features whose only change is their geometry.
    pub(crate) fn summary(&self) -> UnsavedSummary {
        let state = self.store.get_snapshot();
        let mut summary = state.summary();
        summary.updates += self
            .undo
            .geometry
            .edited_ids()
            .filter(|id| {
                !id.is_draft() && !state.is_deleted(id) && !state.is_edited(id)
            })
            .count();
        summary
    }

    pub(crate) fn unsaved_event(&self) -> BusEvent {
        let summary = self.summary();
        BusEvent::UnsavedState {
            has_unsaved: !summary.is_empty(),
            summary,
        }
    }

    /// Current geometry of a row: the map's copy when it has one, else the
    /// geometry held by the store.
    pub(crate) fn geometry_of(&self, map: &dyn MapPort, id: &FeatureId) -> Option<Geometry> {
        if let Some(feature) = locate_feature(map, LayerKind::AttributeEdit, id) {
            if feature.geometry.is_some() {
                return feature.geometry;
            }
        }
        let state = self.store.get_snapshot();
        match state.draft(id) {
            Some(draft) => draft.geometry.clone(),
            None => state.feature(id).and_then(|f| f.geometry.clone()),
        }
    }

    /// Put every row with a geometry on the attribute-edit layer.
    pub(crate) fn populate_map(&mut self, map: &dyn MapPort) {
        map.clear_layer(LayerKind::AttributeEdit);
        let state = self.store.get_snapshot();
        let base = state
            .features
            .iter()
            .map(|f| (&f.id, &f.properties, &f.geometry));
        let drafts = state
            .pending_adds
            .iter()
            .map(|d| (&d.id, &d.properties, &d.geometry));
        for (id, props, geometry) in base.chain(drafts) {
            if geometry.is_none() {
                continue;
            }
            let feature = MapFeature::for_row(id, props.clone(), geometry.clone());
            self.sync
                .add_programmatic(map, LayerKind::AttributeEdit, feature);
        }
        map.refresh(LayerKind::AttributeEdit);
    }

    /// Label for tooltips and the feature picker.
    pub(crate) fn label_for(&self, state: &EditState, id: &FeatureId) -> String {
        let value = self
            .tooltip_field
            .as_deref()
            .and_then(|key| state.effective_value(id, key))
            .filter(|v| !v.is_null());
        match value {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(Value::String(_)) | None => id.to_string(),
            Some(other) => other.to_string(),
        }
    }

    /// Editable copy of a row's attributes for a new draft.
    pub(crate) fn editable_copy(&self, props: &Properties) -> Properties {
        crate::store::clone_editable(props, &self.read_only)
    }
}

impl std::fmt::Debug for EditSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("service_id", &self.service_id)
            .field("fields", &self.fields.len())
            .field("store", &self.store)
            .finish()
    }
}
