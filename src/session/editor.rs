//! Editor: the top-level handle a host application drives.
//!
//! All service-scoped state lives in one [`EditSession`] behind a mutex.
//! Synchronous operations lock it, mutate, and collect bus events in an
//! outbox that is published only after the lock is released, so bus
//! listeners may call straight back into the editor. Async operations never
//! hold the lock across an await; they re-check their abort signal before
//! touching the session again.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::Value;

use crate::abort::{AbortController, AbortSignal};
use crate::bridge::{
    clone_for_row, facet_key, locate_feature, resolve_map_feature, resolve_style, ColumnFilters,
    FormBuffer, LayerKind, MapFeature, MapPort, Overlay, PickCandidate, PickResult, Pixel,
    Selection, StyleContext, StyleKey, SyncOutcome,
};
use crate::bus::{BusEvent, EventBus, SelectMode, SelectionSource};
use crate::clock::Timeline;
use crate::config::EditorOptions;
use crate::error::{EditError, Result};
use crate::geometry::{Geometry, Position};
use crate::identity::FeatureId;
use crate::ogc::{FeatureApi, FeatureQuery, OgcClient};
use crate::reactive::Unsubscribe;
use crate::schema::{coerce_value, FieldMeta};
use crate::store::{Action, DeleteMode, EditOp, Snapshot, UnsavedSummary};
use crate::types::{FeatureCollection, LayerConfig, LayerSummary, Properties};
use crate::undo::{FormUndoEntry, GeometryUndoEntry, TableUndoEntry, UndoApplied, UndoCoordinator};

use super::commit::{build_request, CommitReport};
use super::state::EditSession;

/// Overlay id of the hover tooltip.
pub const TOOLTIP_OVERLAY: &str = "wfst-edit-tooltip";

type Outbox = Vec<BusEvent>;

pub struct Editor {
    client: OgcClient,
    map: Arc<dyn MapPort>,
    bus: EventBus,
    options: EditorOptions,
    timeline: Arc<Timeline>,
    session: Mutex<Option<EditSession>>,
    /// Controller of the service load in flight, if any.
    loading: Mutex<Option<AbortController>>,
}

impl Editor {
    pub fn new(api: Arc<dyn FeatureApi>, map: Arc<dyn MapPort>, options: EditorOptions) -> Self {
        Self::with_timeline(api, map, options, Arc::new(Timeline::system()))
    }

    pub fn with_timeline(
        api: Arc<dyn FeatureApi>,
        map: Arc<dyn MapPort>,
        options: EditorOptions,
        timeline: Arc<Timeline>,
    ) -> Self {
        let options = options.normalized();
        Self {
            client: OgcClient::with_base_path(api, options.base_path.clone()),
            map,
            bus: EventBus::new(),
            options,
            timeline,
            session: Mutex::new(None),
            loading: Mutex::new(None),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn options(&self) -> &EditorOptions {
        &self.options
    }

    /// Route bus events from other plugins into [`Editor::handle_event`].
    /// The listener holds only a weak reference to the editor.
    pub fn connect_bus(self: &Arc<Self>) -> Unsubscribe {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.bus.subscribe(move |event| {
            let Some(editor) = weak.upgrade() else {
                return;
            };
            if let Err(e) = editor.handle_event(event) {
                tracing::warn!(event = event.kind().name(), error = %e, "bus event failed");
            }
        })
    }

    // -----------------------------------------------------------------------
    // Session plumbing
    // -----------------------------------------------------------------------

    fn publish_all(&self, events: Outbox) {
        for event in events {
            self.bus.publish(event);
        }
    }

    /// Run `f` against the active session. Store changes made by `f` clear
    /// derived caches, restyle the map and publish `edit:unsaved-state`.
    fn with_session<T>(&self, f: impl FnOnce(&mut EditSession, &mut Outbox) -> Result<T>) -> Result<T> {
        let mut events = Outbox::new();
        let result = {
            let mut guard = self.session.lock();
            let session = guard.as_mut().ok_or(EditError::NoActiveService)?;
            let version = session.store.version();
            let result = f(session, &mut events);
            if session.store.version() != version {
                session.after_store_change();
                self.map.refresh(LayerKind::AttributeEdit);
                events.push(session.unsaved_event());
            }
            result
        };
        self.publish_all(events);
        result
    }

    fn read_session<T>(&self, f: impl FnOnce(&EditSession) -> T) -> Option<T> {
        self.session.lock().as_ref().map(f)
    }

    pub fn service_id(&self) -> Option<String> {
        self.read_session(|s| s.service_id.clone())
    }

    pub fn layer_config(&self) -> Option<LayerConfig> {
        self.read_session(|s| s.config.clone())
    }

    pub fn snapshot(&self) -> Option<Snapshot> {
        self.read_session(|s| s.store.get_snapshot())
    }

    pub fn fields(&self) -> Vec<FieldMeta> {
        self.read_session(|s| s.fields.clone()).unwrap_or_default()
    }

    pub fn summary(&self) -> UnsavedSummary {
        self.read_session(EditSession::summary).unwrap_or_default()
    }

    pub fn has_unsaved(&self) -> bool {
        !self.summary().is_empty()
    }

    pub fn selection(&self) -> Option<Selection> {
        self.read_session(|s| s.selection.clone())
    }

    pub fn form_buffer(&self) -> Option<FormBuffer> {
        self.read_session(|s| s.buffer.clone())
    }

    pub fn column_filters(&self) -> Option<ColumnFilters> {
        self.read_session(|s| s.filters.clone())
    }

    /// Whether a geometry edit is recorded for `id`.
    pub fn is_geometry_edited(&self, id: &FeatureId) -> bool {
        self.read_session(|s| s.undo.geometry.is_edited(&s.canonical(id)))
            .unwrap_or(false)
    }

    /// Depth of the table, form and geometry undo stacks.
    pub fn undo_depths(&self) -> (usize, usize, usize) {
        self.read_session(|s| (s.undo.table.len(), s.undo.form.len(), s.undo.geometry.len()))
            .unwrap_or_default()
    }

    /// Listen to store changes of the active session. The subscription ends
    /// with the session. Listeners run while the editor is mid-operation and
    /// must not call back into it; use the bus for that.
    pub fn subscribe_store(
        &self,
        listener: impl Fn(&Snapshot) + Send + Sync + 'static,
    ) -> Result<Unsubscribe> {
        let guard = self.session.lock();
        let session = guard.as_ref().ok_or(EditError::NoActiveService)?;
        Ok(session.store.subscribe(listener))
    }

    // -----------------------------------------------------------------------
    // Services
    // -----------------------------------------------------------------------

    pub async fn list_services(
        &self,
        fields: &[&str],
        signal: &AbortSignal,
    ) -> Result<Vec<LayerSummary>> {
        self.client.fetch_wfst_list(fields, signal).await
    }

    fn feature_query(&self) -> FeatureQuery {
        FeatureQuery {
            max_features: self.options.max_features,
            ..FeatureQuery::default()
        }
    }

    async fn fetch_service(
        &self,
        service_id: &str,
        signal: &AbortSignal,
    ) -> Result<(LayerConfig, FeatureCollection)> {
        let config = self.client.fetch_wfst(service_id, &[], signal).await?;
        let features = self
            .client
            .fetch_wfst_features(service_id, &self.feature_query(), signal)
            .await?;
        Ok((config, features))
    }

    /// Make `service_id` the active service. Any load still in flight is
    /// aborted. Returns `Ok(false)` when this load was itself superseded.
    pub async fn select_service(&self, service_id: &str) -> Result<bool> {
        let controller = AbortController::new();
        if let Some(previous) = self.loading.lock().replace(controller.clone()) {
            previous.abort();
        }
        let signal = controller.signal();

        let loaded = self.fetch_service(service_id, &signal).await;
        let (config, collection) = match loaded.and_then(|l| signal.check().map(|()| l)) {
            Ok(loaded) => loaded,
            Err(e) if e.is_abort() => {
                tracing::debug!(service = service_id, "service load superseded");
                return Ok(false);
            }
            Err(e) => {
                self.finish_loading(&controller);
                return Err(e);
            }
        };
        self.finish_loading(&controller);

        let mut events = Outbox::new();
        {
            let mut session = EditSession::new(
                service_id,
                config,
                &self.options,
                Arc::clone(&self.timeline),
                controller,
            );
            session.load(collection);
            session.populate_map(self.map.as_ref());

            let mut guard = self.session.lock();
            if let Some(old) = guard.take() {
                old.controller.abort();
            }
            self.map.remove_overlay(TOOLTIP_OVERLAY);
            events.push(BusEvent::ServiceSelected {
                service_id: session.service_id.clone(),
            });
            events.push(BusEvent::SchemaLoaded {
                service_id: session.service_id.clone(),
                fields: session.fields.clone(),
            });
            events.push(BusEvent::AttachExternalLayer {
                service_id: session.service_id.clone(),
            });
            events.push(session.unsaved_event());
            tracing::info!(
                service = service_id,
                features = session.store.get_snapshot().features.len(),
                "service selected"
            );
            *guard = Some(session);
        }
        self.publish_all(events);
        Ok(true)
    }

    fn finish_loading(&self, controller: &AbortController) {
        let mut loading = self.loading.lock();
        if loading.as_ref().is_some_and(|c| c.signal().same_as(&controller.signal())) {
            *loading = None;
        }
    }

    /// Drop the active session. Returns `false` when none was active.
    pub fn clear_service(&self) -> bool {
        if let Some(loading) = self.loading.lock().take() {
            loading.abort();
        }
        let Some(session) = self.session.lock().take() else {
            return false;
        };
        session.controller.abort();
        self.map.clear_layer(LayerKind::FreeDraw);
        self.map.clear_layer(LayerKind::AttributeEdit);
        self.map.remove_overlay(TOOLTIP_OVERLAY);
        tracing::info!(service = %session.service_id, "service cleared");
        drop(session);
        self.bus.publish(BusEvent::ServiceCleared);
        true
    }

    /// Fetch the features of the active service again. Pending changes and
    /// undo history are dropped. `Ok(false)` when aborted.
    pub async fn reload_features(&self) -> Result<bool> {
        let (service_id, signal) = self
            .read_session(|s| (s.service_id.clone(), s.controller.signal()))
            .ok_or(EditError::NoActiveService)?;
        let collection = match self
            .client
            .fetch_wfst_features(&service_id, &self.feature_query(), &signal)
            .await
        {
            Ok(collection) => collection,
            Err(e) if e.is_abort() => {
                tracing::debug!(service = %service_id, "reload aborted");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        if signal.is_aborted() {
            return Ok(false);
        }
        self.with_session(|session, _| {
            session.load(collection);
            session.populate_map(self.map.as_ref());
            Ok(())
        })?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Attribute edits
    // -----------------------------------------------------------------------

    /// Edit one cell from the table. Returns `false` when the value did not
    /// change.
    pub fn edit_cell(&self, id: &FeatureId, key: &str, value: Value) -> Result<bool> {
        self.with_session(|session, _| {
            let id = session.canonical(id);
            let value = checked_value(session, &id, key, &value)?;
            let applied = apply_table_ops(session, &self.timeline, vec![EditOp::new(id, key, value)]);
            Ok(applied > 0)
        })
    }

    /// Queue a keystroke-rate cell edit at `now`. It is applied by the next
    /// [`Editor::flush_cell_edits`] after the debounce window; use
    /// [`Editor::type_cell`] to have that happen on a timer.
    pub fn queue_cell_edit(
        &self,
        id: &FeatureId,
        key: &str,
        value: Value,
        now: Instant,
    ) -> Result<()> {
        self.with_session(|session, _| {
            let id = session.canonical(id);
            let value = checked_value(session, &id, key, &value)?;
            session.debouncer.push(EditOp::new(id, key, value), now);
            Ok(())
        })
    }

    /// Queue a keystroke-rate cell edit and apply it once the debounce
    /// window has passed without another keystroke on the same cell.
    ///
    /// The flush runs on the current tokio runtime and stops when the
    /// service is cleared or replaced. Outside a runtime the edit waits for
    /// [`Editor::flush_cell_edits`].
    pub fn type_cell(self: &Arc<Self>, id: &FeatureId, key: &str, value: Value) -> Result<()> {
        let now = Instant::now();
        let timer = self.with_session(|session, _| {
            let id = session.canonical(id);
            let value = checked_value(session, &id, key, &value)?;
            session.debouncer.push(EditOp::new(id, key, value), now);
            if !session.debouncer.arm() {
                return Ok(None);
            }
            Ok(session
                .debouncer
                .next_due()
                .map(|due| (due, session.controller.signal())))
        })?;
        if let Some((due, signal)) = timer {
            self.spawn_flush_timer(due, signal);
        }
        Ok(())
    }

    fn spawn_flush_timer(self: &Arc<Self>, first_due: Instant, signal: AbortSignal) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no tokio runtime, queued cell edits wait for an explicit flush");
            let _ = self.with_session(|session, _| {
                session.debouncer.disarm();
                Ok(())
            });
            return;
        };
        let weak = Arc::downgrade(self);
        runtime.spawn(async move {
            let mut due = first_due;
            loop {
                tokio::select! {
                    biased;
                    _ = signal.aborted() => break,
                    _ = tokio::time::sleep_until(tokio::time::Instant::from_std(due)) => {}
                }
                let Some(editor) = weak.upgrade() else {
                    break;
                };
                match editor.flush_on_timer(&signal) {
                    Ok(Some(next)) => due = next,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!(error = %e, "cell edit timer stopped");
                        break;
                    }
                }
            }
        });
    }

    /// Flush due edits for the session owning `signal`. Returns the next
    /// deadline, or `None` once nothing is queued and the timer is released.
    fn flush_on_timer(&self, signal: &AbortSignal) -> Result<Option<Instant>> {
        self.with_session(|session, _| {
            if !session.controller.signal().same_as(signal) {
                return Ok(None);
            }
            let ops = session.debouncer.take_due(Instant::now());
            let applied = apply_table_ops(session, &self.timeline, ops);
            if applied > 0 {
                tracing::trace!(applied, "debounced cell edits applied");
            }
            let next = session.debouncer.next_due();
            if next.is_none() {
                session.debouncer.disarm();
            }
            Ok(next)
        })
    }

    /// Apply queued cell edits whose window has elapsed. Returns the number
    /// of cells changed.
    pub fn flush_cell_edits(&self, now: Instant) -> Result<usize> {
        self.with_session(|session, _| {
            let ops = session.debouncer.take_due(now);
            Ok(apply_table_ops(session, &self.timeline, ops))
        })
    }

    pub fn flush_all_cell_edits(&self) -> Result<usize> {
        self.with_session(|session, _| {
            let ops = session.debouncer.take_all();
            Ok(apply_table_ops(session, &self.timeline, ops))
        })
    }

    /// When the next queued edit becomes due.
    pub fn next_flush_due(&self) -> Option<Instant> {
        self.read_session(|s| s.debouncer.next_due()).flatten()
    }

    /// Apply form values to every row in `ids`. All rows share one undo
    /// timestamp and are undone together. Returns the number of rows changed.
    pub fn apply_form_edit(&self, ids: &[FeatureId], values: &Properties) -> Result<usize> {
        self.with_session(|session, _| {
            let ids = session.canonical_all(ids);
            let state = session.store.get_snapshot();
            let mut coerced = Properties::new();
            for (key, value) in values {
                let field = writable_field(session, key)?;
                coerced.insert(key.clone(), coerce_value(field, value)?);
            }

            let when = self.timeline.stamp();
            let mut ops = Vec::new();
            let mut rows = 0;
            for id in &ids {
                let mut snapshot = Properties::new();
                for (key, value) in &coerced {
                    let Some(prev) = state.effective_value(id, key) else {
                        continue;
                    };
                    if &prev != value {
                        snapshot.insert(key.clone(), prev);
                        ops.push(EditOp::new(id.clone(), key.clone(), value.clone()));
                    }
                }
                if snapshot.is_empty() {
                    continue;
                }
                rows += 1;
                session.undo.form.push(FormUndoEntry {
                    id: id.clone(),
                    snapshot,
                    when,
                });
            }
            if ops.is_empty() {
                return Ok(0);
            }
            session.store.dispatch(Action::ApplyEdits { ops });

            if let Some(focused) = session.buffer.id.clone() {
                if ids.contains(&focused) {
                    for (key, value) in &coerced {
                        session.buffer.values.insert(key.clone(), value.clone());
                    }
                }
            }
            Ok(rows)
        })
    }

    // -----------------------------------------------------------------------
    // Geometry
    // -----------------------------------------------------------------------

    /// Record a geometry redraw reported by the sketch tool.
    pub fn record_geometry_edit(
        &self,
        id: &FeatureId,
        before: Option<Geometry>,
        after: Option<Geometry>,
    ) -> Result<()> {
        self.with_session(|session, events| {
            let id = session.canonical(id);
            if !session.store.get_snapshot().contains(&id) {
                return Err(EditError::UnknownFeature(id.to_string()));
            }
            let store_when = session.store.get_snapshot().last_undo_when();
            let when = match session.undo.latest_model_edit(store_when) {
                Some(floor) => self.timeline.stamp_after(floor),
                None => self.timeline.stamp(),
            };
            tracing::debug!(%id, when, "geometry edit recorded");
            session.undo.geometry.push(GeometryUndoEntry {
                id,
                before,
                after,
                when,
            });
            self.map.refresh(LayerKind::AttributeEdit);
            events.push(session.unsaved_event());
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Rows
    // -----------------------------------------------------------------------

    /// Mark, unmark or toggle deletion. Rows coming back from deletion are
    /// restored on the map if they had been removed there.
    pub fn set_delete_state(&self, ids: &[FeatureId], mode: DeleteMode) -> Result<bool> {
        self.with_session(|session, _| {
            let ids = session.canonical_all(ids);
            let changed = session.store.dispatch(Action::SetDeleteState {
                ids: ids.clone(),
                mode,
            });
            let restored = session.sync.restore_from_graveyard(
                self.map.as_ref(),
                &session.store,
                &mut session.graveyard,
                &ids,
            );
            if !restored.is_empty() {
                tracing::debug!(count = restored.len(), "features restored from graveyard");
            }
            Ok(changed)
        })
    }

    /// Copy rows into new drafts. Map geometry is cloned onto each copy.
    pub fn duplicate(&self, ids: &[FeatureId]) -> Result<Vec<FeatureId>> {
        self.with_session(|session, _| {
            let ids = session.canonical_all(ids);
            let new_ids = session.store.get_snapshot().peek_next_temp_ids(ids.len());
            session.store.dispatch(Action::DuplicateRows {
                ids: ids.clone(),
                read_only_keys: session.read_only.clone(),
            });

            let state = session.store.get_snapshot();
            let mut created = Vec::new();
            for (source, id) in ids.iter().zip(new_ids) {
                let Some(draft) = state.draft(&id) else {
                    continue;
                };
                if let Some(feature) = locate_feature(self.map.as_ref(), LayerKind::AttributeEdit, source) {
                    let copy = clone_for_row(&feature, &id, &draft.properties);
                    session
                        .sync
                        .add_programmatic(self.map.as_ref(), LayerKind::AttributeEdit, copy);
                }
                created.push(id);
            }
            Ok(created)
        })
    }

    /// Create a draft from attribute values and an optional geometry.
    pub fn create_draft(&self, properties: &Properties, geometry: Option<Geometry>) -> Result<FeatureId> {
        self.with_session(|session, _| insert_draft(session, self.map.as_ref(), properties, geometry))
    }

    /// Drop drafts outright, taking them off the map and out of every
    /// selection. Ids that are not drafts are ignored.
    pub fn discard_drafts(&self, ids: &[FeatureId]) -> Result<usize> {
        self.with_session(|session, _| {
            let state = session.store.get_snapshot();
            let ids: Vec<FeatureId> = session
                .canonical_all(ids)
                .into_iter()
                .filter(|id| state.draft(id).is_some())
                .collect();
            if ids.is_empty() {
                return Ok(0);
            }
            for id in &ids {
                if let Some(feature) = locate_feature(self.map.as_ref(), LayerKind::AttributeEdit, id) {
                    session
                        .sync
                        .remove_programmatic(self.map.as_ref(), LayerKind::AttributeEdit, &feature.uid);
                }
                session.index.remove(id);
                session.selection.retain(|s| s != id);
            }
            session.store.dispatch(Action::DiscardDrafts { ids: ids.clone() });
            Ok(ids.len())
        })
    }

    /// Wait for a position fix and create a point draft there. A fix that is
    /// cancelled (service switched, or `fix` itself resolved to
    /// [`EditError::Aborted`]) yields `Ok(None)`.
    pub async fn capture_position<F>(&self, fix: F, properties: &Properties) -> Result<Option<FeatureId>>
    where
        F: Future<Output = Result<Position>>,
    {
        let signal = self
            .read_session(|s| s.controller.signal())
            .ok_or(EditError::NoActiveService)?;
        let position = match signal.guard(fix).await {
            Ok(position) => position,
            Err(e) if e.is_abort() => {
                tracing::debug!("position capture cancelled");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        self.with_session(|session, _| {
            if session.controller.is_aborted() {
                return Ok(None);
            }
            insert_draft(session, self.map.as_ref(), properties, Some(Geometry::Point(position)))
                .map(Some)
        })
    }

    /// The map reported `addfeature`.
    pub fn handle_draw_added(&self, layer: LayerKind, feature: MapFeature) -> Result<SyncOutcome> {
        self.with_session(|session, _| {
            Ok(session.sync.on_added(
                self.map.as_ref(),
                &session.store,
                &mut session.index,
                layer,
                feature,
                Properties::new(),
            ))
        })
    }

    /// The map reported `removefeature`.
    pub fn handle_feature_removed(&self, layer: LayerKind, feature: MapFeature) -> Result<SyncOutcome> {
        self.with_session(|session, _| {
            Ok(session.sync.on_removed(
                &session.store,
                &session.index,
                &mut session.graveyard,
                layer,
                feature,
            ))
        })
    }

    // -----------------------------------------------------------------------
    // Undo
    // -----------------------------------------------------------------------

    /// Reverse the newest operation across all editing surfaces.
    pub fn undo(&self) -> Result<Option<UndoApplied>> {
        self.with_session(|session, events| {
            let applied = UndoCoordinator {
                stacks: &mut session.undo,
                store: &session.store,
                filters: &mut session.filters,
                buffer: &mut session.buffer,
                map: self.map.as_ref(),
            }
            .undo();
            if let Some(UndoApplied::Geometry { .. }) = &applied {
                self.map.refresh(LayerKind::AttributeEdit);
                events.push(session.unsaved_event());
            }
            Ok(applied)
        })
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    pub fn select(&self, ids: &[FeatureId], mode: SelectMode, source: SelectionSource) -> Result<()> {
        self.with_session(|session, events| {
            let ids = session.canonical_all(ids);
            apply_selection(session, &ids, mode, events);
            if source != SelectionSource::External {
                events.push(BusEvent::SelectIds { ids, source, mode });
            }
            self.map.refresh(LayerKind::AttributeEdit);
            Ok(())
        })
    }

    pub fn focus(&self, id: Option<&FeatureId>) -> Result<()> {
        self.with_session(|session, events| {
            let id = id.map(|id| session.canonical(id));
            if set_focus(session, id.clone()) {
                events.push(BusEvent::FocusId { id });
            }
            Ok(())
        })
    }

    pub fn enter_form_mode(&self) -> Result<()> {
        self.with_session(|session, events| {
            let before = session.selection.focused().cloned();
            session.selection.enter_form_mode();
            sync_buffer(session, before, events);
            Ok(())
        })
    }

    pub fn enter_table_mode(&self) -> Result<()> {
        self.with_session(|session, _| {
            session.selection.enter_table_mode();
            Ok(())
        })
    }

    /// Handle a map click. Features under the pixel are reduced to distinct
    /// editor ids; one is selected directly, several open the picker.
    pub fn pick_at(&self, pixel: Pixel) -> Result<PickResult> {
        self.with_session(|session, events| {
            let mut ids: Vec<FeatureId> = Vec::new();
            for feature in self.map.features_at_pixel(pixel) {
                if let Some(id) = resolve_map_feature(&feature, &session.index) {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }
            match ids.len() {
                0 => {
                    session.selection.set_picker(Vec::new());
                    Ok(PickResult::Nothing)
                }
                1 => {
                    session.selection.set_picker(Vec::new());
                    apply_selection(session, &ids, SelectMode::Replace, events);
                    events.push(BusEvent::SelectIds {
                        ids: ids.clone(),
                        source: SelectionSource::Map,
                        mode: SelectMode::Replace,
                    });
                    self.map.refresh(LayerKind::AttributeEdit);
                    Ok(PickResult::Selected(ids.remove(0)))
                }
                _ => {
                    let state = session.store.get_snapshot();
                    let candidates: Vec<PickCandidate> = ids
                        .into_iter()
                        .map(|id| PickCandidate {
                            label: session.label_for(&state, &id),
                            id,
                        })
                        .collect();
                    session.selection.set_picker(candidates.clone());
                    Ok(PickResult::Choose(candidates))
                }
            }
        })
    }

    /// Resolve the open picker with `id`. Returns `false` if `id` was not
    /// offered.
    pub fn choose_picked(&self, id: &FeatureId) -> Result<bool> {
        self.with_session(|session, events| {
            let id = session.canonical(id);
            let focused = session.selection.focused().cloned();
            if !session.selection.choose_picked(&id) {
                return Ok(false);
            }
            sync_buffer(session, focused, events);
            events.push(BusEvent::SelectIds {
                ids: vec![id],
                source: SelectionSource::Picker,
                mode: SelectMode::Replace,
            });
            self.map.refresh(LayerKind::AttributeEdit);
            Ok(true)
        })
    }

    /// Set or clear the hovered row and its tooltip.
    pub fn hover(&self, id: Option<&FeatureId>) -> Result<()> {
        self.with_session(|session, _| {
            let id = id.map(|id| session.canonical(id));
            if !session.selection.set_hovered(id.clone()) {
                return Ok(());
            }
            self.map.remove_overlay(TOOLTIP_OVERLAY);
            if let Some(id) = id {
                let position = session
                    .geometry_of(self.map.as_ref(), &id)
                    .and_then(|g| g.first_position());
                if let Some(position) = position {
                    let state = session.store.get_snapshot();
                    self.map.add_overlay(Overlay {
                        id: TOOLTIP_OVERLAY.to_string(),
                        position,
                        text: session.label_for(&state, &id),
                    });
                }
            }
            self.map.refresh(LayerKind::AttributeEdit);
            Ok(())
        })
    }

    /// Style of a row on the attribute-edit layer; `None` hides it.
    pub fn style_for(&self, id: &FeatureId) -> Result<Option<StyleKey>> {
        self.with_session(|session, _| {
            let id = session.canonical(id);
            let state = session.store.get_snapshot();
            let visible = session.visible_ids(&state);
            let selected = session.selection.current_set();
            Ok(resolve_style(
                &id,
                &state,
                StyleContext {
                    visible: &visible,
                    selected: &selected,
                    hovered: session.selection.hovered(),
                },
            ))
        })
    }

    // -----------------------------------------------------------------------
    // Filters
    // -----------------------------------------------------------------------

    pub fn set_column_filter(&self, key: &str, values: &[Value]) -> Result<()> {
        self.with_session(|session, _| {
            session.filters.set(key, values);
            self.map.refresh(LayerKind::AttributeEdit);
            Ok(())
        })
    }

    pub fn clear_column_filter(&self, key: &str) -> Result<()> {
        self.with_session(|session, _| {
            session.filters.clear(key);
            self.map.refresh(LayerKind::AttributeEdit);
            Ok(())
        })
    }

    /// Distinct values of a column across all rows, for filter facets.
    pub fn unique_values(&self, key: &str) -> Result<Vec<Value>> {
        self.with_session(|session, _| {
            if let Some(cached) = session.unique_values.get(&key.to_string()) {
                return Ok(cached.clone());
            }
            let state = session.store.get_snapshot();
            let mut values: Vec<(String, Value)> = Vec::new();
            for (_, props) in state.rows() {
                let value = props.get(key).cloned().unwrap_or(Value::Null);
                let facet = facet_key(&value);
                if !values.iter().any(|(f, _)| f == &facet) {
                    values.push((facet, value));
                }
            }
            values.sort_by(|a, b| a.0.cmp(&b.0));
            let values: Vec<Value> = values.into_iter().map(|(_, v)| v).collect();
            session.unique_values.insert(key.to_string(), values.clone());
            Ok(values)
        })
    }

    // -----------------------------------------------------------------------
    // Split / merge
    // -----------------------------------------------------------------------

    /// Ask the sketch tool to split `id`.
    pub fn start_split(&self, id: &FeatureId) -> Result<()> {
        self.with_session(|session, events| {
            let id = session.canonical(id);
            if !session.store.get_snapshot().contains(&id) {
                return Err(EditError::UnknownFeature(id.to_string()));
            }
            events.push(BusEvent::SplitStart { id });
            Ok(())
        })
    }

    /// One draft per part, each with the source's editable attributes; the
    /// source is marked deleted.
    pub fn finish_split(&self, source: &FeatureId, parts: Vec<Geometry>) -> Result<Vec<FeatureId>> {
        self.with_session(|session, _| {
            let source = session.canonical(source);
            let props = session
                .store
                .get_snapshot()
                .effective_properties(&source)
                .ok_or_else(|| EditError::UnknownFeature(source.to_string()))?;
            let props = session.editable_copy(&props);
            let mut created = Vec::with_capacity(parts.len());
            for part in parts {
                created.push(insert_draft(session, self.map.as_ref(), &props, Some(part))?);
            }
            session.store.dispatch(Action::SetDeleteState {
                ids: vec![source.clone()],
                mode: DeleteMode::Mark,
            });
            tracing::debug!(%source, parts = created.len(), "split applied");
            Ok(created)
        })
    }

    /// Ask the sketch tool to merge `ids`.
    pub fn start_merge(&self, ids: &[FeatureId]) -> Result<()> {
        self.with_session(|session, events| {
            let ids = session.canonical_all(ids);
            if ids.len() < 2 {
                return Err(EditError::InvalidValue {
                    key: "ids".to_string(),
                    detail: "merge needs at least two features".to_string(),
                });
            }
            let state = session.store.get_snapshot();
            if let Some(missing) = ids.iter().find(|id| !state.contains(id)) {
                return Err(EditError::UnknownFeature(missing.to_string()));
            }
            events.push(BusEvent::MergeFeatures { ids });
            Ok(())
        })
    }

    /// One draft carrying the first source's attributes; every source is
    /// marked deleted. Without a merged geometry from the sketch tool the
    /// parts are combined into a multi-geometry. `Ok(None)` when there is no
    /// geometry to merge.
    pub fn finish_merge(&self, ids: &[FeatureId], geometry: Option<Geometry>) -> Result<Option<FeatureId>> {
        self.with_session(|session, _| {
            let ids = session.canonical_all(ids);
            let Some(first) = ids.first() else {
                return Ok(None);
            };
            let props = session
                .store
                .get_snapshot()
                .effective_properties(first)
                .ok_or_else(|| EditError::UnknownFeature(first.to_string()))?;
            let geometry = geometry.or_else(|| {
                let parts = ids
                    .iter()
                    .filter_map(|id| session.geometry_of(self.map.as_ref(), id))
                    .collect();
                Geometry::merge_parts(parts)
            });
            let Some(geometry) = geometry else {
                tracing::warn!(count = ids.len(), "merge without geometry ignored");
                return Ok(None);
            };
            let props = session.editable_copy(&props);
            let id = insert_draft(session, self.map.as_ref(), &props, Some(geometry))?;
            session.store.dispatch(Action::SetDeleteState {
                ids,
                mode: DeleteMode::Mark,
            });
            Ok(Some(id))
        })
    }

    // -----------------------------------------------------------------------
    // Inbound bus events
    // -----------------------------------------------------------------------

    /// React to an event published by another plugin. Events the editor
    /// emits itself are ignored, as is everything while no service is
    /// active.
    pub fn handle_event(&self, event: &BusEvent) -> Result<()> {
        let result = match event {
            BusEvent::SelectIds {
                ids,
                source: SelectionSource::External,
                mode,
            } => self.select(ids, *mode, SelectionSource::External),
            BusEvent::FocusId { id } => self.with_session(|session, _| {
                let id = id.as_ref().map(|id| session.canonical(id));
                set_focus(session, id);
                Ok(())
            }),
            BusEvent::GeometryEdited { id, before, after } => {
                self.record_geometry_edit(id, before.clone(), after.clone())
            }
            BusEvent::SplitComplete { source_id, parts } => {
                self.finish_split(source_id, parts.clone()).map(drop)
            }
            BusEvent::MergeComplete { ids, geometry } => {
                self.finish_merge(ids, Some(geometry.clone())).map(drop)
            }
            BusEvent::ServiceCleared => {
                self.clear_service();
                Ok(())
            }
            _ => Ok(()),
        };
        match result {
            Err(EditError::NoActiveService) => Ok(()),
            other => other,
        }
    }

    // -----------------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------------

    /// Send every pending change as one transaction.
    ///
    /// Nothing pending means no request at all. On success, partial or
    /// full, local pending state and all undo history are cleared and the
    /// features reloaded. A rejected transaction leaves local state intact.
    pub async fn commit(&self) -> Result<CommitReport> {
        let prepared = self.with_session(|session, _| {
            let ops = session.debouncer.take_all();
            apply_table_ops(session, &self.timeline, ops);
            let request = build_request(session, self.map.as_ref());
            if request.is_empty() {
                return Ok(None);
            }
            Ok(Some((session.config.clone(), request, session.controller.signal())))
        })?;
        let Some((config, request, signal)) = prepared else {
            tracing::debug!("commit with nothing pending");
            return Ok(CommitReport::NothingToCommit);
        };

        let outcome = match self.client.commit_with_config(&config, &request, &signal).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_abort() => {
                tracing::debug!(layer = %config.id, "commit aborted");
                return Ok(CommitReport::Aborted);
            }
            Err(e) => return Err(e),
        };
        let outcome = outcome.into_result()?;
        if signal.is_aborted() {
            return Ok(CommitReport::Aborted);
        }
        if let Some(warning) = &outcome.warning {
            tracing::warn!(layer = %config.id, %warning, "transaction committed with warnings");
        }

        self.with_session(|session, _| {
            session.store.dispatch(Action::Commit);
            session.undo.clear();
            session.graveyard.clear();
            Ok(())
        })?;
        if let Err(e) = self.reload_features().await {
            tracing::warn!(layer = %config.id, error = %e, "reload after commit failed");
        }
        Ok(CommitReport::Committed(outcome))
    }
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("client", &self.client)
            .field("session", &*self.session.lock())
            .finish()
    }
}

// ============================================================================
// Helpers shared by the operations above
// ============================================================================

fn writable_field<'a>(session: &'a EditSession, key: &str) -> Result<&'a FieldMeta> {
    let field = session.field(key).ok_or_else(|| EditError::InvalidValue {
        key: key.to_string(),
        detail: "unknown field".to_string(),
    })?;
    if field.read_only {
        return Err(EditError::InvalidValue {
            key: key.to_string(),
            detail: "field is read-only".to_string(),
        });
    }
    Ok(field)
}

/// Validate a cell edit and coerce its value.
fn checked_value(session: &EditSession, id: &FeatureId, key: &str, value: &Value) -> Result<Value> {
    let field = writable_field(session, key)?;
    if !session.store.get_snapshot().contains(id) {
        return Err(EditError::UnknownFeature(id.to_string()));
    }
    coerce_value(field, value)
}

/// Apply table cell edits under one timestamp, one undo entry per cell.
fn apply_table_ops(session: &mut EditSession, timeline: &Timeline, ops: Vec<EditOp>) -> usize {
    if ops.is_empty() {
        return 0;
    }
    let state = session.store.get_snapshot();
    let when = timeline.stamp();
    let mut changed = Vec::new();
    for op in ops {
        let Some(prev) = state.effective_value(&op.id, &op.key) else {
            continue;
        };
        if prev == op.value {
            continue;
        }
        session.undo.table.push(TableUndoEntry {
            id: op.id.clone(),
            key: op.key.clone(),
            prev_value: prev,
            when,
        });
        changed.push(op);
    }
    let count = changed.len();
    if count > 0 {
        session.store.dispatch(Action::ApplyEdits { ops: changed });
    }
    count
}

/// Create one draft and mirror it on the map when it has a geometry.
fn insert_draft(
    session: &mut EditSession,
    map: &dyn MapPort,
    properties: &Properties,
    geometry: Option<Geometry>,
) -> Result<FeatureId> {
    let mut coerced = Properties::new();
    for (key, value) in properties {
        match session.field(key) {
            Some(field) if field.read_only => continue,
            Some(field) => {
                coerced.insert(key.clone(), coerce_value(field, value)?);
            }
            None => {
                coerced.insert(key.clone(), value.clone());
            }
        }
    }
    let coerced = session.editable_copy(&coerced);
    let id = FeatureId::Draft(session.store.get_snapshot().next_temp_id);
    session.store.dispatch(Action::CreateDraft {
        properties: coerced.clone(),
        geometry: geometry.clone(),
    });
    session.index.insert(id.clone());
    if geometry.is_some() {
        let mut props = coerced;
        props.insert("id".to_string(), id.to_value());
        session
            .sync
            .add_programmatic(map, LayerKind::AttributeEdit, MapFeature::for_row(&id, props, geometry));
    }
    tracing::debug!(%id, "draft created");
    Ok(id)
}

fn apply_selection(session: &mut EditSession, ids: &[FeatureId], mode: SelectMode, events: &mut Outbox) {
    let focused = session.selection.focused().cloned();
    session.selection.select(ids, mode);
    sync_buffer(session, focused, events);
}

/// Reload the form buffer when the focused row changed.
fn sync_buffer(session: &mut EditSession, before: Option<FeatureId>, events: &mut Outbox) {
    let after = session.selection.focused().cloned();
    if after == before {
        return;
    }
    load_buffer(session, after.clone());
    events.push(BusEvent::FocusId { id: after });
}

fn set_focus(session: &mut EditSession, id: Option<FeatureId>) -> bool {
    if session.selection.focused() == id.as_ref() {
        return false;
    }
    session.selection.focus(id.clone());
    load_buffer(session, id);
    true
}

fn load_buffer(session: &mut EditSession, id: Option<FeatureId>) {
    let values = id
        .as_ref()
        .and_then(|id| session.store.get_snapshot().effective_properties(id))
        .unwrap_or_default();
    session.buffer.load(id, values);
}
