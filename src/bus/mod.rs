//! Cross-plugin event bus.
//!
//! Events form a closed enum; each variant documents its wire name (the
//! string other plugins know it by) through [`EventKind::name`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::geometry::Geometry;
use crate::identity::FeatureId;
use crate::reactive::{EventEmitter, Unsubscribe};
use crate::schema::FieldMeta;
use crate::store::UnsavedSummary;

/// How a selection event combines with the current selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectMode {
    Replace,
    Toggle,
    Add,
    Clear,
}

/// Which surface produced a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionSource {
    Map,
    Table,
    Form,
    Picker,
    External,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    ServiceSelected {
        service_id: String,
    },
    ServiceCleared,
    SelectIds {
        ids: Vec<FeatureId>,
        source: SelectionSource,
        mode: SelectMode,
    },
    FocusId {
        id: Option<FeatureId>,
    },
    SchemaLoaded {
        service_id: String,
        fields: Vec<FieldMeta>,
    },
    GeometryEdited {
        id: FeatureId,
        before: Option<Geometry>,
        after: Option<Geometry>,
    },
    /// Asks the sketch tool to treat the attribute-editing layer as its own.
    AttachExternalLayer {
        service_id: String,
    },
    SplitStart {
        id: FeatureId,
    },
    SplitComplete {
        source_id: FeatureId,
        parts: Vec<Geometry>,
    },
    MergeFeatures {
        ids: Vec<FeatureId>,
    },
    MergeComplete {
        ids: Vec<FeatureId>,
        geometry: Geometry,
    },
    UnsavedState {
        has_unsaved: bool,
        summary: UnsavedSummary,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ServiceSelected,
    ServiceCleared,
    SelectIds,
    FocusId,
    SchemaLoaded,
    GeometryEdited,
    AttachExternalLayer,
    SplitStart,
    SplitComplete,
    MergeFeatures,
    MergeComplete,
    UnsavedState,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::ServiceSelected => "edit:service-selected",
            Self::ServiceCleared => "edit:service-cleared",
            Self::SelectIds => "attrib:select-ids",
            Self::FocusId => "attrib:focus-id",
            Self::SchemaLoaded => "attrib:schema-loaded",
            Self::GeometryEdited => "sketch:geometry-edited",
            Self::AttachExternalLayer => "sketch.attachExternalLayer",
            Self::SplitStart => "attrib:split-start",
            Self::SplitComplete => "sketch:split-complete",
            Self::MergeFeatures => "attrib:merge-features",
            Self::MergeComplete => "sketch:merge-complete",
            Self::UnsavedState => "edit:unsaved-state",
        }
    }
}

impl BusEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ServiceSelected { .. } => EventKind::ServiceSelected,
            Self::ServiceCleared => EventKind::ServiceCleared,
            Self::SelectIds { .. } => EventKind::SelectIds,
            Self::FocusId { .. } => EventKind::FocusId,
            Self::SchemaLoaded { .. } => EventKind::SchemaLoaded,
            Self::GeometryEdited { .. } => EventKind::GeometryEdited,
            Self::AttachExternalLayer { .. } => EventKind::AttachExternalLayer,
            Self::SplitStart { .. } => EventKind::SplitStart,
            Self::SplitComplete { .. } => EventKind::SplitComplete,
            Self::MergeFeatures { .. } => EventKind::MergeFeatures,
            Self::MergeComplete { .. } => EventKind::MergeComplete,
            Self::UnsavedState { .. } => EventKind::UnsavedState,
        }
    }
}

/// Shared bus. Cloning is cheap; all clones publish to the same listeners.
#[derive(Clone, Default)]
pub struct EventBus {
    emitter: Arc<EventEmitter<BusEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, event: BusEvent) {
        let delivered = self.emitter.emit(&event);
        tracing::trace!(event = event.kind().name(), delivered, "bus publish");
    }

    pub fn subscribe(&self, callback: impl Fn(&BusEvent) + Send + Sync + 'static) -> Unsubscribe {
        self.emitter.subscribe(callback)
    }

    /// Subscribe to a single event kind.
    pub fn on_kind(
        &self,
        kind: EventKind,
        callback: impl Fn(&BusEvent) + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.emitter.subscribe(move |event| {
            if event.kind() == kind {
                callback(event);
            }
        })
    }

    pub fn listener_count(&self) -> usize {
        self.emitter.size()
    }
}
