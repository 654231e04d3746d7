//! Client-side optimistic editing engine for OGC WFS-T layers.
//!
//! Edits are staged locally in an [`store::EditStore`] overlay on top of the
//! loaded features, mirrored onto a map through [`bridge::MapPort`], undone
//! across table, form and geometry surfaces, and committed as one WFS-T
//! transaction through [`ogc::OgcClient`].

pub mod error;
pub mod types;

pub mod abort;
pub mod bridge;
pub mod bus;
pub mod clock;
pub mod config;
pub mod geometry;
pub mod identity;
pub mod ogc;
pub mod reactive;
pub mod schema;
pub mod session;
pub mod store;
pub mod undo;
pub mod xml;

pub use config::EditorOptions;
pub use error::{EditError, Result};
pub use identity::FeatureId;
pub use session::{CommitReport, Editor};
