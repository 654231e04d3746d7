//! Field metadata derived from a layer's schema, and value coercion against it.

pub mod coerce;
pub mod fields;

pub use coerce::{coerce_properties, coerce_value};
pub use fields::{field_metadata, read_only_keys, FieldMeta, FieldType, ID_FIELD};
