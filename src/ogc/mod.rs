//! OGC transport adapter: backend calls, feature decoding, WFS-T
//! transaction building and response parsing.

pub mod api;
pub mod client;
pub mod features;
#[cfg(feature = "http")]
pub mod http;
pub mod response;
pub mod transaction;

pub use api::{decode_json_body, validate_layer_id, FeatureApi, Query};
pub use client::{FeatureQuery, OgcClient, DEFAULT_BASE_PATH};
pub use features::{decode_features, decode_json, decode_xml, read_gml_features};
#[cfg(feature = "http")]
pub use http::HttpFeatureApi;
pub use response::{parse_transaction_response, TransactionOutcome};
pub use transaction::{
    build_transaction, format_feature_id, resolve_type_binding, InsertFeature, ServerDialect,
    TransactionRequest, TypeBinding, UpdateFeature,
};
