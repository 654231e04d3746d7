//! Backend feature API: the transport seam.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::error::{EditError, NetworkError, ParseError, Result};

/// Query string pairs, in order.
pub type Query = Vec<(String, String)>;

/// User-provided network layer for the backend WFS-T proxy.
///
/// Implementations perform one HTTP exchange and hand back the decoded JSON
/// body. A non-2xx answer or transport failure is an [`EditError::Network`];
/// a 2xx body that is not JSON is an [`EditError::Parse`].
/// Cancellation is handled by the caller; implementations do not need to
/// know about abort signals.
#[async_trait]
pub trait FeatureApi: Send + Sync {
    async fn get(&self, path: &str, query: &Query) -> Result<Value>;

    async fn post(&self, path: &str, body: &Value) -> Result<Value>;
}

/// Classify a finished HTTP exchange for a [`FeatureApi`] implementation.
///
/// A failed status is a network error carrying the body, or the status line
/// when the body is empty. A successful status whose body is not JSON is a
/// parse error and is not retryable.
pub fn decode_json_body(status: u16, success: bool, body: String) -> Result<Value> {
    if !success {
        let message = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            body
        };
        return Err(NetworkError::with_status(status, message).into());
    }
    serde_json::from_str(&body).map_err(|e| {
        EditError::Parse(ParseError::shape("response", format!("body is not JSON: {e}")))
    })
}

fn layer_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.:\-]+$").expect("valid regex"))
}

/// Reject layer ids that could escape their path segment.
pub fn validate_layer_id(id: &str) -> Result<()> {
    if id.contains("..") || !layer_id_re().is_match(id) {
        return Err(EditError::InvalidLayerId(id.to_string()));
    }
    Ok(())
}
