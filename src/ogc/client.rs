//! OgcClient: typed calls against the backend WFS-T proxy.
//!
//! Every call races the transport future against the caller's
//! [`AbortSignal`] and re-checks it once the response is in hand, so a
//! cancelled request never returns data. Errors propagate as-is; nothing is
//! retried here.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::abort::AbortSignal;
use crate::error::{ParseError, Result};
use crate::types::{FeatureCollection, LayerConfig, LayerSummary};

use super::api::{validate_layer_id, FeatureApi, Query};
use super::features::decode_features;
use super::response::{parse_transaction_response, TransactionOutcome};
use super::transaction::{build_transaction, TransactionRequest};

pub const DEFAULT_BASE_PATH: &str = "/ogc/wfst";

/// Extra parameters for a feature fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureQuery {
    pub max_features: Option<usize>,
    pub srs_name: Option<String>,
    pub params: Query,
}

impl FeatureQuery {
    fn to_query(&self) -> Query {
        let mut q = Query::new();
        if let Some(n) = self.max_features {
            q.push(("maxFeatures".to_string(), n.to_string()));
        }
        if let Some(srs) = &self.srs_name {
            q.push(("srsName".to_string(), srs.clone()));
        }
        q.extend(self.params.iter().cloned());
        q
    }
}

fn fields_query(fields: &[&str]) -> Query {
    if fields.is_empty() {
        Query::new()
    } else {
        vec![("fields".to_string(), fields.join(","))]
    }
}

pub struct OgcClient {
    api: Arc<dyn FeatureApi>,
    base_path: String,
}

impl OgcClient {
    pub fn new(api: Arc<dyn FeatureApi>) -> Self {
        Self::with_base_path(api, DEFAULT_BASE_PATH)
    }

    pub fn with_base_path(api: Arc<dyn FeatureApi>, base_path: impl Into<String>) -> Self {
        Self {
            api,
            base_path: base_path.into().trim_end_matches('/').to_string(),
        }
    }

    fn layer_path(&self, id: &str, tail: &str) -> Result<String> {
        validate_layer_id(id)?;
        Ok(format!("{}/{id}{tail}", self.base_path))
    }

    async fn get(&self, path: &str, query: &Query, signal: &AbortSignal) -> Result<Value> {
        signal
            .guard(self.api.get(path, query))
            .await
    }

    /// `GET /ogc/wfst?fields=...`: editable layers.
    pub async fn fetch_wfst_list(
        &self,
        fields: &[&str],
        signal: &AbortSignal,
    ) -> Result<Vec<LayerSummary>> {
        let body = self
            .get(&self.base_path, &fields_query(fields), signal)
            .await?;
        let list = match body {
            Value::Array(items) => Value::Array(items),
            Value::Object(mut obj) => obj
                .remove("layers")
                .or_else(|| obj.remove("items"))
                .ok_or_else(|| ParseError::shape("layer list", "no layers array"))?,
            other => {
                return Err(ParseError::shape("layer list", format!("unexpected body {other}")).into())
            }
        };
        Ok(serde_json::from_value(list)?)
    }

    /// `GET /ogc/wfst/{id}`: full layer configuration.
    pub async fn fetch_wfst(
        &self,
        id: &str,
        fields: &[&str],
        signal: &AbortSignal,
    ) -> Result<LayerConfig> {
        let path = self.layer_path(id, "")?;
        let body = self.get(&path, &fields_query(fields), signal).await?;
        let mut config: LayerConfig = serde_json::from_value(body)?;
        if config.id.is_empty() {
            config.id = id.to_string();
        }
        Ok(config)
    }

    /// `GET /ogc/wfst/{id}/features`: decoded feature collection.
    pub async fn fetch_wfst_features(
        &self,
        id: &str,
        query: &FeatureQuery,
        signal: &AbortSignal,
    ) -> Result<FeatureCollection> {
        let path = self.layer_path(id, "/features")?;
        let body = self.get(&path, &query.to_query(), signal).await?;
        let collection = decode_features(&body)?;
        tracing::debug!(layer = id, features = collection.features.len(), "features loaded");
        Ok(collection)
    }

    /// Fetch the layer configuration, then commit `request` against it.
    pub async fn commit_wfst_transaction(
        &self,
        layer_id: &str,
        request: &TransactionRequest,
        signal: &AbortSignal,
    ) -> Result<TransactionOutcome> {
        let config = self.fetch_wfst(layer_id, &[], signal).await?;
        self.commit_with_config(&config, request, signal).await
    }

    /// `POST /ogc/wfst/{id}/transaction` using an already loaded config.
    pub async fn commit_with_config(
        &self,
        config: &LayerConfig,
        request: &TransactionRequest,
        signal: &AbortSignal,
    ) -> Result<TransactionOutcome> {
        let path = self.layer_path(&config.id, "/transaction")?;
        let body = json!({ "transactionXml": build_transaction(config, request) });
        let response = signal
            .guard(self.api.post(&path, &body))
            .await?;
        let raw = response
            .get("wfsResponse")
            .and_then(Value::as_str)
            .ok_or_else(|| ParseError::shape("transaction", "response has no wfsResponse"))?;
        let outcome = parse_transaction_response(raw)?;
        if outcome.success {
            tracing::info!(
                layer = %config.id,
                inserted = outcome.inserted,
                updated = outcome.updated,
                deleted = outcome.deleted,
                partial = outcome.is_partial(),
                "transaction committed"
            );
        } else {
            tracing::warn!(layer = %config.id, error = ?outcome.error, "transaction rejected");
        }
        Ok(outcome)
    }
}

impl std::fmt::Debug for OgcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OgcClient")
            .field("base_path", &self.base_path)
            .finish()
    }
}
