use async_trait::async_trait;
use serde_json::Value;

use crate::error::{NetworkError, Result};

use super::api::{decode_json_body, FeatureApi, Query};

/// [`FeatureApi`] over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFeatureApi {
    client: reqwest::Client,
    origin: String,
}

impl HttpFeatureApi {
    /// `origin` is prefixed to every path, e.g. `https://maps.example.org`.
    pub fn new(origin: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), origin)
    }

    pub fn with_client(client: reqwest::Client, origin: impl Into<String>) -> Self {
        Self {
            client,
            origin: origin.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.origin, path)
    }

    async fn finish(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NetworkError::new(format!("reading body: {e}")))?;
        decode_json_body(status.as_u16(), status.is_success(), body)
    }
}

#[async_trait]
impl FeatureApi for HttpFeatureApi {
    async fn get(&self, path: &str, query: &Query) -> Result<Value> {
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(|e| NetworkError::new(e.to_string()))?;
        Self::finish(response).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| NetworkError::new(e.to_string()))?;
        Self::finish(response).await
    }
}
