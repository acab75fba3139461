//! Remote API client
//!
//! Maps queued mutations onto the remote REST surface:
//! insert -> `POST /{collection}`, update -> `PATCH /{collection}/{id}`,
//! delete -> `DELETE /{collection}/{id}`. The entity id for update and
//! delete comes from the payload's `"id"` field; its absence is a permanent
//! validation error, never retried.

use std::time::Duration;

use async_trait::async_trait;
use outpost_domain::{MutationKind, MutationRecord};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::http::HttpClient;
use crate::sync::coordinator::RemoteApplier;
use crate::sync::errors::SyncError;

/// Configuration for the remote client
#[derive(Debug, Clone)]
pub struct RemoteClientConfig {
    /// Base URL of the remote API (e.g., "https://api.example.com/v1")
    pub base_url: String,
    /// Optional bearer token attached to every request
    pub bearer_token: Option<String>,
    /// Transport-level timeout for each request
    pub timeout: Duration,
}

impl Default for RemoteClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            bearer_token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct RemoteClient {
    http_client: HttpClient,
    config: RemoteClientConfig,
}

impl RemoteClient {
    pub fn with_config(config: RemoteClientConfig) -> Result<Self, SyncError> {
        let http_client = HttpClient::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build http client: {e}")))?;

        Ok(Self { http_client, config })
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.bearer_token {
            Some(token) => builder.header("Authorization", format!("Bearer {token}")),
            None => builder,
        }
    }

    fn build_request(&self, record: &MutationRecord) -> Result<RequestBuilder, SyncError> {
        let base = self.config.base_url.trim_end_matches('/');
        let collection = &record.resource_collection;

        let builder = match record.kind {
            MutationKind::Insert => self
                .http_client
                .request(Method::POST, format!("{base}/{collection}"))
                .json(&record.payload),
            MutationKind::Update => {
                let id = entity_id(&record.payload)?;
                self.http_client
                    .request(Method::PATCH, format!("{base}/{collection}/{id}"))
                    .json(&record.payload)
            }
            MutationKind::Delete => {
                let id = entity_id(&record.payload)?;
                self.http_client.request(Method::DELETE, format!("{base}/{collection}/{id}"))
            }
        };

        Ok(self.authorize(builder))
    }
}

/// Extract the remote entity id addressed by an update or delete.
fn entity_id(payload: &Value) -> Result<String, SyncError> {
    match payload.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(SyncError::Client("mutation payload has no usable \"id\" field".into())),
    }
}

#[async_trait]
impl RemoteApplier for RemoteClient {
    #[instrument(skip(self, record), fields(mutation_id = %record.id))]
    async fn apply(&self, record: &MutationRecord) -> Result<(), SyncError> {
        let builder = self.build_request(record)?;
        let response = self.http_client.send(builder).await.map_err(SyncError::from)?;
        let status = response.status();

        if status.is_success() {
            debug!(%status, kind = %record.kind, "mutation applied remotely");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let detail = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {body}")
        };

        if status == StatusCode::TOO_MANY_REQUESTS {
            Err(SyncError::RateLimit(detail))
        } else if status.is_server_error() {
            Err(SyncError::Server(detail))
        } else {
            Err(SyncError::Client(detail))
        }
    }
}
