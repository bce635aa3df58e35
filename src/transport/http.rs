//! HTTP transport over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::config::ClientConfig;
use crate::core::error::ClientError;

use super::{Endpoint, ResponseEnvelope, Transport};

/// Production [`Transport`]: JSON POSTs to `{api_url}/{project_id}/{endpoint}`
/// with bearer authentication.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    access_key: String,
}

impl HttpTransport {
    /// Build a transport from client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the underlying HTTP client
    /// cannot be constructed.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: format!(
                "{}/{}",
                config.api_url.trim_end_matches('/'),
                config.project_id
            ),
            access_key: config.access_key.clone(),
        })
    }

    async fn send(&self, endpoint: Endpoint, payload: &serde_json::Value) -> Result<(), ClientError> {
        let url = format!("{}/{}", self.base_url, endpoint.as_str());
        trace!(%endpoint, "sending ingest request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_key)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(ClientError::InvalidCredentials);
        }

        let body = response.bytes().await?;
        let envelope: ResponseEnvelope = serde_json::from_slice(&body)?;

        if !status.is_success() || envelope.status != "success" {
            return Err(ClientError::RemoteRejected {
                status: status.as_u16(),
                details: envelope.details,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn perform(
        &self,
        cancel: &CancellationToken,
        endpoint: Endpoint,
        payload: &serde_json::Value,
    ) -> Result<(), ClientError> {
        // The task's own scope aborts the request mid-flight; dispatcher
        // shutdown does not reach here.
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ClientError::Transport("request cancelled".into())),
            result = self.send(endpoint, payload) => result,
        }
    }
}
