//! Collaborator contract between the dispatch core and the ingest API.
//!
//! The core never touches HTTP directly: it sees one operation,
//! [`Transport::perform`], taking a cancellation scope, a target endpoint,
//! and a pre-built JSON payload. The production implementation lives in
//! [`http::HttpTransport`]; tests substitute their own.

pub mod http;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::error::ClientError;

pub use http::HttpTransport;

/// Remote operations exposed by the ingest API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// Record a batch of tracked updates.
    Track,
    /// Record who invited a user.
    InvitedBy,
}

impl Endpoint {
    /// Path segment for this operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::InvitedBy => "invited_by",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body for [`Endpoint::Track`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackEventRequest {
    /// Updates to record; the facade sends one per call.
    pub updates: Vec<serde_json::Value>,
    /// Origin tag identifying the producing SDK, omitted when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub origin: String,
}

/// Request body for [`Endpoint::InvitedBy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralRequest {
    /// User the referral applies to.
    pub user_id: i64,
    /// User who issued the invitation.
    pub invited_by: i64,
    /// Origin tag identifying the producing SDK, omitted when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub origin: String,
}

/// `{status, details}` envelope every ingest response carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// `"success"` when the request was accepted.
    #[serde(default)]
    pub status: String,
    /// Human-readable rejection reason, empty on success.
    #[serde(default)]
    pub details: String,
}

/// The single operation the dispatch core consumes.
///
/// `perform` sends `payload` to `endpoint` and reports the remote outcome.
/// Implementations must honor `cancel`: once the token fires, the in-flight
/// request is abandoned and an error returned. Implementations never retry.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Deliver one payload to one endpoint.
    async fn perform(
        &self,
        cancel: &CancellationToken,
        endpoint: Endpoint,
        payload: &serde_json::Value,
    ) -> Result<(), ClientError>;
}
