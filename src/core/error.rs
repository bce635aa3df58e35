//! Error types for client operations.

use thiserror::Error;

/// Errors produced by the client and its transport.
///
/// Inline operations return these verbatim. Deferred operations have no
/// error channel: a worker consumes the result and logs it.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The ingest API rejected the access key (HTTP 403).
    #[error("invalid credentials")]
    InvalidCredentials,
    /// The ingest API answered but did not accept the request.
    #[error("ingest API rejected request (status {status}): {details}")]
    RemoteRejected {
        /// HTTP status code of the response.
        status: u16,
        /// `details` field of the response envelope.
        details: String,
    },
    /// The request never produced a usable response (connect failure,
    /// timeout, cancelled in flight).
    #[error("transport error: {0}")]
    Transport(String),
    /// A payload or response body could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Configuration validation failed at construction.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
