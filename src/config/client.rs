//! Client configuration structure.

use serde::{Deserialize, Serialize};

/// Default ingest API base URL.
pub const DEFAULT_API_URL: &str = "https://api.relaykit.dev/v1";
/// Default origin tag attached to outgoing payloads.
pub const DEFAULT_ORIGIN: &str = "relaykit-rust";
/// Default number of dispatch workers.
pub const DEFAULT_WORKER_COUNT: usize = 1;
/// Default bounded queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Client configuration.
///
/// Construct with [`ClientConfig::new`], adjust with the `with_*` methods,
/// then hand to [`Client::new`](crate::Client::new) which validates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Project the events belong to; becomes a URL path segment.
    pub project_id: u64,
    /// Bearer token authenticating against the ingest API.
    pub access_key: String,
    /// Ingest API base URL (without the project id).
    pub api_url: String,
    /// Origin tag attached to every payload; empty disables it.
    pub origin: String,
    /// Number of concurrent dispatch workers.
    pub worker_count: usize,
    /// Capacity of the bounded dispatch queue.
    pub queue_capacity: usize,
    /// When set, the inline-named operations delegate to their deferred
    /// counterparts and return `Ok(())` immediately. Their result then no
    /// longer reflects the remote outcome.
    pub defer_by_default: bool,
    /// Per-request timeout in seconds for the HTTP transport.
    pub request_timeout_secs: u64,
}

impl ClientConfig {
    /// Configuration with defaults for the given project credentials.
    pub fn new(project_id: u64, access_key: impl Into<String>) -> Self {
        Self {
            project_id,
            access_key: access_key.into(),
            api_url: DEFAULT_API_URL.into(),
            origin: DEFAULT_ORIGIN.into(),
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            defer_by_default: false,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    /// Set a custom ingest API base URL.
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Set a custom origin tag.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Set the number of dispatch workers.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the dispatch queue capacity.
    #[must_use]
    pub const fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Route inline-named operations through the dispatcher.
    #[must_use]
    pub const fn with_deferred_dispatch(mut self, defer_by_default: bool) -> Self {
        self.defer_by_default = defer_by_default;
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub const fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.access_key.is_empty() {
            return Err("access_key must not be empty".into());
        }
        if self.api_url.is_empty() {
            return Err("api_url must not be empty".into());
        }
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be greater than 0".into());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than 0".into());
        }
        Ok(())
    }

    /// Load configuration from the environment (and a `.env` file if one is
    /// present).
    ///
    /// Required: `RELAYKIT_PROJECT_ID`, `RELAYKIT_ACCESS_KEY`. Optional:
    /// `RELAYKIT_API_URL`, `RELAYKIT_ORIGIN`, `RELAYKIT_WORKER_COUNT`,
    /// `RELAYKIT_QUEUE_CAPACITY`, `RELAYKIT_DEFER_BY_DEFAULT`,
    /// `RELAYKIT_REQUEST_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns a description of the first missing or unparsable variable.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let project_id = require_env("RELAYKIT_PROJECT_ID")?
            .parse::<u64>()
            .map_err(|e| format!("RELAYKIT_PROJECT_ID invalid: {e}"))?;
        let access_key = require_env("RELAYKIT_ACCESS_KEY")?;

        let mut config = Self::new(project_id, access_key);
        if let Ok(api_url) = std::env::var("RELAYKIT_API_URL") {
            config.api_url = api_url;
        }
        if let Ok(origin) = std::env::var("RELAYKIT_ORIGIN") {
            config.origin = origin;
        }
        if let Ok(raw) = std::env::var("RELAYKIT_WORKER_COUNT") {
            config.worker_count = raw
                .parse()
                .map_err(|e| format!("RELAYKIT_WORKER_COUNT invalid: {e}"))?;
        }
        if let Ok(raw) = std::env::var("RELAYKIT_QUEUE_CAPACITY") {
            config.queue_capacity = raw
                .parse()
                .map_err(|e| format!("RELAYKIT_QUEUE_CAPACITY invalid: {e}"))?;
        }
        if let Ok(raw) = std::env::var("RELAYKIT_DEFER_BY_DEFAULT") {
            config.defer_by_default = raw
                .parse()
                .map_err(|e| format!("RELAYKIT_DEFER_BY_DEFAULT invalid: {e}"))?;
        }
        if let Ok(raw) = std::env::var("RELAYKIT_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = raw
                .parse()
                .map_err(|e| format!("RELAYKIT_REQUEST_TIMEOUT_SECS invalid: {e}"))?;
        }
        Ok(config)
    }
}

fn require_env(name: &str) -> Result<String, String> {
    std::env::var(name).map_err(|_| format!("{name} is not set"))
}
