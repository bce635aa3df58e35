//! Client facade: inline and deferred operation families.
//!
//! Each logical action exposes four forms, e.g. for event tracking:
//!
//! - [`Client::track_event`] / [`Client::track_event_with_cancel`] — inline:
//!   performs the request on the caller's path and returns the remote
//!   outcome verbatim.
//! - [`Client::track_event_deferred`] /
//!   [`Client::track_event_deferred_with_cancel`] — deferred: hands the
//!   request to the dispatcher and returns immediately. No outcome ever
//!   reaches the caller.
//!
//! The `_with_cancel` variants take a caller-owned [`CancellationToken`]
//! scoped to that single request; the plain forms supply a fresh token that
//! nobody cancels.
//!
//! With [`ClientConfig::defer_by_default`] set, the inline-named forms
//! delegate to their deferred counterparts and return `Ok(())` immediately —
//! their result then says nothing about whether the remote call succeeded.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ClientConfig;
use crate::core::{ClientError, DispatchTask, Dispatcher};
use crate::transport::{Endpoint, HttpTransport, ReferralRequest, TrackEventRequest, Transport};

/// Event-ingestion client.
///
/// Owns the dispatcher; workers start when the client is constructed and are
/// joined by [`Client::shutdown`]. Construction must happen inside a tokio
/// runtime.
pub struct Client {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    dispatcher: Dispatcher,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Build a client with the production HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] if validation fails, or
    /// [`ClientError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate().map_err(ClientError::InvalidConfig)?;
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config)?);
        Self::with_transport(config, transport)
    }

    /// Build a client around a custom [`Transport`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] if validation fails.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        config.validate().map_err(ClientError::InvalidConfig)?;
        let dispatcher = Dispatcher::start(
            config.worker_count,
            config.queue_capacity,
            Arc::clone(&transport),
        );
        Ok(Self {
            config,
            transport,
            dispatcher,
        })
    }

    /// Track one update inline with a non-cancelling scope.
    ///
    /// # Errors
    ///
    /// Propagates the transport outcome verbatim — unless
    /// `defer_by_default` is set, in which case this returns `Ok(())`
    /// immediately and the outcome is discarded on a worker.
    pub async fn track_event<E: Serialize>(&self, event: &E) -> Result<(), ClientError> {
        self.track_event_with_cancel(CancellationToken::new(), event)
            .await
    }

    /// Track one update inline under the caller's cancellation scope.
    ///
    /// # Errors
    ///
    /// Same contract as [`Client::track_event`].
    pub async fn track_event_with_cancel<E: Serialize>(
        &self,
        cancel: CancellationToken,
        event: &E,
    ) -> Result<(), ClientError> {
        if self.config.defer_by_default {
            self.track_event_deferred_with_cancel(cancel, event).await;
            return Ok(());
        }
        let payload = self.track_payload(event)?;
        self.transport
            .perform(&cancel, Endpoint::Track, &payload)
            .await
    }

    /// Queue one update for background delivery, non-cancelling scope.
    pub async fn track_event_deferred<E: Serialize>(&self, event: &E) {
        self.track_event_deferred_with_cancel(CancellationToken::new(), event)
            .await;
    }

    /// Queue one update for background delivery under the caller's scope.
    pub async fn track_event_deferred_with_cancel<E: Serialize>(
        &self,
        cancel: CancellationToken,
        event: &E,
    ) {
        match self.track_payload(event) {
            Ok(payload) => {
                self.dispatcher
                    .enqueue(DispatchTask::new(cancel, Endpoint::Track, payload))
                    .await;
            }
            Err(err) => debug!(error = %err, "deferred track payload rejected, dropped"),
        }
    }

    /// Record a referral inline with a non-cancelling scope.
    ///
    /// # Errors
    ///
    /// Same contract as [`Client::track_event`].
    pub async fn record_referral(&self, user_id: i64, invited_by: i64) -> Result<(), ClientError> {
        self.record_referral_with_cancel(CancellationToken::new(), user_id, invited_by)
            .await
    }

    /// Record a referral inline under the caller's cancellation scope.
    ///
    /// # Errors
    ///
    /// Same contract as [`Client::track_event`].
    pub async fn record_referral_with_cancel(
        &self,
        cancel: CancellationToken,
        user_id: i64,
        invited_by: i64,
    ) -> Result<(), ClientError> {
        if self.config.defer_by_default {
            self.record_referral_deferred_with_cancel(cancel, user_id, invited_by)
                .await;
            return Ok(());
        }
        let payload = self.referral_payload(user_id, invited_by)?;
        self.transport
            .perform(&cancel, Endpoint::InvitedBy, &payload)
            .await
    }

    /// Queue a referral for background delivery, non-cancelling scope.
    pub async fn record_referral_deferred(&self, user_id: i64, invited_by: i64) {
        self.record_referral_deferred_with_cancel(CancellationToken::new(), user_id, invited_by)
            .await;
    }

    /// Queue a referral for background delivery under the caller's scope.
    pub async fn record_referral_deferred_with_cancel(
        &self,
        cancel: CancellationToken,
        user_id: i64,
        invited_by: i64,
    ) {
        match self.referral_payload(user_id, invited_by) {
            Ok(payload) => {
                self.dispatcher
                    .enqueue(DispatchTask::new(cancel, Endpoint::InvitedBy, payload))
                    .await;
            }
            Err(err) => debug!(error = %err, "deferred referral payload rejected, dropped"),
        }
    }

    /// Stop the dispatcher and wait for every worker to exit.
    ///
    /// Queued-but-unpulled tasks are abandoned; a request already in flight
    /// finishes first. Subsequent deferred calls become no-ops.
    pub async fn shutdown(&self) {
        self.dispatcher.stop().await;
    }

    /// The dispatcher backing this client's deferred operations.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn track_payload<E: Serialize>(&self, event: &E) -> Result<serde_json::Value, ClientError> {
        let request = TrackEventRequest {
            updates: vec![serde_json::to_value(event)?],
            origin: self.config.origin.clone(),
        };
        Ok(serde_json::to_value(request)?)
    }

    fn referral_payload(
        &self,
        user_id: i64,
        invited_by: i64,
    ) -> Result<serde_json::Value, ClientError> {
        let request = ReferralRequest {
            user_id,
            invited_by,
            origin: self.config.origin.clone(),
        };
        Ok(serde_json::to_value(request)?)
    }
}
