//! Task model for deferred dispatch.

use tokio_util::sync::CancellationToken;

use crate::transport::Endpoint;

/// One deferred unit of work: a pre-built payload bound for a single remote
/// endpoint, plus the cancellation scope governing its in-flight request.
///
/// A task is never mutated after construction. It is consumed by exactly one
/// worker, or dropped unprocessed if shutdown wins the race.
///
/// The `cancel` token is scoped to this task alone and is independent of the
/// dispatcher's own shutdown signal: cancelling it aborts this task's network
/// call, while stopping the dispatcher leaves an in-flight task untouched
/// (unless the caller deliberately derived the task token from the same
/// parent).
#[derive(Debug)]
pub struct DispatchTask {
    /// Cancellation scope for this task's in-flight request.
    pub cancel: CancellationToken,
    /// Remote operation the payload is bound for.
    pub endpoint: Endpoint,
    /// Pre-serialized request body.
    pub payload: serde_json::Value,
}

impl DispatchTask {
    /// Bundle a payload with its target endpoint and cancellation scope.
    #[must_use]
    pub const fn new(
        cancel: CancellationToken,
        endpoint: Endpoint,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            cancel,
            endpoint,
            payload,
        }
    }
}
