//! # Relaykit
//!
//! A client SDK for a remote event-ingestion API with a bounded, worker-pool
//! backed dispatch queue for fire-and-forget delivery.
//!
//! The crate has two halves:
//!
//! - **Dispatch core** (`core`): a bounded FIFO queue of [`DispatchTask`]s,
//!   a configurable pool of background workers draining it, and a
//!   cancellation-token based graceful-shutdown protocol. This is the only
//!   concurrency-bearing code in the crate.
//! - **Client facade** (`client` + `transport`): builds JSON request bodies
//!   for the two remote operations (`track` and `invited_by`) and either
//!   performs them inline (returning the remote outcome) or defers them to
//!   the dispatcher (returning immediately, outcome discarded).
//!
//! ## Delivery contract
//!
//! Deferred delivery is **best effort**: once a task is handed to the
//! dispatcher there is no error channel back to the caller. Remote failures
//! are logged and dropped. Tasks enqueued after shutdown has begun are
//! silently discarded, and tasks still queued when shutdown begins are
//! abandoned; only tasks already pulled by a worker run to completion.
//!
//! ## Example
//!
//! ```rust,ignore
//! use relaykit::{Client, ClientConfig};
//!
//! let config = ClientConfig::new(4217, "rk_live_...")
//!     .with_worker_count(3)
//!     .with_deferred_dispatch(true);
//! let client = Client::new(config)?;
//!
//! // Returns Ok(()) immediately; delivery happens on a worker.
//! client.track_event(&update).await?;
//!
//! // Drain workers before process exit.
//! client.shutdown().await;
//! ```
//!
//! Construction must happen inside a tokio runtime: workers are spawned as
//! tokio tasks when the client is created.

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Dispatch core: task model, bounded queue, worker pool, shutdown protocol.
pub mod core;
/// Client configuration model.
pub mod config;
/// Client facade with inline and deferred operation families.
pub mod client;
/// Collaborator contract and the HTTP implementation behind it.
pub mod transport;
/// Shared utilities.
pub mod util;

pub use self::core::{ClientError, DispatchTask, Dispatcher, LifecycleState};
pub use client::Client;
pub use config::ClientConfig;
pub use transport::{Endpoint, HttpTransport, Transport};
