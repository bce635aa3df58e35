//! Bounded-queue dispatcher with a pool of background workers.
//!
//! The dispatcher owns a bounded FIFO channel of [`DispatchTask`]s and a
//! fixed set of tokio worker tasks draining it. Callers hold a handle used
//! only to enqueue and to trigger shutdown; the queue and the workers are
//! never shared beyond that.
//!
//! # Design
//!
//! - **No polling**: workers suspend on channel recv, raced against the
//!   lifecycle token with a biased `select!`.
//! - **Fire-and-forget**: a worker consumes each task's `perform` result and
//!   discards it; a failed or panicking request never stops the loop.
//! - **Graceful shutdown**: `stop()` cancels the lifecycle token and joins
//!   every worker. Queued-but-unpulled tasks are abandoned; a task already
//!   pulled finishes its request.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::core::task::DispatchTask;
use crate::transport::Transport;

/// Lifecycle of a [`Dispatcher`] instance.
///
/// The only transition is `Running` → `ShuttingDown` → `Stopped`, driven by
/// the first [`Dispatcher::stop`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Workers are draining the queue and `enqueue` accepts tasks.
    Running,
    /// `stop()` has been called; workers are being joined.
    ShuttingDown,
    /// All workers have exited.
    Stopped,
}

const STATE_RUNNING: u8 = 0;
const STATE_SHUTTING_DOWN: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Bounded task queue with `worker_count` concurrent worker loops.
///
/// Created once per [`Client`](crate::Client) and stopped exactly once via
/// [`Dispatcher::stop`]. Enqueue calls after stop are silent no-ops.
pub struct Dispatcher {
    /// Producer side of the bounded task channel.
    task_tx: mpsc::Sender<DispatchTask>,
    /// Shutdown signal shared with every worker loop.
    lifecycle: CancellationToken,
    /// Coarse lifecycle state for observers; transitions happen in `stop`.
    state: AtomicU8,
    /// Worker join handles, drained by the first `stop` call.
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Allocate the bounded queue and spawn `worker_count` worker loops.
    ///
    /// Callers validate the configuration first: `worker_count` and
    /// `queue_capacity` must both be at least 1. Must be called within a
    /// tokio runtime.
    #[must_use]
    pub fn start(
        worker_count: usize,
        queue_capacity: usize,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (task_tx, task_rx) = mpsc::channel::<DispatchTask>(queue_capacity);
        let task_rx = Arc::new(tokio::sync::Mutex::new(task_rx));
        let lifecycle = CancellationToken::new();

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            workers.push(spawn_worker(
                worker_id,
                Arc::clone(&task_rx),
                lifecycle.clone(),
                Arc::clone(&transport),
            ));
        }

        info!(worker_count, queue_capacity, "dispatcher started");

        Self {
            task_tx,
            lifecycle,
            state: AtomicU8::new(STATE_RUNNING),
            workers: Mutex::new(workers),
        }
    }

    /// Hand a task to the worker pool.
    ///
    /// Best effort by contract: this method never returns an error.
    ///
    /// - While running with queue capacity available, the task is accepted
    ///   and will eventually reach exactly one worker.
    /// - While running with a **full** queue, the call suspends until space
    ///   frees or shutdown begins. This is the backpressure policy: the send
    ///   is raced against the lifecycle token, so a stuck queue can never
    ///   wedge a caller past shutdown.
    /// - Once shutdown has begun, the task is dropped silently (logged at
    ///   debug).
    pub async fn enqueue(&self, task: DispatchTask) {
        let endpoint = task.endpoint;
        tokio::select! {
            biased;
            () = self.lifecycle.cancelled() => {
                debug!(endpoint = %endpoint, "dispatcher shutting down, task dropped");
            }
            result = self.task_tx.send(task) => match result {
                Ok(()) => trace!(endpoint = %endpoint, "task enqueued"),
                Err(_) => debug!(endpoint = %endpoint, "dispatch queue closed, task dropped"),
            },
        }
    }

    /// Signal all workers to exit and wait until every loop has finished.
    ///
    /// Tasks already pulled by a worker complete their request first; tasks
    /// still sitting in the queue are abandoned. Idempotent: a second call
    /// returns promptly without joining or re-spawning anything.
    pub async fn stop(&self) {
        if self
            .state
            .compare_exchange(
                STATE_RUNNING,
                STATE_SHUTTING_DOWN,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            // Another call already drove (or is driving) the shutdown.
            self.lifecycle.cancel();
            return;
        }

        info!("dispatcher shutting down");
        self.lifecycle.cancel();

        let handles: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        let worker_count = handles.len();
        for (worker_id, handle) in handles.into_iter().enumerate() {
            if handle.await.is_err() {
                warn!(worker_id, "dispatch worker panicked before join");
            }
        }

        self.state.store(STATE_STOPPED, Ordering::Release);
        info!(worker_count, "dispatcher stopped");
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        match self.state.load(Ordering::Acquire) {
            STATE_RUNNING => LifecycleState::Running,
            STATE_SHUTTING_DOWN => LifecycleState::ShuttingDown,
            _ => LifecycleState::Stopped,
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Dropping without stop() detaches the workers; the cancelled token
        // still lets them exit instead of waiting on a dead channel forever.
        if self.state.load(Ordering::Acquire) == STATE_RUNNING {
            self.lifecycle.cancel();
            debug!("dispatcher dropped without explicit stop, workers detached");
        }
    }
}

/// Spawn one worker loop.
///
/// Workers share the single receiver behind an async mutex; the lock is held
/// only while waiting for the next task, never across a request.
fn spawn_worker(
    worker_id: usize,
    task_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<DispatchTask>>>,
    lifecycle: CancellationToken,
    transport: Arc<dyn Transport>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(worker_id, "dispatch worker started");

        loop {
            let task = {
                let mut rx = task_rx.lock().await;
                tokio::select! {
                    biased;
                    () = lifecycle.cancelled() => {
                        debug!(worker_id, "dispatch worker cancelled");
                        break;
                    }
                    task = rx.recv() => task,
                }
            };

            let Some(task) = task else {
                debug!(worker_id, "dispatch queue closed, worker exiting");
                break;
            };

            let endpoint = task.endpoint;
            trace!(worker_id, endpoint = %endpoint, "worker executing task");

            // The unwind guard keeps a misbehaving transport from taking the
            // whole loop down with it.
            let outcome = std::panic::AssertUnwindSafe(transport.perform(
                &task.cancel,
                task.endpoint,
                &task.payload,
            ))
            .catch_unwind()
            .await;

            match outcome {
                Ok(Ok(())) => trace!(worker_id, endpoint = %endpoint, "task delivered"),
                // Fire-and-forget: the enqueuer has no result channel, so the
                // error is consumed here and the loop moves on.
                Ok(Err(err)) => {
                    debug!(worker_id, endpoint = %endpoint, error = %err, "task failed, result discarded");
                }
                Err(_) => {
                    warn!(worker_id, endpoint = %endpoint, "task panicked, result discarded");
                }
            }
        }

        debug!(worker_id, "dispatch worker exited");
    })
}
