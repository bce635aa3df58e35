//! Integration tests for the dispatch core.
//!
//! These validate the queue/worker-pool contract:
//! - accepted tasks reach exactly one worker
//! - fan-out across workers (not serialized to one)
//! - shutdown drops queued work but lets in-flight work finish
//! - idempotent stop
//! - failing or panicking requests never kill a worker loop
//! - per-task cancellation aborts the in-flight request only
//! - full-queue backpressure is released by space or by shutdown

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use relaykit::core::ClientError;
use relaykit::{DispatchTask, Dispatcher, Endpoint, LifecycleState, Transport};

// ============================================================================
// HELPERS
// ============================================================================

fn make_task(id: u64) -> DispatchTask {
    DispatchTask::new(
        CancellationToken::new(),
        Endpoint::Track,
        serde_json::json!({ "updates": [{ "id": id }] }),
    )
}

/// Poll `predicate` every 2ms until it holds or `deadline` elapses.
async fn wait_until(deadline: Duration, predicate: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    predicate()
}

// ============================================================================
// TEST TRANSPORTS
// ============================================================================

/// Counts perform calls and tracks the maximum overlap observed.
struct CountingTransport {
    performed: AtomicU64,
    concurrent: AtomicU64,
    max_concurrent: AtomicU64,
    delay: Duration,
}

impl CountingTransport {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            performed: AtomicU64::new(0),
            concurrent: AtomicU64::new(0),
            max_concurrent: AtomicU64::new(0),
            delay,
        })
    }

    fn performed(&self) -> u64 {
        self.performed.load(Ordering::SeqCst)
    }

    fn max_concurrent(&self) -> u64 {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for CountingTransport {
    async fn perform(
        &self,
        _cancel: &CancellationToken,
        _endpoint: Endpoint,
        _payload: &serde_json::Value,
    ) -> Result<(), ClientError> {
        let current = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        let mut max = self.max_concurrent.load(Ordering::SeqCst);
        while current > max {
            match self.max_concurrent.compare_exchange_weak(
                max,
                current,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(m) => max = m,
            }
        }

        tokio::time::sleep(self.delay).await;

        self.concurrent.fetch_sub(1, Ordering::SeqCst);
        self.performed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records the `id` of every payload it delivers.
struct RecordingTransport {
    ids: parking_lot::Mutex<Vec<u64>>,
}

impl RecordingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            ids: parking_lot::Mutex::new(Vec::new()),
        })
    }

    fn ids(&self) -> Vec<u64> {
        self.ids.lock().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn perform(
        &self,
        _cancel: &CancellationToken,
        _endpoint: Endpoint,
        payload: &serde_json::Value,
    ) -> Result<(), ClientError> {
        let id = payload["updates"][0]["id"].as_u64().unwrap_or(u64::MAX);
        self.ids.lock().push(id);
        Ok(())
    }
}

/// Fails every request.
struct FailingTransport {
    attempts: AtomicU64,
}

#[async_trait]
impl Transport for FailingTransport {
    async fn perform(
        &self,
        _cancel: &CancellationToken,
        _endpoint: Endpoint,
        _payload: &serde_json::Value,
    ) -> Result<(), ClientError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ClientError::RemoteRejected {
            status: 500,
            details: "synthetic failure".into(),
        })
    }
}

/// Panics on the first call, succeeds afterwards.
struct PanickingTransport {
    calls: AtomicU64,
}

#[async_trait]
impl Transport for PanickingTransport {
    async fn perform(
        &self,
        _cancel: &CancellationToken,
        _endpoint: Endpoint,
        _payload: &serde_json::Value,
    ) -> Result<(), ClientError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            panic!("synthetic transport panic");
        }
        Ok(())
    }
}

/// Honors the task token: aborts a long request when cancelled.
struct CancelAwareTransport {
    started: AtomicU64,
    aborted: AtomicU64,
    completed: AtomicU64,
}

#[async_trait]
impl Transport for CancelAwareTransport {
    async fn perform(
        &self,
        cancel: &CancellationToken,
        _endpoint: Endpoint,
        _payload: &serde_json::Value,
    ) -> Result<(), ClientError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            () = cancel.cancelled() => {
                self.aborted.fetch_add(1, Ordering::SeqCst);
                Err(ClientError::Transport("request cancelled".into()))
            }
            () = tokio::time::sleep(Duration::from_secs(5)) => {
                self.completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }
}

/// Blocks every request on a semaphore permit released by the test.
struct GatedTransport {
    gate: tokio::sync::Semaphore,
    performed: AtomicU64,
}

impl GatedTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: tokio::sync::Semaphore::new(0),
            performed: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn perform(
        &self,
        _cancel: &CancellationToken,
        _endpoint: Endpoint,
        _payload: &serde_json::Value,
    ) -> Result<(), ClientError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| ClientError::Transport("gate closed".into()))?;
        self.performed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

/// An accepted task is eventually delivered to exactly one worker.
#[tokio::test]
async fn test_accepted_task_reaches_one_worker() {
    let transport = CountingTransport::new(Duration::ZERO);
    let dispatcher = Dispatcher::start(1, 1000, Arc::clone(&transport) as Arc<dyn Transport>);

    dispatcher.enqueue(make_task(1)).await;

    assert!(wait_until(Duration::from_millis(500), || transport.performed() == 1).await);
    // Exactly once: no duplicate delivery after a grace period.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.performed(), 1);

    dispatcher.stop().await;
}

/// Fan-out: 3 workers, 5 tasks of 10ms each. All five must be
/// observed within 200ms, wall clock must beat serial execution, and the
/// overlap must exceed one in-flight request.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fan_out_across_workers() {
    let transport = CountingTransport::new(Duration::from_millis(10));
    let dispatcher = Dispatcher::start(3, 1000, Arc::clone(&transport) as Arc<dyn Transport>);

    let start = Instant::now();
    for id in 0..5 {
        dispatcher.enqueue(make_task(id)).await;
    }

    assert!(
        wait_until(Duration::from_millis(200), || transport.performed() == 5).await,
        "all 5 tasks should be performed within 200ms"
    );
    let elapsed = start.elapsed();
    assert!(
        elapsed < Duration::from_millis(50),
        "5x10ms of work across 3 workers took {elapsed:?}, expected parallel execution"
    );
    assert!(
        transport.max_concurrent() > 1,
        "expected overlapping perform calls, saw max {}",
        transport.max_concurrent()
    );

    dispatcher.stop().await;
}

/// stop() returns promptly and a task enqueued
/// afterwards is never delivered.
#[tokio::test]
async fn test_enqueue_after_stop_never_delivered() {
    let transport = RecordingTransport::new();
    let dispatcher = Dispatcher::start(1, 1000, Arc::clone(&transport) as Arc<dyn Transport>);

    dispatcher.enqueue(make_task(1)).await;

    tokio::time::timeout(Duration::from_secs(2), dispatcher.stop())
        .await
        .expect("stop() must not hang");
    assert_eq!(dispatcher.state(), LifecycleState::Stopped);

    dispatcher.enqueue(make_task(2)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(
        !transport.ids().contains(&2),
        "task enqueued after stop must never reach perform"
    );
}

/// A task already pulled by a worker finishes its request even when
/// stop() lands mid-execution.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_in_flight_task_completes_through_stop() {
    let transport = CountingTransport::new(Duration::from_millis(100));
    let dispatcher = Dispatcher::start(1, 1000, Arc::clone(&transport) as Arc<dyn Transport>);

    dispatcher.enqueue(make_task(1)).await;

    // Wait until the worker has pulled the task and is inside perform.
    assert!(
        wait_until(Duration::from_millis(500), || {
            transport.concurrent.load(Ordering::SeqCst) == 1
        })
        .await
    );

    dispatcher.stop().await;

    // stop() joins workers, so by now the in-flight request has finished.
    assert_eq!(transport.performed(), 1);
}

/// A second stop() neither panics nor blocks, and workers stay gone.
#[tokio::test]
async fn test_stop_is_idempotent() {
    let transport = CountingTransport::new(Duration::ZERO);
    let dispatcher = Dispatcher::start(2, 10, Arc::clone(&transport) as Arc<dyn Transport>);

    dispatcher.stop().await;
    tokio::time::timeout(Duration::from_secs(1), dispatcher.stop())
        .await
        .expect("second stop() must return promptly");

    dispatcher.enqueue(make_task(1)).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(transport.performed(), 0);
}

/// A failing perform moves the worker on to the next task; the loop only
/// exits on the shutdown signal.
#[tokio::test]
async fn test_failures_do_not_stop_the_worker_loop() {
    let transport = Arc::new(FailingTransport {
        attempts: AtomicU64::new(0),
    });
    let dispatcher = Dispatcher::start(1, 1000, Arc::clone(&transport) as Arc<dyn Transport>);

    for id in 0..3 {
        dispatcher.enqueue(make_task(id)).await;
    }

    assert!(
        wait_until(Duration::from_millis(500), || {
            transport.attempts.load(Ordering::SeqCst) == 3
        })
        .await,
        "every task must be attempted despite failures"
    );
    assert_eq!(dispatcher.state(), LifecycleState::Running);

    dispatcher.stop().await;
}

/// A panic inside perform is contained at the loop boundary: the worker
/// survives and processes the next task.
#[tokio::test]
async fn test_panicking_perform_is_contained() {
    let transport = Arc::new(PanickingTransport {
        calls: AtomicU64::new(0),
    });
    let dispatcher = Dispatcher::start(1, 1000, Arc::clone(&transport) as Arc<dyn Transport>);

    dispatcher.enqueue(make_task(1)).await;
    dispatcher.enqueue(make_task(2)).await;

    assert!(
        wait_until(Duration::from_millis(500), || {
            transport.calls.load(Ordering::SeqCst) == 2
        })
        .await,
        "the worker must survive the first task's panic and run the second"
    );

    dispatcher.stop().await;
}

/// Cancelling a task's own token aborts its in-flight request without
/// touching the dispatcher or sibling tasks.
#[tokio::test]
async fn test_task_cancellation_aborts_only_that_request() {
    let transport = Arc::new(CancelAwareTransport {
        started: AtomicU64::new(0),
        aborted: AtomicU64::new(0),
        completed: AtomicU64::new(0),
    });
    let dispatcher = Dispatcher::start(1, 1000, Arc::clone(&transport) as Arc<dyn Transport>);

    let cancel = CancellationToken::new();
    dispatcher
        .enqueue(DispatchTask::new(
            cancel.clone(),
            Endpoint::Track,
            serde_json::json!({ "updates": [{ "id": 1 }] }),
        ))
        .await;

    assert!(
        wait_until(Duration::from_millis(500), || {
            transport.started.load(Ordering::SeqCst) == 1
        })
        .await
    );

    cancel.cancel();
    assert!(
        wait_until(Duration::from_millis(500), || {
            transport.aborted.load(Ordering::SeqCst) == 1
        })
        .await,
        "cancelling the task token must abort the in-flight request"
    );

    assert_eq!(dispatcher.state(), LifecycleState::Running);
    assert_eq!(transport.completed.load(Ordering::SeqCst), 0);

    dispatcher.stop().await;
}

/// With the queue full and the dispatcher running, enqueue suspends until a
/// worker frees space.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_queue_backpressure_released_by_space() {
    let transport = GatedTransport::new();
    let dispatcher = Arc::new(Dispatcher::start(
        1,
        1,
        Arc::clone(&transport) as Arc<dyn Transport>,
    ));

    // First task is pulled by the worker and parks on the gate; second fills
    // the single queue slot.
    dispatcher.enqueue(make_task(1)).await;
    dispatcher.enqueue(make_task(2)).await;

    let blocked = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.enqueue(make_task(3)).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(
        !blocked.is_finished(),
        "third enqueue should suspend while the queue is full"
    );

    // Let the worker finish tasks one by one; space frees and the suspended
    // enqueue completes.
    transport.gate.add_permits(3);
    tokio::time::timeout(Duration::from_secs(2), blocked)
        .await
        .expect("suspended enqueue must resume once space frees")
        .expect("enqueue task must not panic");

    assert!(
        wait_until(Duration::from_millis(500), || {
            transport.performed.load(Ordering::SeqCst) == 3
        })
        .await
    );

    dispatcher.stop().await;
}

/// A caller suspended on a full queue is released the moment shutdown
/// begins; its task is dropped, not delivered.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_queue_backpressure_released_by_stop() {
    let transport = CountingTransport::new(Duration::from_millis(200));
    let dispatcher = Arc::new(Dispatcher::start(
        1,
        1,
        Arc::clone(&transport) as Arc<dyn Transport>,
    ));

    // Worker pulls task 1 and sleeps 200ms in perform; task 2 fills the
    // queue; task 3 suspends on the full queue.
    dispatcher.enqueue(make_task(1)).await;
    dispatcher.enqueue(make_task(2)).await;

    let blocked = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.enqueue(make_task(3)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!blocked.is_finished());

    let stop = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.stop().await })
    };

    // The suspended enqueue returns as soon as cancellation fires, well
    // before the in-flight 200ms request lets stop() finish.
    tokio::time::timeout(Duration::from_millis(100), blocked)
        .await
        .expect("suspended enqueue must be released by shutdown")
        .expect("enqueue task must not panic");

    stop.await.expect("stop task must not panic");

    // Only the in-flight task ran; the queued and the suspended ones were
    // abandoned.
    assert_eq!(transport.performed(), 1);
}
