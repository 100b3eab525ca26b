//! Background queue that funnels writes from many threads into one.
//!
//! [`QueueingIndex::perform`] puts the operation on a bounded channel and
//! returns a pending [`IndexResult`]. A single worker thread takes whatever is
//! queued, applies it to the delegate index as one composite write, and
//! completes every result of the batch. Callers block when the queue is full.

use std::iter;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, bounded};
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::config::QueueConfig;
use crate::error::{PhalanxError, Result};
use crate::index::{CloseableIndex, Index};
use crate::operation::Operation;
use crate::result::{IndexResult, PendingResult};

/// How long a producer blocked on a full queue waits before checking that
/// the worker is still alive.
const SEND_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Statistics of a [`QueueingIndex`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Operations accepted by `perform`.
    pub operations_enqueued: u64,

    /// Batches applied successfully.
    pub batches_written: u64,

    /// Batches whose write failed.
    pub failed_batches: u64,

    /// Worker threads started.
    pub worker_spawns: u64,

    /// Operations currently waiting in the queue.
    pub queue_depth: usize,
}

/// An operation together with the result its caller waits on.
#[derive(Debug)]
struct FutureOperation {
    operation: Operation,
    result: Arc<PendingResult>,
}

#[derive(Debug)]
enum Task {
    Perform(FutureOperation),
    Stop,
}

#[derive(Debug, Default)]
struct QueueCounters {
    operations_enqueued: AtomicU64,
    batches_written: AtomicU64,
    failed_batches: AtomicU64,
    worker_spawns: AtomicU64,
}

/// State shared with the worker thread.
struct QueueShared {
    delegate: Arc<dyn CloseableIndex>,
    receiver: Receiver<Task>,
    counters: QueueCounters,
}

/// Results of a drained batch that have not been completed yet.
///
/// Dropping the batch fails whatever is left, so results are never stranded
/// when the worker unwinds.
#[derive(Default)]
struct Batch {
    operations: Vec<Operation>,
    results: Vec<Arc<PendingResult>>,
}

impl Batch {
    fn push(&mut self, future: FutureOperation) {
        self.operations.push(future.operation);
        self.results.push(future.result);
    }

    fn len(&self) -> usize {
        self.results.len()
    }

    fn complete(mut self) {
        for result in self.results.drain(..) {
            result.complete();
        }
    }

    fn fail(mut self, error: PhalanxError) {
        let error = Arc::new(error);
        for result in self.results.drain(..) {
            result.fail(Arc::clone(&error));
        }
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        if self.results.is_empty() {
            return;
        }
        let error = Arc::new(PhalanxError::internal(
            "index worker stopped before the operation was applied",
        ));
        for result in self.results.drain(..) {
            result.fail(Arc::clone(&error));
        }
    }
}

impl QueueShared {
    fn run(&self) {
        loop {
            let first = match self.receiver.recv() {
                Ok(task) => task,
                Err(_) => return,
            };

            let mut batch = Batch::default();
            let mut stop = false;
            for task in iter::once(first).chain(self.receiver.try_iter()) {
                match task {
                    Task::Perform(future) => batch.push(future),
                    Task::Stop => {
                        stop = true;
                        break;
                    }
                }
            }

            if !batch.results.is_empty() {
                // A panicking delegate fails the batch through its guard and
                // leaves the worker running.
                if panic::catch_unwind(AssertUnwindSafe(|| self.apply(batch))).is_err() {
                    error!("index write panicked; its batch was failed");
                    self.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
                }
            }
            if stop {
                return;
            }
        }
    }

    fn apply(&self, mut batch: Batch) {
        let count = batch.len();
        let mut operations = std::mem::take(&mut batch.operations);
        let operation = match operations.len() {
            0 => return,
            1 => operations.remove(0),
            _ => Operation::composite(operations),
        };
        debug!("applying batch of {count} index operation(s)");

        match self
            .delegate
            .perform(operation)
            .and_then(|result| result.wait())
        {
            Ok(()) => {
                batch.complete();
                self.counters.batches_written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("batch of {count} index operation(s) failed: {e}");
                batch.fail(PhalanxError::batch_failed(count, Arc::new(e)));
                self.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// An [`Index`] that applies operations on a dedicated worker thread.
pub struct QueueingIndex {
    config: QueueConfig,
    shared: Arc<QueueShared>,
    sender: RwLock<Option<Sender<Task>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl QueueingIndex {
    /// Queue operations in front of `delegate`.
    ///
    /// The worker thread is started by the first `perform`.
    pub fn new(delegate: Arc<dyn CloseableIndex>, config: QueueConfig) -> Self {
        let (sender, receiver) = bounded(config.capacity.max(1));
        QueueingIndex {
            config,
            shared: Arc::new(QueueShared {
                delegate,
                receiver,
                counters: QueueCounters::default(),
            }),
            sender: RwLock::new(Some(sender)),
            worker: Mutex::new(None),
        }
    }

    /// Get a copy of the queue statistics.
    pub fn stats(&self) -> QueueStats {
        let counters = &self.shared.counters;
        QueueStats {
            operations_enqueued: counters.operations_enqueued.load(Ordering::Relaxed),
            batches_written: counters.batches_written.load(Ordering::Relaxed),
            failed_batches: counters.failed_batches.load(Ordering::Relaxed),
            worker_spawns: counters.worker_spawns.load(Ordering::Relaxed),
            queue_depth: self.shared.receiver.len(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Start the worker unless one is running.
    ///
    /// The worker contains delegate panics and only returns on `Stop`, so a
    /// finished handle here means it ended some other way; replace it.
    fn ensure_worker(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if let Some(handle) = worker.as_ref() {
            if !handle.is_finished() {
                return Ok(());
            }
        }
        if let Some(dead) = worker.take() {
            if dead.join().is_err() {
                error!("index worker '{}' panicked, restarting it", self.config.thread_name);
            }
        }

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || shared.run())?;
        let spawns = self.shared.counters.worker_spawns.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("started index worker '{}' (#{spawns})", self.config.thread_name);
        *worker = Some(handle);
        Ok(())
    }

    fn fail_leftovers(&self) {
        let error = Arc::new(PhalanxError::already_closed("queueing index"));
        for task in self.shared.receiver.try_iter() {
            if let Task::Perform(future) = task {
                future.result.fail(Arc::clone(&error));
            }
        }
    }
}

impl Index for QueueingIndex {
    fn perform(&self, operation: Operation) -> Result<IndexResult> {
        let sender = self.sender.read();
        let Some(sender) = sender.as_ref() else {
            return Err(PhalanxError::already_closed("queueing index"));
        };
        self.ensure_worker()?;

        let result = PendingResult::new();
        let mut task = Task::Perform(FutureOperation {
            operation,
            result: Arc::clone(&result),
        });
        loop {
            match sender.send_timeout(task, SEND_RETRY_INTERVAL) {
                Ok(()) => break,
                Err(SendTimeoutError::Timeout(returned)) => {
                    task = returned;
                    self.ensure_worker()?;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    return Err(PhalanxError::already_closed("queueing index"));
                }
            }
        }

        self.shared
            .counters
            .operations_enqueued
            .fetch_add(1, Ordering::Relaxed);
        Ok(IndexResult::pending(result))
    }
}

impl CloseableIndex for QueueingIndex {
    /// Stop accepting operations, let the worker apply everything already
    /// queued, then close the delegate.
    fn close(&self) -> Result<()> {
        let Some(sender) = self.sender.write().take() else {
            return Ok(());
        };

        let worker_alive = self
            .worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        if worker_alive || !self.shared.receiver.is_empty() {
            self.ensure_worker()?;
            if sender.send(Task::Stop).is_err() {
                warn!("index worker '{}' is gone", self.config.thread_name);
            }
            if let Some(handle) = self.worker.lock().take() {
                if handle.join().is_err() {
                    error!("index worker '{}' panicked", self.config.thread_name);
                }
            }
        }
        drop(sender);

        self.fail_leftovers();
        info!("closed index queue '{}'", self.config.thread_name);
        self.shared.delegate.close()
    }
}

impl std::fmt::Debug for QueueingIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueingIndex")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Drop for QueueingIndex {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to close index queue on drop: {e}");
        }
    }
}
