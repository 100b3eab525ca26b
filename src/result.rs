//! Completion handles for index operations.
//!
//! An [`IndexResult`] is returned for every operation handed to an
//! [`Index`](crate::index::Index). It always reaches a terminal state:
//! either every constituent write succeeded or the first failure is reported.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{PhalanxError, Result};
use crate::operation::CompletionTask;

type Outcome = std::result::Result<(), Arc<PhalanxError>>;

/// The producer side of a result that completes later.
///
/// Only the first call to [`complete`](Self::complete) or
/// [`fail`](Self::fail) has an effect.
#[derive(Debug, Default)]
pub struct PendingResult {
    outcome: Mutex<Option<Outcome>>,
    done: Condvar,
}

impl PendingResult {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark the work as applied. Returns false if already completed.
    pub fn complete(&self) -> bool {
        self.set(Ok(()))
    }

    /// Mark the work as failed. Returns false if already completed.
    pub fn fail(&self, error: Arc<PhalanxError>) -> bool {
        self.set(Err(error))
    }

    fn set(&self, outcome: Outcome) -> bool {
        let mut guard = self.outcome.lock();
        if guard.is_some() {
            return false;
        }
        *guard = Some(outcome);
        self.done.notify_all();
        true
    }

    pub fn is_done(&self) -> bool {
        self.outcome.lock().is_some()
    }

    fn wait(&self) -> Result<()> {
        let mut guard = self.outcome.lock();
        while guard.is_none() {
            self.done.wait(&mut guard);
        }
        outcome_to_result(guard.as_ref())
    }

    fn wait_until(&self, deadline: Instant) -> Result<bool> {
        let mut guard = self.outcome.lock();
        while guard.is_none() {
            if self.done.wait_until(&mut guard, deadline).timed_out() && guard.is_none() {
                return Ok(false);
            }
        }
        outcome_to_result(guard.as_ref()).map(|_| true)
    }
}

fn outcome_to_result(outcome: Option<&Outcome>) -> Result<()> {
    match outcome {
        Some(Ok(())) => Ok(()),
        Some(Err(error)) => Err(PhalanxError::Shared(Arc::clone(error))),
        None => Err(PhalanxError::internal("result is not complete")),
    }
}

enum ResultState {
    Completed,
    Failed(Arc<PhalanxError>),
    Pending(Arc<PendingResult>),
    Composite {
        results: Vec<IndexResult>,
        tasks: Mutex<Vec<CompletionTask>>,
    },
}

/// Handle on the eventual completion of one or more operations.
pub struct IndexResult {
    state: ResultState,
}

impl IndexResult {
    /// A result that has already succeeded.
    pub fn completed() -> Self {
        IndexResult {
            state: ResultState::Completed,
        }
    }

    /// A result that has already failed.
    pub fn failed(error: PhalanxError) -> Self {
        Self::failed_shared(Arc::new(error))
    }

    pub(crate) fn failed_shared(error: Arc<PhalanxError>) -> Self {
        IndexResult {
            state: ResultState::Failed(error),
        }
    }

    /// A result completed through `pending`.
    pub fn pending(pending: Arc<PendingResult>) -> Self {
        IndexResult {
            state: ResultState::Pending(pending),
        }
    }

    /// A result that completes when all `results` complete.
    pub fn composite(results: Vec<IndexResult>) -> Self {
        CompositeResultBuilder::new().add_all(results).build()
    }

    /// Block until every constituent write has been applied.
    ///
    /// Returns the first failure. Completion tasks of a composite run once,
    /// after the first successful wait.
    pub fn wait(&self) -> Result<()> {
        match &self.state {
            ResultState::Completed => Ok(()),
            ResultState::Failed(error) => Err(PhalanxError::Shared(Arc::clone(error))),
            ResultState::Pending(pending) => pending.wait(),
            ResultState::Composite { results, tasks } => {
                for result in results {
                    result.wait()?;
                }
                run_tasks(tasks);
                Ok(())
            }
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    ///
    /// Returns `Ok(false)` on timeout; the work stays pending and can be
    /// waited for again.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        self.wait_until(Instant::now() + timeout)
    }

    fn wait_until(&self, deadline: Instant) -> Result<bool> {
        match &self.state {
            ResultState::Completed => Ok(true),
            ResultState::Failed(error) => Err(PhalanxError::Shared(Arc::clone(error))),
            ResultState::Pending(pending) => pending.wait_until(deadline),
            ResultState::Composite { results, tasks } => {
                for result in results {
                    if !result.wait_until(deadline)? {
                        return Ok(false);
                    }
                }
                run_tasks(tasks);
                Ok(true)
            }
        }
    }

    /// Whether the result reached a terminal state.
    pub fn is_done(&self) -> bool {
        match &self.state {
            ResultState::Completed | ResultState::Failed(_) => true,
            ResultState::Pending(pending) => pending.is_done(),
            ResultState::Composite { results, .. } => results.iter().all(IndexResult::is_done),
        }
    }
}

fn run_tasks(tasks: &Mutex<Vec<CompletionTask>>) {
    let tasks = std::mem::take(&mut *tasks.lock());
    for task in tasks {
        task();
    }
}

impl fmt::Debug for IndexResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            ResultState::Completed => f.write_str("IndexResult::Completed"),
            ResultState::Failed(error) => f.debug_tuple("IndexResult::Failed").field(error).finish(),
            ResultState::Pending(pending) => f
                .debug_struct("IndexResult::Pending")
                .field("done", &pending.is_done())
                .finish(),
            ResultState::Composite { results, .. } => f
                .debug_struct("IndexResult::Composite")
                .field("results", &results.len())
                .finish(),
        }
    }
}

/// Accumulates results and completion tasks into one composite result.
#[derive(Default)]
pub struct CompositeResultBuilder {
    results: Vec<IndexResult>,
    tasks: Vec<CompletionTask>,
}

impl CompositeResultBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, result: IndexResult) -> Self {
        self.results.push(result);
        self
    }

    pub fn add_all(mut self, results: Vec<IndexResult>) -> Self {
        self.results.extend(results);
        self
    }

    /// Run `task` once every accumulated result succeeded.
    pub fn add_completion_task<F>(mut self, task: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.tasks.push(Box::new(task));
        self
    }

    pub fn build(self) -> IndexResult {
        IndexResult {
            state: ResultState::Composite {
                results: self.results,
                tasks: Mutex::new(self.tasks),
            },
        }
    }
}
