//! The index abstraction callers submit operations to.

use std::sync::Arc;

use crate::engine::IndexEngine;
use crate::error::Result;
use crate::operation::Operation;
use crate::result::IndexResult;

/// Accepts index operations.
///
/// Misuse (performing on a closed index) is reported through the returned
/// `Result`; failures of the write itself are reported through the
/// [`IndexResult`].
pub trait Index: Send + Sync {
    fn perform(&self, operation: Operation) -> Result<IndexResult>;
}

/// An [`Index`] that owns resources.
pub trait CloseableIndex: Index {
    /// Release the index. Calling it again is a no-op.
    fn close(&self) -> Result<()>;
}

/// Writes synchronously to an [`IndexEngine`].
///
/// The returned result is always complete.
#[derive(Debug, Clone)]
pub struct EngineIndex {
    engine: Arc<IndexEngine>,
}

impl EngineIndex {
    pub fn new(engine: Arc<IndexEngine>) -> Self {
        EngineIndex { engine }
    }

    pub fn engine(&self) -> &Arc<IndexEngine> {
        &self.engine
    }
}

impl Index for EngineIndex {
    fn perform(&self, operation: Operation) -> Result<IndexResult> {
        match self.engine.write(operation) {
            Ok(()) => Ok(IndexResult::completed()),
            Err(e) if e.is_already_closed() && self.engine.is_closed() => Err(e),
            Err(e) => Ok(IndexResult::failed(e)),
        }
    }
}

impl CloseableIndex for EngineIndex {
    fn close(&self) -> Result<()> {
        self.engine.close()
    }
}
