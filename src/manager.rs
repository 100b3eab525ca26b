//! Facade tying configuration, engine and index together.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use phalanx::config::{EngineConfig, IndexConfiguration, QueueConfig, UpdateMode};
//! use phalanx::document::{Document, Key};
//! use phalanx::manager::IndexManager;
//! use phalanx::operation::Operation;
//! use phalanx::store::memory::MemoryIndexStore;
//!
//! let manager = IndexManager::queued(
//!     Arc::new(MemoryIndexStore::new()),
//!     Arc::new(IndexConfiguration::default()),
//!     EngineConfig::default(),
//!     QueueConfig::default(),
//! );
//!
//! let doc = Document::builder().add_text("key", "HSP-1").build();
//! manager
//!     .perform(Operation::create(doc, UpdateMode::Interactive))
//!     .unwrap()
//!     .wait()
//!     .unwrap();
//! assert_eq!(manager.num_docs().unwrap(), 1);
//!
//! manager
//!     .perform(Operation::delete(Key::new("key", "HSP-1"), UpdateMode::Interactive))
//!     .unwrap()
//!     .wait()
//!     .unwrap();
//! assert_eq!(manager.num_docs().unwrap(), 0);
//! manager.close().unwrap();
//! ```

use std::sync::Arc;

use log::info;

use crate::config::{EngineConfig, IndexConfiguration, QueueConfig};
use crate::engine::{EngineStats, IndexEngine};
use crate::error::Result;
use crate::index::{CloseableIndex, EngineIndex};
use crate::operation::Operation;
use crate::queue::{QueueStats, QueueingIndex};
use crate::result::IndexResult;
use crate::searcher::Searcher;
use crate::store::IndexStore;

/// Owns one index: its configuration, engine and (optionally queued) index.
pub struct IndexManager {
    configuration: Arc<IndexConfiguration>,
    engine: Arc<IndexEngine>,
    index: Arc<dyn CloseableIndex>,
    queue: Option<Arc<QueueingIndex>>,
}

impl IndexManager {
    /// Writes are applied by a background worker thread.
    pub fn queued(
        store: Arc<dyn IndexStore>,
        configuration: Arc<IndexConfiguration>,
        engine_config: EngineConfig,
        queue_config: QueueConfig,
    ) -> Self {
        let engine = Arc::new(IndexEngine::new(
            store,
            Arc::clone(&configuration),
            engine_config,
        ));
        let queue = Arc::new(QueueingIndex::new(
            Arc::new(EngineIndex::new(Arc::clone(&engine))),
            queue_config,
        ));
        IndexManager {
            configuration,
            engine,
            index: queue.clone(),
            queue: Some(queue),
        }
    }

    /// Writes are applied on the calling thread.
    pub fn simple(
        store: Arc<dyn IndexStore>,
        configuration: Arc<IndexConfiguration>,
        engine_config: EngineConfig,
    ) -> Self {
        let engine = Arc::new(IndexEngine::new(
            store,
            Arc::clone(&configuration),
            engine_config,
        ));
        IndexManager {
            configuration,
            index: Arc::new(EngineIndex::new(Arc::clone(&engine))),
            engine,
            queue: None,
        }
    }

    pub fn configuration(&self) -> &Arc<IndexConfiguration> {
        &self.configuration
    }

    /// The index operations should be submitted to.
    pub fn index(&self) -> Arc<dyn CloseableIndex> {
        Arc::clone(&self.index)
    }

    pub fn engine(&self) -> &Arc<IndexEngine> {
        &self.engine
    }

    /// Submit `operation` to the index.
    pub fn perform(&self, operation: Operation) -> Result<IndexResult> {
        self.index.perform(operation)
    }

    /// Get a searcher over the latest snapshot.
    pub fn open_searcher(&self) -> Result<Searcher> {
        self.engine.get_searcher()
    }

    /// Number of documents visible to a fresh searcher.
    pub fn num_docs(&self) -> Result<u64> {
        self.open_searcher()?.num_docs()
    }

    /// Remove every document from the index.
    pub fn delete_index_directory(&self) -> Result<()> {
        info!(
            "deleting index contents at {}",
            self.configuration.location.display()
        );
        self.engine.clean()
    }

    /// Whether an index has ever been committed to the store.
    pub fn is_index_created(&self) -> bool {
        self.engine.store().exists()
    }

    pub fn engine_stats(&self) -> EngineStats {
        self.engine.stats()
    }

    /// Queue statistics, when writes are queued.
    pub fn queue_stats(&self) -> Option<QueueStats> {
        self.queue.as_ref().map(|queue| queue.stats())
    }

    /// Close the index, applying queued writes first. Idempotent.
    pub fn close(&self) -> Result<()> {
        self.index.close()
    }
}

impl std::fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexManager")
            .field("location", &self.configuration.location)
            .field("engine", &self.engine)
            .field("queued", &self.queue.is_some())
            .finish()
    }
}
