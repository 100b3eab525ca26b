//! The index engine: one writer, rotating reader snapshots.
//!
//! Writes go through a single [`Writer`] guarded by the engine's writer lock.
//! Every write bumps a generation counter; [`IndexEngine::get_searcher`]
//! compares it with the generation of the current snapshot and, when stale,
//! flushes the writer and opens a fresh snapshot. The superseded snapshot is
//! closed once its last searcher is released.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use phalanx::config::{EngineConfig, IndexConfiguration, UpdateMode};
//! use phalanx::document::Document;
//! use phalanx::engine::IndexEngine;
//! use phalanx::operation::Operation;
//! use phalanx::store::memory::MemoryIndexStore;
//!
//! let engine = IndexEngine::new(
//!     Arc::new(MemoryIndexStore::new()),
//!     Arc::new(IndexConfiguration::default()),
//!     EngineConfig::default(),
//! );
//!
//! let doc = Document::builder().add_text("key", "HSP-1").build();
//! engine.write(Operation::create(doc, UpdateMode::Interactive)).unwrap();
//!
//! let searcher = engine.get_searcher().unwrap();
//! assert_eq!(searcher.num_docs().unwrap(), 1);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, FlushPolicy, IndexConfiguration, UpdateMode};
use crate::error::{PhalanxError, Result};
use crate::operation::{CompletionTask, Operation};
use crate::searcher::{DelayCloseReader, Searcher};
use crate::store::IndexStore;
use crate::writer::{Writer, WriterFactory, store_writer_factory};

/// Statistics of an [`IndexEngine`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Number of writes applied successfully.
    pub writes: u64,

    /// Number of writes that failed.
    pub failed_writes: u64,

    /// Number of writers created.
    pub writer_creations: u64,

    /// Number of reader snapshots opened.
    pub snapshots_opened: u64,

    /// Number of reader snapshots not yet physically closed.
    pub open_snapshots: u64,

    /// Current write generation.
    pub generation: u64,

    /// Time of the last write.
    pub last_write_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct EngineCounters {
    writes: AtomicU64,
    failed_writes: AtomicU64,
    writer_creations: AtomicU64,
    snapshots_opened: AtomicU64,
    open_snapshots: AtomicU64,
    last_write_time: Mutex<Option<DateTime<Utc>>>,
}

/// The writer and whether a resource failure left it unusable.
#[derive(Debug, Default)]
struct WriterSlot {
    writer: Option<Box<dyn Writer>>,
    broken: bool,
}

#[derive(Debug, Default)]
struct SnapshotSlot {
    current: Option<Arc<DelayCloseReader>>,
}

/// Coordinates the single writer and the reader snapshots of one index.
pub struct IndexEngine {
    store: Arc<dyn IndexStore>,
    writer_factory: WriterFactory,
    config: EngineConfig,
    writer: Mutex<WriterSlot>,
    snapshot: Mutex<SnapshotSlot>,
    generation: AtomicU64,
    closed: AtomicBool,
    counters: Arc<EngineCounters>,
}

impl IndexEngine {
    /// Create an engine writing through an [`IndexWriterAdapter`](crate::writer::IndexWriterAdapter).
    pub fn new(
        store: Arc<dyn IndexStore>,
        configuration: Arc<IndexConfiguration>,
        config: EngineConfig,
    ) -> Self {
        let factory = store_writer_factory(Arc::clone(&store), configuration);
        Self::with_writer_factory(store, factory, config)
    }

    /// Create an engine whose writers are built by `writer_factory`.
    pub fn with_writer_factory(
        store: Arc<dyn IndexStore>,
        writer_factory: WriterFactory,
        config: EngineConfig,
    ) -> Self {
        IndexEngine {
            store,
            writer_factory,
            config,
            writer: Mutex::new(WriterSlot::default()),
            snapshot: Mutex::new(SnapshotSlot::default()),
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            counters: Arc::new(EngineCounters::default()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The index store.
    pub fn store(&self) -> &Arc<dyn IndexStore> {
        &self.store
    }

    /// Apply `operation` and then the flush policy.
    ///
    /// Returns once the store acknowledged the write. Searchers obtained
    /// afterwards see it; searchers obtained earlier do not. Completion
    /// callbacks inside `operation` run only when the whole write succeeded.
    pub fn write(&self, operation: Operation) -> Result<()> {
        self.check_open()?;

        let mode = operation.mode();
        let mut slot = self.writer.lock();
        let result = self.write_locked(&mut slot, operation, mode);
        self.generation.fetch_add(1, Ordering::AcqRel);
        drop(slot);

        *self.counters.last_write_time.lock() = Some(Utc::now());
        match result {
            Ok(completions) => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
                for on_complete in completions {
                    on_complete();
                }
                Ok(())
            }
            Err(e) => {
                self.counters.failed_writes.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Apply `operation` and the flush policy. Completion callbacks are only
    /// handed back when both succeeded.
    fn write_locked(
        &self,
        slot: &mut WriterSlot,
        operation: Operation,
        mode: UpdateMode,
    ) -> Result<Vec<CompletionTask>> {
        let performed = {
            let writer = self.acquire_writer(slot, mode)?;
            operation.perform(&mut **writer)
        };
        if let Err(e) = &performed {
            Self::mark_if_broken(slot, e);
        }

        match self.config.flush_policy {
            FlushPolicy::None => performed,
            FlushPolicy::Flush => {
                let completions = performed?;
                self.commit_locked(slot)?;
                Ok(completions)
            }
            FlushPolicy::Close => {
                let closed = Self::close_writer(slot);
                let completions = performed?;
                closed?;
                Ok(completions)
            }
        }
    }

    /// Get a searcher over a snapshot reflecting every completed write.
    ///
    /// Concurrent callers share one newly built snapshot.
    pub fn get_searcher(&self) -> Result<Searcher> {
        self.check_open()?;

        let mut slot = self.snapshot.lock();
        let generation = self.generation.load(Ordering::Acquire);
        if let Some(current) = &slot.current {
            if current.generation() == generation {
                return Searcher::checkout(current);
            }
        }

        self.flush_for_read()?;
        let reader = self.store.open_reader()?;

        let counters = Arc::clone(&self.counters);
        let handle = Arc::new(DelayCloseReader::with_release_callback(
            reader,
            generation,
            move || {
                counters.open_snapshots.fetch_sub(1, Ordering::AcqRel);
            },
        ));
        self.counters.snapshots_opened.fetch_add(1, Ordering::Relaxed);
        self.counters.open_snapshots.fetch_add(1, Ordering::AcqRel);
        debug!("opened reader snapshot at generation {generation}");

        let searcher = Searcher::checkout(&handle)?;
        if let Some(previous) = slot.current.replace(handle) {
            previous.close_when_done();
        }
        Ok(searcher)
    }

    fn flush_for_read(&self) -> Result<()> {
        let mut slot = self.writer.lock();
        // `close` may have released the writer since `check_open`.
        self.check_open()?;
        match self.config.flush_policy {
            FlushPolicy::Close => {
                Self::discard_if_broken(&mut slot);
                Self::close_writer(&mut slot)
            }
            FlushPolicy::None | FlushPolicy::Flush => {
                Self::discard_if_broken(&mut slot);
                if slot.writer.is_none() {
                    self.acquire_writer(&mut slot, UpdateMode::Interactive)?;
                }
                self.commit_locked(&mut slot)
            }
        }
    }

    /// Close the writer and remove every document from the store.
    ///
    /// Searchers opened earlier keep their snapshot.
    pub fn clean(&self) -> Result<()> {
        self.check_open()?;

        let mut slot = self.writer.lock();
        self.check_open()?;
        Self::discard_if_broken(&mut slot);
        Self::close_writer(&mut slot)?;
        self.store.clean()?;
        self.generation.fetch_add(1, Ordering::AcqRel);
        info!("cleaned index");
        Ok(())
    }

    /// Close the writer and let the current snapshot close once unused.
    ///
    /// Calling it again is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let closed = {
            let mut slot = self.writer.lock();
            Self::discard_if_broken(&mut slot);
            Self::close_writer(&mut slot)
        };
        if let Some(current) = self.snapshot.lock().current.take() {
            current.close_when_done();
        }
        info!("closed index engine");
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Current write generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Get a copy of the engine statistics.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            writes: self.counters.writes.load(Ordering::Relaxed),
            failed_writes: self.counters.failed_writes.load(Ordering::Relaxed),
            writer_creations: self.counters.writer_creations.load(Ordering::Relaxed),
            snapshots_opened: self.counters.snapshots_opened.load(Ordering::Relaxed),
            open_snapshots: self.counters.open_snapshots.load(Ordering::Acquire),
            generation: self.generation(),
            last_write_time: *self.counters.last_write_time.lock(),
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(PhalanxError::already_closed("index engine"))
        } else {
            Ok(())
        }
    }

    /// The live writer tuned for `mode`, replacing a broken one and creating
    /// it if needed.
    fn acquire_writer<'a>(
        &self,
        slot: &'a mut WriterSlot,
        mode: UpdateMode,
    ) -> Result<&'a mut Box<dyn Writer>> {
        self.check_open()?;
        Self::discard_if_broken(slot);

        if slot.writer.is_none() {
            let writer = (self.writer_factory)(mode)?;
            let created = self.counters.writer_creations.fetch_add(1, Ordering::Relaxed) + 1;
            info!("created index writer #{created} in {mode:?} mode");
            slot.writer = Some(writer);
        } else if let Some(writer) = slot.writer.as_mut() {
            if let Err(e) = writer.set_mode(mode) {
                Self::mark_if_broken(slot, &e);
                return Err(e);
            }
        }

        slot.writer
            .as_mut()
            .ok_or_else(|| PhalanxError::internal("index writer missing after creation"))
    }

    fn commit_locked(&self, slot: &mut WriterSlot) -> Result<()> {
        let Some(writer) = slot.writer.as_mut() else {
            return Ok(());
        };
        let committed = writer.commit();
        if let Err(e) = &committed {
            Self::mark_if_broken(slot, e);
        }
        committed
    }

    fn mark_if_broken(slot: &mut WriterSlot, error: &PhalanxError) {
        if error.is_resource_failure() {
            warn!("index writer is unusable and will be replaced: {error}");
            slot.broken = true;
        }
    }

    /// Close a writer left unusable by a resource failure, ignoring errors.
    fn discard_if_broken(slot: &mut WriterSlot) {
        if !slot.broken {
            return;
        }
        slot.broken = false;
        if let Some(mut writer) = slot.writer.take() {
            if let Err(e) = writer.close() {
                debug!("ignored error closing broken index writer: {e}");
            }
        }
    }

    fn close_writer(slot: &mut WriterSlot) -> Result<()> {
        match slot.writer.take() {
            Some(mut writer) => writer.close(),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for IndexEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexEngine")
            .field("store", &self.store)
            .field("config", &self.config)
            .field("generation", &self.generation())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for IndexEngine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to close index engine on drop: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, Key};
    use crate::store::memory::MemoryIndexStore;

    fn engine(store: &MemoryIndexStore, flush_policy: FlushPolicy) -> IndexEngine {
        IndexEngine::new(
            Arc::new(store.clone()),
            Arc::new(IndexConfiguration::default()),
            EngineConfig { flush_policy },
        )
    }

    fn create(id: i64) -> Operation {
        Operation::create(
            Document::builder().add_integer("id", id).build(),
            UpdateMode::Interactive,
        )
    }

    #[test]
    fn test_searcher_reused_until_write() {
        let store = MemoryIndexStore::new();
        let engine = engine(&store, FlushPolicy::Flush);

        let first = engine.get_searcher().unwrap();
        let second = engine.get_searcher().unwrap();
        assert_eq!(first.generation(), second.generation());
        assert_eq!(engine.stats().snapshots_opened, 1);

        engine.write(create(1)).unwrap();
        let third = engine.get_searcher().unwrap();
        assert_ne!(third.generation(), first.generation());
        assert_eq!(third.num_docs().unwrap(), 1);
        assert_eq!(first.num_docs().unwrap(), 0);
    }

    #[test]
    fn test_superseded_snapshot_closes_after_last_searcher() {
        let store = MemoryIndexStore::new();
        let engine = engine(&store, FlushPolicy::Flush);

        let old = engine.get_searcher().unwrap();
        engine.write(create(1)).unwrap();
        let new = engine.get_searcher().unwrap();
        assert_eq!(engine.stats().open_snapshots, 2);

        drop(old);
        assert_eq!(engine.stats().open_snapshots, 1);
        drop(new);
        assert_eq!(engine.stats().open_snapshots, 1);

        engine.close().unwrap();
        assert_eq!(engine.stats().open_snapshots, 0);
    }

    #[test]
    fn test_flush_policies() {
        let store = MemoryIndexStore::new();
        let none = engine(&store, FlushPolicy::None);
        none.write(create(1)).unwrap();
        assert_eq!(store.stats().commits, 0);
        assert!(store.is_write_locked());
        assert_eq!(none.get_searcher().unwrap().num_docs().unwrap(), 1);
        assert_eq!(store.stats().commits, 1);
        none.close().unwrap();
        assert!(!store.is_write_locked());

        let store = MemoryIndexStore::new();
        let flush = engine(&store, FlushPolicy::Flush);
        flush.write(create(1)).unwrap();
        assert_eq!(store.stats().commits, 1);
        assert!(store.is_write_locked());

        let store = MemoryIndexStore::new();
        let close = engine(&store, FlushPolicy::Close);
        close.write(create(1)).unwrap();
        assert!(!store.is_write_locked());
        close.write(create(2)).unwrap();
        assert_eq!(close.stats().writer_creations, 2);
        assert_eq!(close.get_searcher().unwrap().num_docs().unwrap(), 2);
    }

    #[test]
    fn test_clean_keeps_open_snapshots() {
        let store = MemoryIndexStore::new();
        let engine = engine(&store, FlushPolicy::Flush);
        engine.write(create(1)).unwrap();
        let before = engine.get_searcher().unwrap();

        engine.clean().unwrap();
        assert_eq!(before.num_docs().unwrap(), 1);
        assert_eq!(engine.get_searcher().unwrap().num_docs().unwrap(), 0);
        assert!(store.exists());
    }

    #[test]
    fn test_closed_engine_rejects_calls() {
        let store = MemoryIndexStore::new();
        let engine = engine(&store, FlushPolicy::Flush);
        engine.close().unwrap();
        engine.close().unwrap();

        assert!(engine.write(create(1)).unwrap_err().is_already_closed());
        assert!(engine.get_searcher().unwrap_err().is_already_closed());
        assert!(engine.clean().unwrap_err().is_already_closed());
    }

    #[test]
    fn test_failed_write_is_counted() {
        let store = MemoryIndexStore::new();
        let first = engine(&store, FlushPolicy::Flush);

        // A second writer on the same store cannot take the write lock.
        let other = engine(&store, FlushPolicy::Flush);
        other.write(create(1)).unwrap();
        assert!(first.write(create(2)).is_err());

        let stats = first.stats();
        assert_eq!(stats.writes, 0);
        assert_eq!(stats.failed_writes, 1);
        assert!(stats.last_write_time.is_some());

        other.close().unwrap();
        first.write(create(2)).unwrap();
        assert_eq!(
            first
                .get_searcher()
                .unwrap()
                .documents(&Key::new("id", 2i64))
                .unwrap()
                .len(),
            1
        );
    }
}
