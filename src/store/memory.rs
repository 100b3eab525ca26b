//! In-memory index store for testing and caching.
//!
//! Committed state is an immutable `Arc<Vec<Document>>`. A commit builds a new
//! vector and swaps the pointer, so readers opened earlier keep the exact
//! snapshot they were opened on.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::config::{AnalysisConfig, WriterTuning};
use crate::document::{Document, Key};
use crate::error::{PhalanxError, Result};
use crate::store::{IndexStore, StoreReader, StoreWriter};

/// Counters describing what happened to a memory store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStoreStats {
    /// Number of writers opened.
    pub writers_opened: u64,

    /// Number of readers opened.
    pub readers_opened: u64,

    /// Number of commits (including the implicit commit of `close`).
    pub commits: u64,

    /// Number of optimize calls.
    pub optimizes: u64,

    /// Number of clean calls.
    pub cleans: u64,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    committed: RwLock<Arc<Vec<Document>>>,
    created: AtomicBool,
    write_locked: AtomicBool,
    stats: Mutex<MemoryStoreStats>,
}

/// An in-memory index store.
///
/// Cloning the store yields another handle on the same index.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndexStore {
    inner: Arc<MemoryStoreInner>,
}

impl MemoryIndexStore {
    /// Create a new, empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory store whose committed state is `documents`.
    pub fn with_documents(documents: Vec<Document>) -> Self {
        let store = Self::default();
        *store.inner.committed.write() = Arc::new(documents);
        store.inner.created.store(true, Ordering::SeqCst);
        store
    }

    /// The last committed snapshot.
    pub fn committed_documents(&self) -> Arc<Vec<Document>> {
        self.inner.committed.read().clone()
    }

    /// Whether a writer currently holds the write lock.
    pub fn is_write_locked(&self) -> bool {
        self.inner.write_locked.load(Ordering::SeqCst)
    }

    /// Get a copy of the store counters.
    pub fn stats(&self) -> MemoryStoreStats {
        *self.inner.stats.lock()
    }
}

impl IndexStore for MemoryIndexStore {
    fn open_writer(
        &self,
        analysis: &AnalysisConfig,
        tuning: &WriterTuning,
    ) -> Result<Box<dyn StoreWriter>> {
        if self
            .inner
            .write_locked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PhalanxError::storage("write lock is held by another writer"));
        }
        self.inner.stats.lock().writers_opened += 1;
        debug!(
            "opened memory writer (analyzer={}, merge_factor={})",
            analysis.analyzer, tuning.merge_factor
        );

        Ok(Box::new(MemoryStoreWriter {
            store: Arc::clone(&self.inner),
            pending: Vec::new(),
            tuning: *tuning,
            closed: false,
        }))
    }

    fn open_reader(&self) -> Result<Box<dyn StoreReader>> {
        let docs = self.committed_documents();
        self.inner.stats.lock().readers_opened += 1;
        Ok(Box::new(MemoryStoreReader {
            docs,
            closed: AtomicBool::new(false),
        }))
    }

    fn clean(&self) -> Result<()> {
        if self.is_write_locked() {
            return Err(PhalanxError::storage(
                "cannot clean index while a writer is open",
            ));
        }
        *self.inner.committed.write() = Arc::new(Vec::new());
        self.inner.created.store(true, Ordering::SeqCst);
        self.inner.stats.lock().cleans += 1;
        Ok(())
    }

    fn exists(&self) -> bool {
        self.inner.created.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
enum PendingChange {
    Add(Document),
    Delete(Key),
}

/// Writer of a [`MemoryIndexStore`]. Changes are buffered until commit.
#[derive(Debug)]
pub struct MemoryStoreWriter {
    store: Arc<MemoryStoreInner>,
    pending: Vec<PendingChange>,
    tuning: WriterTuning,
    closed: bool,
}

impl MemoryStoreWriter {
    fn check_closed(&self) -> Result<()> {
        if self.closed {
            Err(PhalanxError::already_closed("memory store writer"))
        } else {
            Ok(())
        }
    }

    /// Settings currently in effect.
    pub fn tuning(&self) -> &WriterTuning {
        &self.tuning
    }

    fn release_lock(&mut self) {
        if !self.closed {
            self.closed = true;
            self.store.write_locked.store(false, Ordering::SeqCst);
        }
    }
}

impl StoreWriter for MemoryStoreWriter {
    fn add_document(&mut self, doc: Document) -> Result<()> {
        self.check_closed()?;
        self.pending.push(PendingChange::Add(doc));
        Ok(())
    }

    fn update_document(&mut self, key: &Key, doc: Document) -> Result<()> {
        self.check_closed()?;
        self.pending.push(PendingChange::Delete(key.clone()));
        self.pending.push(PendingChange::Add(doc));
        Ok(())
    }

    fn delete_documents(&mut self, key: &Key) -> Result<()> {
        self.check_closed()?;
        self.pending.push(PendingChange::Delete(key.clone()));
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.check_closed()?;

        let mut committed = self.store.committed.write();
        let mut docs: Vec<Document> = (**committed).clone();
        for change in self.pending.drain(..) {
            match change {
                PendingChange::Add(doc) => docs.push(doc),
                PendingChange::Delete(key) => docs.retain(|doc| !doc.matches(&key)),
            }
        }
        *committed = Arc::new(docs);
        drop(committed);

        self.store.created.store(true, Ordering::SeqCst);
        self.store.stats.lock().commits += 1;
        Ok(())
    }

    fn optimize(&mut self) -> Result<()> {
        self.check_closed()?;
        self.store.stats.lock().optimizes += 1;
        Ok(())
    }

    fn set_tuning(&mut self, tuning: &WriterTuning) -> Result<()> {
        self.check_closed()?;
        self.tuning = *tuning;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.commit();
        self.release_lock();
        result
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for MemoryStoreWriter {
    fn drop(&mut self) {
        self.release_lock();
    }
}

/// Reader over one committed snapshot of a [`MemoryIndexStore`].
#[derive(Debug)]
pub struct MemoryStoreReader {
    docs: Arc<Vec<Document>>,
    closed: AtomicBool,
}

impl MemoryStoreReader {
    fn check_closed(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(PhalanxError::already_closed("memory store reader"))
        } else {
            Ok(())
        }
    }
}

impl StoreReader for MemoryStoreReader {
    fn num_docs(&self) -> Result<u64> {
        self.check_closed()?;
        Ok(self.docs.len() as u64)
    }

    fn documents(&self, key: &Key) -> Result<Vec<Document>> {
        self.check_closed()?;
        Ok(self
            .docs
            .iter()
            .filter(|doc| doc.matches(key))
            .cloned()
            .collect())
    }

    fn all_documents(&self) -> Result<Vec<Document>> {
        self.check_closed()?;
        Ok((*self.docs).clone())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
