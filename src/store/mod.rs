//! Index store abstraction.
//!
//! The store owns the physical index (segments, files, query execution). The
//! engine only needs a small set of primitives from it: a single writer that
//! adds, updates and deletes documents, point-in-time readers, and
//! directory-level cleanup. Implementations:
//!
//! - [`memory::MemoryIndexStore`] keeps everything in memory
//! - [`file::FileIndexStore`] persists committed documents in a directory

pub mod file;
pub mod memory;

use std::fmt;

use crate::config::{AnalysisConfig, WriterTuning};
use crate::document::{Document, Key};
use crate::error::Result;

/// A pluggable index store.
///
/// At most one [`StoreWriter`] may be open at a time; readers are independent
/// snapshots and stay valid after later commits or a [`clean`](Self::clean).
pub trait IndexStore: Send + Sync + fmt::Debug {
    /// Open the single writer of this store.
    fn open_writer(
        &self,
        analysis: &AnalysisConfig,
        tuning: &WriterTuning,
    ) -> Result<Box<dyn StoreWriter>>;

    /// Open a reader over the last committed state.
    fn open_reader(&self) -> Result<Box<dyn StoreReader>>;

    /// Remove every document, leaving an empty index behind.
    fn clean(&self) -> Result<()>;

    /// Whether an index has ever been committed to this store.
    fn exists(&self) -> bool;
}

/// The mutator of an index store.
///
/// Changes become visible to newly opened readers on [`commit`](Self::commit)
/// or [`close`](Self::close).
pub trait StoreWriter: Send + fmt::Debug {
    /// Add a document.
    fn add_document(&mut self, doc: Document) -> Result<()>;

    /// Add several documents in order.
    fn add_documents(&mut self, docs: Vec<Document>) -> Result<()> {
        for doc in docs {
            self.add_document(doc)?;
        }
        Ok(())
    }

    /// Replace the document addressed by `key` with `doc`.
    fn update_document(&mut self, key: &Key, doc: Document) -> Result<()>;

    /// Replace the document addressed by `key` with several fragments.
    fn update_documents(&mut self, key: &Key, docs: Vec<Document>) -> Result<()> {
        self.delete_documents(key)?;
        self.add_documents(docs)
    }

    /// Delete every document addressed by `key`.
    fn delete_documents(&mut self, key: &Key) -> Result<()>;

    /// Make pending changes durable and visible to new readers.
    fn commit(&mut self) -> Result<()>;

    /// Compact the index. Only affects read performance.
    fn optimize(&mut self) -> Result<()>;

    /// Apply new buffering and merge settings.
    fn set_tuning(&mut self, tuning: &WriterTuning) -> Result<()>;

    /// Commit and release the write lock.
    fn close(&mut self) -> Result<()>;

    /// Check if the writer is closed.
    fn is_closed(&self) -> bool;
}

/// A point-in-time view of an index store.
pub trait StoreReader: Send + Sync + fmt::Debug {
    /// Number of live documents in this snapshot.
    fn num_docs(&self) -> Result<u64>;

    /// Documents addressed by `key` in this snapshot.
    fn documents(&self, key: &Key) -> Result<Vec<Document>>;

    /// Every document of this snapshot.
    fn all_documents(&self) -> Result<Vec<Document>>;

    /// Release the reader. Calling it on a closed reader is a no-op.
    fn close(&self) -> Result<()>;

    /// Check if the reader is closed.
    fn is_closed(&self) -> bool;
}
