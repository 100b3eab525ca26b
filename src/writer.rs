//! Writer adapter between index operations and the index store.
//!
//! [`Writer`] is the mutation surface the engine drives; [`IndexWriterAdapter`]
//! implements it on top of a [`StoreWriter`], translating multi-fragment
//! updates and switching writer tuning when the update mode changes.

use std::fmt;
use std::sync::Arc;

use log::{debug, warn};

use crate::config::{IndexConfiguration, UpdateMode};
use crate::document::{Document, Key};
use crate::error::Result;
use crate::store::{IndexStore, StoreWriter};

/// The single live mutator of an index.
pub trait Writer: Send + fmt::Debug {
    /// Add documents.
    fn add_documents(&mut self, documents: Vec<Document>) -> Result<()>;

    /// Replace whatever `key` addresses with `documents`.
    fn update_documents(&mut self, key: &Key, documents: Vec<Document>) -> Result<()>;

    /// Delete whatever `key` addresses.
    fn delete_documents(&mut self, key: &Key) -> Result<()>;

    /// Compact the index. Failures are absorbed.
    fn optimize(&mut self) -> Result<()>;

    /// Switch the writer tuning.
    fn set_mode(&mut self, mode: UpdateMode) -> Result<()>;

    /// Make pending changes visible to newly opened readers.
    fn commit(&mut self) -> Result<()>;

    /// Commit and release the writer. Idempotent.
    fn close(&mut self) -> Result<()>;
}

/// Builds a fresh [`Writer`] for the given mode.
pub type WriterFactory = Box<dyn Fn(UpdateMode) -> Result<Box<dyn Writer>> + Send + Sync>;

/// Default factory: an [`IndexWriterAdapter`] over `store`.
pub fn store_writer_factory(
    store: Arc<dyn IndexStore>,
    configuration: Arc<IndexConfiguration>,
) -> WriterFactory {
    Box::new(move |mode| {
        let adapter = IndexWriterAdapter::open(store.as_ref(), Arc::clone(&configuration), mode)?;
        Ok(Box::new(adapter) as Box<dyn Writer>)
    })
}

/// [`Writer`] implementation over a [`StoreWriter`].
#[derive(Debug)]
pub struct IndexWriterAdapter {
    writer: Box<dyn StoreWriter>,
    configuration: Arc<IndexConfiguration>,
    mode: UpdateMode,
}

impl IndexWriterAdapter {
    /// Open the store writer tuned for `mode`.
    pub fn open(
        store: &dyn IndexStore,
        configuration: Arc<IndexConfiguration>,
        mode: UpdateMode,
    ) -> Result<Self> {
        let writer = store.open_writer(&configuration.analysis, configuration.tuning(mode))?;
        debug!("opened index writer in {mode:?} mode");
        Ok(IndexWriterAdapter {
            writer,
            configuration,
            mode,
        })
    }

    /// The mode whose tuning is in effect.
    pub fn mode(&self) -> UpdateMode {
        self.mode
    }
}

impl Writer for IndexWriterAdapter {
    fn add_documents(&mut self, documents: Vec<Document>) -> Result<()> {
        self.writer.add_documents(documents)
    }

    fn update_documents(&mut self, key: &Key, mut documents: Vec<Document>) -> Result<()> {
        if documents.len() == 1 {
            if let Some(document) = documents.pop() {
                return self.writer.update_document(key, document);
            }
        }
        self.writer.delete_documents(key)?;
        self.writer.add_documents(documents)
    }

    fn delete_documents(&mut self, key: &Key) -> Result<()> {
        self.writer.delete_documents(key)
    }

    fn optimize(&mut self) -> Result<()> {
        if let Err(e) = self.writer.optimize() {
            warn!("index optimize failed: {e}");
        }
        Ok(())
    }

    fn set_mode(&mut self, mode: UpdateMode) -> Result<()> {
        if mode != self.mode {
            self.writer.set_tuning(self.configuration.tuning(mode))?;
            debug!("switched index writer from {:?} to {mode:?}", self.mode);
            self.mode = mode;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.writer.commit()
    }

    fn close(&mut self) -> Result<()> {
        if self.writer.is_closed() {
            return Ok(());
        }
        self.writer.close()
    }
}
