//! Directory-backed index store.
//!
//! Documents live in memory (a [`MemoryIndexStore`]) and every commit writes
//! the committed snapshot to `documents.json` in the index directory. The
//! snapshot is written to a temporary file first and then renamed into place.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::{AnalysisConfig, WriterTuning};
use crate::document::{Document, Key};
use crate::error::{PhalanxError, Result};
use crate::store::memory::MemoryIndexStore;
use crate::store::{IndexStore, StoreReader, StoreWriter};

const DOCUMENT_SNAPSHOT_FILE: &str = "documents.json";
const DOCUMENT_SNAPSHOT_TEMP_FILE: &str = "documents.tmp";

/// An index store persisted as a JSON snapshot in a directory.
#[derive(Debug, Clone)]
pub struct FileIndexStore {
    directory: PathBuf,
    memory: MemoryIndexStore,
}

impl FileIndexStore {
    /// Open the store in `directory`, creating the directory if needed and
    /// loading a previously committed snapshot.
    pub fn open<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();

        if !directory.exists() {
            fs::create_dir_all(&directory).map_err(|e| {
                PhalanxError::storage(format!(
                    "Failed to create directory {}: {e}",
                    directory.display()
                ))
            })?;
        }
        if !directory.is_dir() {
            return Err(PhalanxError::storage(format!(
                "Path is not a directory: {}",
                directory.display()
            )));
        }

        let snapshot = directory.join(DOCUMENT_SNAPSHOT_FILE);
        let memory = if snapshot.exists() {
            let bytes = fs::read(&snapshot)?;
            let documents: Vec<Document> = serde_json::from_slice(&bytes)?;
            info!(
                "loaded {} documents from {}",
                documents.len(),
                snapshot.display()
            );
            MemoryIndexStore::with_documents(documents)
        } else {
            MemoryIndexStore::new()
        };

        Ok(FileIndexStore { directory, memory })
    }

    /// The index directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The last committed snapshot.
    pub fn committed_documents(&self) -> std::sync::Arc<Vec<Document>> {
        self.memory.committed_documents()
    }

    fn persist(&self) -> Result<()> {
        persist_snapshot(&self.directory, &self.memory)
    }
}

fn persist_snapshot(directory: &Path, memory: &MemoryIndexStore) -> Result<()> {
    let documents = memory.committed_documents();
    let bytes = serde_json::to_vec(documents.as_slice())?;
    let temp = directory.join(DOCUMENT_SNAPSHOT_TEMP_FILE);
    fs::write(&temp, bytes)?;
    fs::rename(&temp, directory.join(DOCUMENT_SNAPSHOT_FILE))?;
    debug!(
        "persisted {} documents to {}",
        documents.len(),
        directory.display()
    );
    Ok(())
}

impl IndexStore for FileIndexStore {
    fn open_writer(
        &self,
        analysis: &AnalysisConfig,
        tuning: &WriterTuning,
    ) -> Result<Box<dyn StoreWriter>> {
        let inner = self.memory.open_writer(analysis, tuning)?;
        Ok(Box::new(FileStoreWriter {
            inner,
            directory: self.directory.clone(),
            memory: self.memory.clone(),
        }))
    }

    fn open_reader(&self) -> Result<Box<dyn StoreReader>> {
        self.memory.open_reader()
    }

    fn clean(&self) -> Result<()> {
        self.memory.clean()?;
        self.persist()
    }

    fn exists(&self) -> bool {
        self.directory.join(DOCUMENT_SNAPSHOT_FILE).exists()
    }
}

/// Writer of a [`FileIndexStore`]: a memory writer that persists on commit.
#[derive(Debug)]
pub struct FileStoreWriter {
    inner: Box<dyn StoreWriter>,
    directory: PathBuf,
    memory: MemoryIndexStore,
}

impl StoreWriter for FileStoreWriter {
    fn add_document(&mut self, doc: Document) -> Result<()> {
        self.inner.add_document(doc)
    }

    fn add_documents(&mut self, docs: Vec<Document>) -> Result<()> {
        self.inner.add_documents(docs)
    }

    fn update_document(&mut self, key: &Key, doc: Document) -> Result<()> {
        self.inner.update_document(key, doc)
    }

    fn delete_documents(&mut self, key: &Key) -> Result<()> {
        self.inner.delete_documents(key)
    }

    fn commit(&mut self) -> Result<()> {
        self.inner.commit()?;
        persist_snapshot(&self.directory, &self.memory)
    }

    fn optimize(&mut self) -> Result<()> {
        self.inner.optimize()
    }

    fn set_tuning(&mut self, tuning: &WriterTuning) -> Result<()> {
        self.inner.set_tuning(tuning)
    }

    fn close(&mut self) -> Result<()> {
        if self.inner.is_closed() {
            return Ok(());
        }
        self.inner.close()?;
        persist_snapshot(&self.directory, &self.memory)
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
