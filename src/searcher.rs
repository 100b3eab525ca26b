//! Reference-counted reader snapshots.
//!
//! A [`DelayCloseReader`] wraps one store reader. Any number of [`Searcher`]s
//! may check it out; once the engine has moved on to a newer snapshot it asks
//! the handle to close when done, and the last checkout to be released
//! physically closes the reader.
//!
//! The handle state lives in a single `AtomicU64`:
//!
//! ```text
//! bit 63       closed
//! bit 62       close requested
//! bits 0..=61  number of outstanding checkouts
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::document::{Document, Key};
use crate::error::{PhalanxError, Result};
use crate::store::StoreReader;

const CLOSED: u64 = 1 << 63;
const CLOSE_REQUESTED: u64 = 1 << 62;
const COUNT_MASK: u64 = CLOSE_REQUESTED - 1;

/// Invoked once, right after the reader was physically closed.
pub type ReleaseCallback = Box<dyn FnOnce() + Send + 'static>;

/// A reader snapshot that is closed only once nobody uses it anymore.
pub struct DelayCloseReader {
    reader: Box<dyn StoreReader>,
    state: AtomicU64,
    generation: u64,
    on_release: Mutex<Option<ReleaseCallback>>,
}

impl DelayCloseReader {
    pub fn new(reader: Box<dyn StoreReader>, generation: u64) -> Self {
        DelayCloseReader {
            reader,
            state: AtomicU64::new(0),
            generation,
            on_release: Mutex::new(None),
        }
    }

    /// Like [`new`](Self::new), running `on_release` after the physical close.
    pub fn with_release_callback<F>(reader: Box<dyn StoreReader>, generation: u64, on_release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = Self::new(reader, generation);
        *handle.on_release.lock() = Some(Box::new(on_release));
        handle
    }

    /// Write generation this snapshot was opened at.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of outstanding checkouts.
    pub fn use_count(&self) -> u64 {
        self.state.load(Ordering::Acquire) & COUNT_MASK
    }

    pub fn is_close_requested(&self) -> bool {
        self.state.load(Ordering::Acquire) & CLOSE_REQUESTED != 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) & CLOSED != 0
    }

    /// Check the snapshot out.
    pub fn open(&self) -> Result<()> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current & CLOSED != 0 {
                return Err(PhalanxError::already_closed(format!(
                    "reader snapshot {}",
                    self.generation
                )));
            }
            if current & COUNT_MASK == COUNT_MASK {
                return Err(PhalanxError::resource_exhausted(
                    "too many checkouts of one reader snapshot",
                ));
            }
            match self.state.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Return a checkout.
    ///
    /// Closes the reader if this was the last checkout and a close was
    /// requested. Releasing more often than checked out is an error.
    pub fn release(&self) -> Result<()> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current & COUNT_MASK == 0 {
                return Err(PhalanxError::invalid_operation(format!(
                    "release of reader snapshot {} without checkout",
                    self.generation
                )));
            }
            let mut next = current - 1;
            let close_now = next & COUNT_MASK == 0 && next & CLOSE_REQUESTED != 0;
            if close_now {
                next |= CLOSED;
            }
            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if close_now {
                        self.close_reader();
                    }
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Request the close. The reader is closed immediately if it is not
    /// checked out, otherwise by the last [`release`](Self::release).
    pub fn close_when_done(&self) {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current & (CLOSED | CLOSE_REQUESTED) != 0 {
                return;
            }
            let mut next = current | CLOSE_REQUESTED;
            let close_now = current & COUNT_MASK == 0;
            if close_now {
                next |= CLOSED;
            }
            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if close_now {
                        self.close_reader();
                    }
                    return;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// The wrapped reader.
    pub fn reader(&self) -> &dyn StoreReader {
        self.reader.as_ref()
    }

    // Reached exactly once: only the transition that sets CLOSED gets here.
    fn close_reader(&self) {
        if self.reader.is_closed() {
            debug!("reader snapshot {} was already closed", self.generation);
        } else if let Err(e) = self.reader.close() {
            if e.is_already_closed() {
                debug!("reader snapshot {} was already closed", self.generation);
            } else {
                warn!("failed to close reader snapshot {}: {e}", self.generation);
            }
        } else {
            debug!("closed reader snapshot {}", self.generation);
        }

        if let Some(callback) = self.on_release.lock().take() {
            callback();
        }
    }
}

impl fmt::Debug for DelayCloseReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayCloseReader")
            .field("generation", &self.generation)
            .field("use_count", &self.use_count())
            .field("close_requested", &self.is_close_requested())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A checked-out reader snapshot.
///
/// The checkout is returned by [`close`](Self::close) or when the searcher is
/// dropped.
#[derive(Debug)]
pub struct Searcher {
    handle: Arc<DelayCloseReader>,
    released: bool,
}

impl Searcher {
    /// Check out `handle`.
    pub fn checkout(handle: &Arc<DelayCloseReader>) -> Result<Self> {
        handle.open()?;
        Ok(Searcher {
            handle: Arc::clone(handle),
            released: false,
        })
    }

    /// Write generation of the underlying snapshot.
    pub fn generation(&self) -> u64 {
        self.handle.generation()
    }

    /// Number of documents in the snapshot.
    pub fn num_docs(&self) -> Result<u64> {
        self.reader()?.num_docs()
    }

    /// Documents addressed by `key`.
    pub fn documents(&self, key: &Key) -> Result<Vec<Document>> {
        self.reader()?.documents(key)
    }

    /// Every document of the snapshot.
    pub fn all_documents(&self) -> Result<Vec<Document>> {
        self.reader()?.all_documents()
    }

    /// Return the checkout. Calling it again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.handle.release()
    }

    pub fn is_closed(&self) -> bool {
        self.released
    }

    fn reader(&self) -> Result<&dyn StoreReader> {
        if self.released {
            return Err(PhalanxError::already_closed("searcher"));
        }
        Ok(self.handle.reader())
    }
}

impl Drop for Searcher {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to release searcher: {e}");
        }
    }
}
