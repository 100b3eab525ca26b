//! # Phalanx
//!
//! An asynchronous search-index engine: one writer mutating an index store,
//! rotating point-in-time reader snapshots, and an optional background queue
//! that serializes writes from many threads.
//!
//! ## Features
//!
//! - Single logical writer with commit/close flush policies
//! - Snapshot isolation for readers with reference-counted delayed close
//! - Bounded write queue drained into composite writes by one worker thread
//! - Recovery from writer and reader resource failures
//! - Pluggable index stores (in-memory and directory-backed)

pub mod cli;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod index;
pub mod manager;
pub mod operation;
pub mod queue;
pub mod result;
pub mod searcher;
pub mod store;
pub mod writer;

pub mod prelude {
    pub use crate::config::{
        EngineConfig, FlushPolicy, IndexConfiguration, QueueConfig, UpdateMode,
    };
    pub use crate::document::{Document, Key};
    pub use crate::engine::IndexEngine;
    pub use crate::error::{PhalanxError, Result};
    pub use crate::index::{CloseableIndex, Index};
    pub use crate::manager::IndexManager;
    pub use crate::operation::Operation;
    pub use crate::result::IndexResult;
    pub use crate::searcher::Searcher;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
