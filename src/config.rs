//! Configuration for index engines, writers and queues.
//!
//! An [`IndexConfiguration`] is built once and then shared immutably (behind
//! an `Arc`) by the engine, the writer adapter and the manager.
//!
//! # Example
//!
//! ```
//! use phalanx::config::{IndexConfiguration, UpdateMode};
//!
//! let config = IndexConfiguration::builder()
//!     .location("/tmp/issues")
//!     .analyzer("english")
//!     .stop_words(vec!["the".to_string(), "a".to_string()])
//!     .build();
//!
//! assert_eq!(config.tuning(UpdateMode::Interactive).merge_factor, 4);
//! assert_eq!(config.tuning(UpdateMode::Batch).merge_factor, 50);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tuning hint for the writer: interactive single-item updates or bulk
/// reindexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    #[default]
    Interactive,
    Batch,
}

impl UpdateMode {
    /// Combine two modes; batch wins over interactive.
    pub fn escalate(self, other: UpdateMode) -> UpdateMode {
        if self == UpdateMode::Batch || other == UpdateMode::Batch {
            UpdateMode::Batch
        } else {
            UpdateMode::Interactive
        }
    }
}

/// What the engine does with the writer after each write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Leave the writer open; changes are committed when a searcher is next
    /// requested.
    None,
    /// Commit after every write.
    #[default]
    Flush,
    /// Close the writer after every write; the next write opens a new one.
    Close,
}

/// Writer settings applied for one [`UpdateMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterTuning {
    /// How many segments are merged at once.
    pub merge_factor: u32,

    /// Largest segment (in documents) that is still considered for merging.
    pub max_merge_docs: u32,

    /// Documents buffered in memory before they are flushed to a segment.
    pub max_buffered_docs: u32,
}

impl WriterTuning {
    pub fn interactive() -> Self {
        WriterTuning {
            merge_factor: 4,
            max_merge_docs: 5000,
            max_buffered_docs: 300,
        }
    }

    pub fn batch() -> Self {
        WriterTuning {
            merge_factor: 50,
            max_merge_docs: u32::MAX,
            max_buffered_docs: 300,
        }
    }
}

/// Text analysis rules handed to the index store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Name of the analyzer chain the store should use.
    pub analyzer: String,

    /// Words dropped during analysis.
    pub stop_words: Vec<String>,

    /// Whether terms are lowercased.
    pub lowercase: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            analyzer: "standard".to_string(),
            stop_words: Vec::new(),
            lowercase: true,
        }
    }
}

/// Immutable description of one logical index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfiguration {
    /// Where the index store keeps its data.
    pub location: PathBuf,

    /// Text analysis rules.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Writer tuning for interactive updates.
    #[serde(default = "WriterTuning::interactive")]
    pub interactive: WriterTuning,

    /// Writer tuning for batch updates.
    #[serde(default = "WriterTuning::batch")]
    pub batch: WriterTuning,
}

impl Default for IndexConfiguration {
    fn default() -> Self {
        IndexConfiguration {
            location: PathBuf::from("index"),
            analysis: AnalysisConfig::default(),
            interactive: WriterTuning::interactive(),
            batch: WriterTuning::batch(),
        }
    }
}

impl IndexConfiguration {
    /// Create a new builder for IndexConfiguration.
    pub fn builder() -> IndexConfigurationBuilder {
        IndexConfigurationBuilder::new()
    }

    /// Writer tuning for the given mode.
    pub fn tuning(&self, mode: UpdateMode) -> &WriterTuning {
        match mode {
            UpdateMode::Interactive => &self.interactive,
            UpdateMode::Batch => &self.batch,
        }
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Serialize the configuration as pretty JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builder for IndexConfiguration.
#[derive(Debug, Default)]
pub struct IndexConfigurationBuilder {
    config: IndexConfiguration,
}

impl IndexConfigurationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn location<P: Into<PathBuf>>(mut self, location: P) -> Self {
        self.config.location = location.into();
        self
    }

    pub fn analyzer<S: Into<String>>(mut self, analyzer: S) -> Self {
        self.config.analysis.analyzer = analyzer.into();
        self
    }

    pub fn stop_words(mut self, stop_words: Vec<String>) -> Self {
        self.config.analysis.stop_words = stop_words;
        self
    }

    pub fn lowercase(mut self, lowercase: bool) -> Self {
        self.config.analysis.lowercase = lowercase;
        self
    }

    pub fn interactive_tuning(mut self, tuning: WriterTuning) -> Self {
        self.config.interactive = tuning;
        self
    }

    pub fn batch_tuning(mut self, tuning: WriterTuning) -> Self {
        self.config.batch = tuning;
        self
    }

    pub fn build(self) -> IndexConfiguration {
        self.config
    }
}

/// Settings of an [`IndexEngine`](crate::engine::IndexEngine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Writer handling after each write.
    pub flush_policy: FlushPolicy,
}

/// Settings of a [`QueueingIndex`](crate::queue::QueueingIndex).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of operations waiting in the queue. Producers block
    /// when it is full.
    pub capacity: usize,

    /// Name of the worker thread.
    pub thread_name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            capacity: 1000,
            thread_name: "phalanx-index-writer".to_string(),
        }
    }
}

impl QueueConfig {
    pub fn new<S: Into<String>>(thread_name: S, capacity: usize) -> Self {
        QueueConfig {
            capacity,
            thread_name: thread_name.into(),
        }
    }
}
