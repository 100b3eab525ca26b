//! Command line argument parsing for the Phalanx CLI using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::config::FlushPolicy;

/// Phalanx - maintain a document index from the command line
#[derive(Parser, Debug, Clone)]
#[command(name = "phalanx")]
#[command(about = "Maintain a Phalanx document index")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct PhalanxArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Index configuration file (JSON)
    #[arg(short, long, env = "PHALANX_CONFIG", value_name = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// What to do with the writer after each write
    #[arg(long, default_value = "flush")]
    pub flush_policy: FlushPolicyArg,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl PhalanxArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1, // Default to normal
                n => n,
            }
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Index documents from a JSON-lines file
    Index(IndexArgs),

    /// Delete the documents addressed by a key
    Delete(DeleteArgs),

    /// Count the documents in an index
    Count(IndexPathArgs),

    /// Remove every document from an index
    Clean(IndexPathArgs),

    /// Optimize an index
    Optimize(IndexPathArgs),
}

impl Command {
    /// The index directory the command operates on.
    pub fn index_path(&self) -> &PathBuf {
        match self {
            Command::Index(args) => &args.index_path,
            Command::Delete(args) => &args.index_path,
            Command::Count(args) | Command::Clean(args) | Command::Optimize(args) => {
                &args.index_path
            }
        }
    }
}

/// Arguments for indexing documents
#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// Document file path (JSONL, one object per line)
    #[arg(value_name = "DOCUMENT_FILE")]
    pub document_file: PathBuf,

    /// Field identifying a document; documents are updated instead of added
    #[arg(short, long, value_name = "FIELD")]
    pub key: Option<String>,

    /// Number of documents per write
    #[arg(short, long, default_value = "100")]
    pub batch_size: usize,
}

/// Arguments for deleting documents
#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// Key of the documents to delete, as field=value
    #[arg(short, long, value_name = "FIELD=VALUE")]
    pub key: String,
}

/// Arguments of commands that only need the index
#[derive(Args, Debug, Clone)]
pub struct IndexPathArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,
}

/// Writer flush policy
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushPolicyArg {
    /// Keep changes buffered until they are read
    None,
    /// Commit after every write
    Flush,
    /// Close the writer after every write
    Close,
}

impl From<FlushPolicyArg> for FlushPolicy {
    fn from(arg: FlushPolicyArg) -> Self {
        match arg {
            FlushPolicyArg::None => FlushPolicy::None,
            FlushPolicyArg::Flush => FlushPolicy::Flush,
            FlushPolicyArg::Close => FlushPolicy::Close,
        }
    }
}

/// Output formats for CLI
#[derive(ValueEnum, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}
