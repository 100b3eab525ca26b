//! Command implementations for the Phalanx CLI.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};
use serde_json::Value;

use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::{EngineConfig, IndexConfiguration, QueueConfig, UpdateMode};
use crate::document::{Document, Key};
use crate::error::{PhalanxError, Result};
use crate::manager::IndexManager;
use crate::operation::Operation;
use crate::result::IndexResult;
use crate::store::file::FileIndexStore;

/// Execute a CLI command.
pub fn execute_command(args: PhalanxArgs) -> Result<()> {
    let manager = open_manager(&args)?;

    let outcome = match &args.command {
        Command::Index(index_args) => index_documents(&manager, index_args, &args),
        Command::Delete(delete_args) => delete_documents(&manager, delete_args, &args),
        Command::Count(_) => count_documents(&manager, &args),
        Command::Clean(_) => clean_index(&manager, &args),
        Command::Optimize(_) => optimize_index(&manager, &args),
    };

    let closed = manager.close();
    outcome?;
    closed
}

/// Build the manager for the index the command names.
fn open_manager(args: &PhalanxArgs) -> Result<IndexManager> {
    let mut configuration = match &args.config {
        Some(path) => {
            debug!("loading configuration from {}", path.display());
            IndexConfiguration::from_json_file(path)?
        }
        None => IndexConfiguration::default(),
    };
    configuration.location = args.command.index_path().clone();

    let store = FileIndexStore::open(&configuration.location)?;
    Ok(IndexManager::queued(
        Arc::new(store),
        Arc::new(configuration),
        EngineConfig {
            flush_policy: args.flush_policy.into(),
        },
        QueueConfig::default(),
    ))
}

fn index_path(manager: &IndexManager) -> String {
    manager
        .configuration()
        .location
        .to_string_lossy()
        .to_string()
}

/// Index documents from a JSON-lines file.
fn index_documents(manager: &IndexManager, args: &IndexArgs, cli_args: &PhalanxArgs) -> Result<()> {
    if args.batch_size == 0 {
        return Err(PhalanxError::invalid_argument("batch size must be at least 1"));
    }
    if cli_args.verbosity() > 1 {
        println!("Indexing documents from: {}", args.document_file.display());
    }

    let start_time = Instant::now();
    let reader = BufReader::new(File::open(&args.document_file)?);

    let mut results = Vec::new();
    let mut pending: Vec<Operation> = Vec::new();
    let mut indexed = 0;
    let mut skipped = 0;

    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let document = match serde_json::from_str::<Value>(&line)
            .map_err(PhalanxError::from)
            .and_then(|value| Document::from_json(&value))
        {
            Ok(document) => document,
            Err(e) => {
                warn!("skipping line {}: {e}", line_num + 1);
                skipped += 1;
                continue;
            }
        };

        let operation = match &args.key {
            Some(field) => match document.key(field) {
                Some(key) => Operation::update(key, document, UpdateMode::Batch),
                None => {
                    warn!("skipping line {}: no '{field}' field", line_num + 1);
                    skipped += 1;
                    continue;
                }
            },
            None => Operation::create(document, UpdateMode::Batch),
        };
        pending.push(operation);
        indexed += 1;

        if pending.len() >= args.batch_size {
            results.push(manager.perform(Operation::composite(std::mem::take(&mut pending)))?);
            if cli_args.verbosity() > 1 {
                println!("Queued {indexed} documents...");
            }
        }
    }
    if !pending.is_empty() {
        results.push(manager.perform(Operation::composite(pending))?);
    }

    let writes = results.len();
    IndexResult::composite(results).wait()?;

    let duration = start_time.elapsed();
    output_result(
        "Documents indexed successfully",
        &IndexingResult {
            documents_indexed: indexed,
            documents_skipped: skipped,
            writes,
            duration_ms: duration.as_millis() as u64,
            docs_per_second: indexed as f64 / duration.as_secs_f64().max(f64::EPSILON),
        },
        cli_args,
    )
}

/// Delete the documents addressed by a key.
fn delete_documents(manager: &IndexManager, args: &DeleteArgs, cli_args: &PhalanxArgs) -> Result<()> {
    let key: Key = args.key.parse()?;
    let documents_before = manager.num_docs()?;

    manager
        .perform(Operation::delete(key.clone(), UpdateMode::Interactive))?
        .wait()?;

    output_result(
        "Documents deleted",
        &DeletionResult {
            key: key.to_string(),
            documents_before,
            documents_after: manager.num_docs()?,
        },
        cli_args,
    )
}

/// Count the documents in the index.
fn count_documents(manager: &IndexManager, cli_args: &PhalanxArgs) -> Result<()> {
    if !manager.is_index_created() {
        return Err(PhalanxError::index(format!(
            "no index found at {}",
            index_path(manager)
        )));
    }

    output_result(
        "Index document count",
        &CountResult {
            path: index_path(manager),
            documents: manager.num_docs()?,
        },
        cli_args,
    )
}

/// Remove every document from the index.
fn clean_index(manager: &IndexManager, cli_args: &PhalanxArgs) -> Result<()> {
    let start_time = Instant::now();
    manager.delete_index_directory()?;

    output_result(
        "Index cleaned",
        &MaintenanceResult {
            path: index_path(manager),
            documents: manager.num_docs()?,
            duration_ms: start_time.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}

/// Optimize the index.
fn optimize_index(manager: &IndexManager, cli_args: &PhalanxArgs) -> Result<()> {
    let start_time = Instant::now();
    manager
        .perform(Operation::optimize(UpdateMode::Batch))?
        .wait()?;

    output_result(
        "Index optimized",
        &MaintenanceResult {
            path: index_path(manager),
            documents: manager.num_docs()?,
            duration_ms: start_time.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}
