//! Output formatting for CLI commands.

use serde::{Deserialize, Serialize};

use crate::cli::args::{OutputFormat, PhalanxArgs};
use crate::error::Result;

/// Result structure for document indexing.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexingResult {
    pub documents_indexed: usize,
    pub documents_skipped: usize,
    pub writes: usize,
    pub duration_ms: u64,
    pub docs_per_second: f64,
}

/// Result structure for deletions.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeletionResult {
    pub key: String,
    pub documents_before: u64,
    pub documents_after: u64,
}

/// Result structure for document counts.
#[derive(Debug, Serialize, Deserialize)]
pub struct CountResult {
    pub path: String,
    pub documents: u64,
}

/// Result structure for clean and optimize.
#[derive(Debug, Serialize, Deserialize)]
pub struct MaintenanceResult {
    pub path: String,
    pub documents: u64,
    pub duration_ms: u64,
}

/// Output a result in the requested format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &PhalanxArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

/// Output in human-readable format.
fn output_human<T: Serialize>(message: &str, result: &T, args: &PhalanxArgs) -> Result<()> {
    if args.verbosity() > 0 {
        println!("{message}");
        println!();
    }

    let value = serde_json::to_value(result)?;
    if let Some(obj) = value.as_object() {
        for (key, value) in obj {
            let label = key.replace('_', " ");
            match value {
                serde_json::Value::String(s) => println!("{label}: {s}"),
                serde_json::Value::Number(n) => {
                    if let Some(f) = n.as_f64()
                        && n.is_f64()
                    {
                        println!("{label}: {f:.2}");
                    } else {
                        println!("{label}: {n}");
                    }
                }
                other => println!("{label}: {other}"),
            }
        }
    } else {
        println!("{value}");
    }

    Ok(())
}

/// Output in JSON format.
fn output_json<T: Serialize>(result: &T, args: &PhalanxArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{json}");
    Ok(())
}
