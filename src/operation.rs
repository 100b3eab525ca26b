//! Index mutations.
//!
//! An [`Operation`] describes a change to the index and knows how to apply
//! itself to a [`Writer`]. Operations are plain values: they can be queued,
//! combined into a composite, and applied later on another thread.

use std::fmt;

use crate::config::UpdateMode;
use crate::document::{Document, Key};
use crate::error::Result;
use crate::writer::Writer;

/// Callback run after the write containing an operation succeeded.
pub type CompletionTask = Box<dyn FnOnce() + Send + 'static>;

/// A unit of index mutation.
pub enum Operation {
    /// Add documents.
    Create {
        documents: Vec<Document>,
        mode: UpdateMode,
    },

    /// Replace whatever `key` addresses with `documents`.
    Update {
        key: Key,
        documents: Vec<Document>,
        mode: UpdateMode,
    },

    /// Remove whatever `key` addresses.
    Delete { key: Key, mode: UpdateMode },

    /// Compact the index.
    Optimize { mode: UpdateMode },

    /// Apply `operation`, then run `on_complete` if it succeeded.
    Completion {
        operation: Box<Operation>,
        on_complete: CompletionTask,
    },

    /// Apply several operations in order as one write.
    Composite(Vec<Operation>),
}

impl Operation {
    pub fn create(document: Document, mode: UpdateMode) -> Self {
        Operation::Create {
            documents: vec![document],
            mode,
        }
    }

    pub fn create_many(documents: Vec<Document>, mode: UpdateMode) -> Self {
        Operation::Create { documents, mode }
    }

    pub fn update(key: Key, document: Document, mode: UpdateMode) -> Self {
        Operation::Update {
            key,
            documents: vec![document],
            mode,
        }
    }

    pub fn update_many(key: Key, documents: Vec<Document>, mode: UpdateMode) -> Self {
        Operation::Update {
            key,
            documents,
            mode,
        }
    }

    pub fn delete(key: Key, mode: UpdateMode) -> Self {
        Operation::Delete { key, mode }
    }

    pub fn optimize(mode: UpdateMode) -> Self {
        Operation::Optimize { mode }
    }

    pub fn composite(operations: Vec<Operation>) -> Self {
        Operation::Composite(operations)
    }

    /// Wrap this operation so that `on_complete` runs once it was applied.
    pub fn with_completion<F>(self, on_complete: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Operation::Completion {
            operation: Box::new(self),
            on_complete: Box::new(on_complete),
        }
    }

    /// The writer tuning this operation asks for.
    ///
    /// A composite is batch as soon as one child is batch.
    pub fn mode(&self) -> UpdateMode {
        match self {
            Operation::Create { mode, .. }
            | Operation::Update { mode, .. }
            | Operation::Delete { mode, .. }
            | Operation::Optimize { mode } => *mode,
            Operation::Completion { operation, .. } => operation.mode(),
            Operation::Composite(operations) => operations
                .iter()
                .fold(UpdateMode::Interactive, |mode, op| mode.escalate(op.mode())),
        }
    }

    /// Number of leaf operations.
    pub fn len(&self) -> usize {
        match self {
            Operation::Completion { operation, .. } => operation.len(),
            Operation::Composite(operations) => operations.iter().map(Operation::len).sum(),
            _ => 1,
        }
    }

    /// Whether this is a composite without any leaf operation.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply the operation to `writer`.
    ///
    /// A composite stops at the first failing child. Completion callbacks are
    /// not run here: they are returned in application order, and the caller
    /// runs them once the whole write has been acknowledged.
    pub fn perform(self, writer: &mut dyn Writer) -> Result<Vec<CompletionTask>> {
        let mut completions = Vec::new();
        self.perform_into(writer, &mut completions)?;
        Ok(completions)
    }

    fn perform_into(
        self,
        writer: &mut dyn Writer,
        completions: &mut Vec<CompletionTask>,
    ) -> Result<()> {
        match self {
            Operation::Create { documents, .. } => writer.add_documents(documents),
            Operation::Update { key, documents, .. } => writer.update_documents(&key, documents),
            Operation::Delete { key, .. } => writer.delete_documents(&key),
            Operation::Optimize { .. } => writer.optimize(),
            Operation::Completion {
                operation,
                on_complete,
            } => {
                operation.perform_into(writer, completions)?;
                completions.push(on_complete);
                Ok(())
            }
            Operation::Composite(operations) => {
                for operation in operations {
                    operation.perform_into(writer, completions)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create { documents, mode } => f
                .debug_struct("Create")
                .field("documents", &documents.len())
                .field("mode", mode)
                .finish(),
            Operation::Update {
                key,
                documents,
                mode,
            } => f
                .debug_struct("Update")
                .field("key", key)
                .field("documents", &documents.len())
                .field("mode", mode)
                .finish(),
            Operation::Delete { key, mode } => f
                .debug_struct("Delete")
                .field("key", key)
                .field("mode", mode)
                .finish(),
            Operation::Optimize { mode } => f.debug_struct("Optimize").field("mode", mode).finish(),
            Operation::Completion { operation, .. } => {
                f.debug_tuple("Completion").field(operation).finish()
            }
            Operation::Composite(operations) => f.debug_tuple("Composite").field(operations).finish(),
        }
    }
}
