//! Document module.
//!
//! Documents are produced by the caller (the entity being indexed) and are
//! treated by the engine as opaque bags of fields. A [`Key`] addresses the
//! zero-or-one documents that an update or delete replaces.

#[allow(clippy::module_inception)]
pub mod document;
pub mod field_value;
pub mod key;

// Re-export commonly used types
pub use document::{Document, DocumentBuilder};
pub use field_value::FieldValue;
pub use key::Key;
