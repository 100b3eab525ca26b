//! Document structure for schema-less indexing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::document::field_value::FieldValue;
use crate::document::key::Key;
use crate::error::{PhalanxError, Result};

/// A document represents a single item to be indexed.
///
/// Documents are collections of field values in schema-less mode. The engine
/// never looks inside a document except to match it against a [`Key`].
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Document {
    fields: HashMap<String, FieldValue>,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Document {
            fields: HashMap::new(),
        }
    }

    /// Add a field value to the document.
    pub fn add_field<S: Into<String>>(&mut self, name: S, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    /// Get a field value from the document.
    pub fn get_field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Get the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the document is empty.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether this document is addressed by `key`.
    pub fn matches(&self, key: &Key) -> bool {
        self.fields.get(key.field()) == Some(key.value())
    }

    /// Build the key for this document from one of its fields.
    pub fn key(&self, field: &str) -> Option<Key> {
        self.fields
            .get(field)
            .map(|value| Key::new(field, value.clone()))
    }

    /// Build a document from a flat JSON object.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| PhalanxError::invalid_argument("document must be a JSON object"))?;
        let mut doc = Document::new();
        for (name, field) in object {
            doc.add_field(name.clone(), FieldValue::from_json(field));
        }
        Ok(doc)
    }

    /// Create a builder for constructing documents.
    pub fn builder() -> DocumentBuilder {
        DocumentBuilder::new()
    }
}

/// A builder for constructing documents in a fluent manner.
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    document: Document,
}

impl DocumentBuilder {
    /// Create a new document builder.
    pub fn new() -> Self {
        DocumentBuilder {
            document: Document::new(),
        }
    }

    /// Add a text field to the document.
    pub fn add_text<S: Into<String>, T: Into<String>>(mut self, name: S, value: T) -> Self {
        self.document.add_field(name, FieldValue::Text(value.into()));
        self
    }

    /// Add an integer field to the document.
    pub fn add_integer<S: Into<String>>(mut self, name: S, value: i64) -> Self {
        self.document.add_field(name, FieldValue::Integer(value));
        self
    }

    /// Add a field with a generic value.
    pub fn add_field<S: Into<String>>(mut self, name: S, value: FieldValue) -> Self {
        self.document.add_field(name, value);
        self
    }

    /// Build the final document.
    pub fn build(self) -> Document {
        self.document
    }
}
