//! Document identity for updates and deletes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::field_value::FieldValue;
use crate::error::PhalanxError;

/// A field name and value that addresses zero or one documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    field: String,
    value: FieldValue,
}

impl Key {
    pub fn new<S: Into<String>, V: Into<FieldValue>>(field: S, value: V) -> Self {
        Key {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.field, self.value)
    }
}

/// Parses `field=value`. Values that look like integers become integer keys.
impl FromStr for Key {
    type Err = PhalanxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, value) = s
            .split_once('=')
            .ok_or_else(|| PhalanxError::invalid_argument(format!("expected field=value, got '{s}'")))?;
        if field.is_empty() {
            return Err(PhalanxError::invalid_argument("key field must not be empty"));
        }
        let value = match value.parse::<i64>() {
            Ok(i) => FieldValue::Integer(i),
            Err(_) => FieldValue::Text(value.to_string()),
        };
        Ok(Key::new(field, value))
    }
}
