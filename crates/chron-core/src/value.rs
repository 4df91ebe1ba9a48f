//! Scalar field values and their declared types.
//!
//! Everything an audit row can hold is a `FieldValue`. Storage only knows a
//! handful of affinities, so reading a value back goes through
//! [`FieldType::coerce`] to restore what the mapping declared (booleans come
//! back from storage as integers, for example).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared type of a mapped field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Real,
    Text,
    Boolean,
    Timestamp,
    Blob,
}

impl FieldType {
    /// Column affinity used in generated DDL.
    #[must_use]
    pub const fn storage_type(self) -> &'static str {
        match self {
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Real => "REAL",
            Self::Text | Self::Timestamp => "TEXT",
            Self::Blob => "BLOB",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Blob => "blob",
        }
    }

    /// Restore a value read from storage to this declared type.
    #[must_use]
    pub fn coerce(self, value: FieldValue) -> FieldValue {
        match (self, value) {
            (Self::Boolean, FieldValue::Integer(i)) => FieldValue::Boolean(i != 0),
            #[allow(clippy::cast_precision_loss)]
            (Self::Real, FieldValue::Integer(i)) => FieldValue::Real(i as f64),
            (_, other) => other,
        }
    }

    /// Parse a textual identifier component (e.g. from a URL or CLI arg).
    ///
    /// Returns `None` when the text is not a valid literal of this type.
    /// Blobs have no textual form.
    #[must_use]
    pub fn parse(self, raw: &str) -> Option<FieldValue> {
        let raw = raw.trim();
        match self {
            Self::Integer => raw.parse().ok().map(FieldValue::Integer),
            Self::Real => raw.parse().ok().map(FieldValue::Real),
            Self::Text | Self::Timestamp => Some(FieldValue::Text(raw.to_string())),
            Self::Boolean => match raw {
                "true" | "1" => Some(FieldValue::Boolean(true)),
                "false" | "0" => Some(FieldValue::Boolean(false)),
                _ => None,
            },
            Self::Blob => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single scalar column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl FieldValue {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Text(s) => f.write_str(s),
            Self::Blob(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Render a (possibly composite) key the way identifiers are written on the
/// command line: components joined by commas.
#[must_use]
pub fn format_key(key: &[FieldValue]) -> String {
    key.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
