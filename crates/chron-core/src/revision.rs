//! Revisions and revision types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// One committed unit of work. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub username: Option<String>,
}

/// Why an audit row exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RevisionType {
    #[serde(rename = "INS")]
    Insert,
    #[serde(rename = "UPD")]
    Update,
    #[serde(rename = "DEL")]
    Delete,
}

impl RevisionType {
    /// Value stored in the revision-type column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INS",
            Self::Update => "UPD",
            Self::Delete => "DEL",
        }
    }

    /// All stored values, for constraint generation.
    pub const ALL: [Self; 3] = [Self::Insert, Self::Update, Self::Delete];
}

impl fmt::Display for RevisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevisionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INS" => Ok(Self::Insert),
            "UPD" => Ok(Self::Update),
            "DEL" => Ok(Self::Delete),
            other => Err(CoreError::Validation(format!(
                "unknown revision type '{other}'"
            ))),
        }
    }
}

/// A page of the revision history, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub const DEFAULT_SIZE: u32 = 20;

    /// Page numbers below 1 are clamped to the first page.
    #[must_use]
    pub fn new(number: u32, size: u32) -> Self {
        Self {
            number: number.max(1),
            size: size.max(1),
        }
    }

    #[must_use]
    pub const fn limit(self) -> u32 {
        self.size
    }

    #[must_use]
    pub const fn offset(self) -> u32 {
        self.size.saturating_mul(self.number - 1)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_SIZE)
    }
}
