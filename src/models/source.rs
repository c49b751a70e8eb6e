//! Source identifiers and output format tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a backend data source.
///
/// The registered set of sources is ordered; that order is the deterministic
/// tie-break order used by quota allocation and merge interleaving.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Creates a new source identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Output format tag passed through to retrievers.
///
/// Opaque to the engine: it only forwards the tag so adapters can decide
/// which structure-file representation to materialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Crystallographic Information File.
    #[default]
    Cif,
    /// Raw JSON payloads.
    Json,
}

impl OutputFormat {
    /// Returns the format as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cif => "cif",
            Self::Json => "json",
        }
    }

    /// Parses a format string, defaulting to CIF for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Cif,
        }
    }
}
