//! Top-level request/response contract.

use super::{OutputFormat, SourceId, StructureRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A federated search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// The natural-language query text.
    pub query: String,
    /// Requested number of results (clamped to the configured maximum).
    pub n_results: usize,
    /// Output format tag forwarded to retrievers.
    #[serde(default)]
    pub output_format: OutputFormat,
}

impl SearchRequest {
    /// Creates a request with the default output format.
    #[must_use]
    pub fn new(query: impl Into<String>, n_results: usize) -> Self {
        Self {
            query: query.into(),
            n_results,
            output_format: OutputFormat::default(),
        }
    }

    /// Sets the output format.
    #[must_use]
    pub const fn with_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }
}

/// Consumer-visible outcome class of a search.
///
/// The three classes are never conflated: results with clean sources,
/// results despite some source failures, and no results at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// Results found and every queried source answered.
    Success,
    /// Results found despite one or more source errors.
    PartialSuccess,
    /// No results after exhausting all degradation levels.
    NoResults,
}

impl ResponseStatus {
    /// Numeric code kept wire-compatible with legacy consumers.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Success | Self::PartialSuccess => 0,
            Self::NoResults => -9999,
        }
    }

    /// Human-readable status message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::PartialSuccess => "Success (some sources failed)",
            Self::NoResults => "No results",
        }
    }
}

/// The bounded, ordered outcome of a federated search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Final ranked, bounded result list.
    pub results: Vec<StructureRecord>,
    /// Merged result count before truncation to the requested bound.
    pub n_found: usize,
    /// Length of `results`.
    pub returned: usize,
    /// Degradation level that produced the results (maximum level if none).
    pub fallback_level: u8,
    /// The (possibly expanded) query text the engine actually searched.
    pub query_used: String,
    /// Outcome class.
    pub status: ResponseStatus,
    /// Per-source error messages; sources absent from this map succeeded.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<SourceId, String>,
    /// Returned-result count per source.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub by_source: BTreeMap<SourceId, usize>,
    /// Pre-truncation merged count per source.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub by_source_found: BTreeMap<SourceId, usize>,
    /// Artifact file handles produced by external save adapters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl SearchResponse {
    /// Builds an empty `NoResults` response for a query.
    #[must_use]
    pub fn empty(query_used: impl Into<String>, fallback_level: u8) -> Self {
        Self {
            results: Vec::new(),
            n_found: 0,
            returned: 0,
            fallback_level,
            query_used: query_used.into(),
            status: ResponseStatus::NoResults,
            errors: BTreeMap::new(),
            by_source: BTreeMap::new(),
            by_source_found: BTreeMap::new(),
            files: Vec::new(),
        }
    }

    /// Counts records per source.
    #[must_use]
    pub fn count_by_source(records: &[StructureRecord]) -> BTreeMap<SourceId, usize> {
        let mut counts = BTreeMap::new();
        for record in records {
            *counts.entry(record.source.clone()).or_insert(0) += 1;
        }
        counts
    }
}
