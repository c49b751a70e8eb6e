//! Retriever capability seam and source registry.
//!
//! A [`Retriever`] is one backend database adapter (REST, SQL, provider
//! federation, ...). The engine treats it as opaque beyond this contract and
//! wraps every call defensively: a retriever that panics, errors, or hangs
//! affects only its own slot in the per-source error map.

use crate::models::{OutputFormat, SearchFilters, SourceId, StructureRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error as ThisError;

/// Classification of a per-source failure.
///
/// Only `NoResults` and `InvalidParams` trigger the degradation ladder;
/// transport and logic faults are recorded but never retried with relaxed
/// filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The query executed and matched nothing.
    NoResults,
    /// The source rejected the filter set.
    InvalidParams,
    /// I/O or timeout failure reaching the source.
    Network,
    /// Unexpected internal fault (e.g. malformed response shape).
    Logic,
    /// Anything that could not be classified.
    Unknown,
}

impl ErrorKind {
    /// Returns true if relaxing filters and retrying could help.
    #[must_use]
    pub const fn is_relaxable(&self) -> bool {
        matches!(self, Self::NoResults | Self::InvalidParams)
    }

    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoResults => "no_results",
            Self::InvalidParams => "invalid_params",
            Self::Network => "network_error",
            Self::Logic => "logic_error",
            Self::Unknown => "unknown",
        }
    }
}

/// A classified failure from one source.
#[derive(Debug, Clone, ThisError, Serialize, Deserialize)]
#[error("[{}] {message}", kind.as_str())]
pub struct SourceError {
    /// Failure classification.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl SourceError {
    /// Creates an error with an explicit classification.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates an error classified from its message text.
    ///
    /// Keyword-based: adapters that cannot classify their own failures get
    /// a best-effort bucket instead of `Unknown` for common cases.
    #[must_use]
    pub fn classified(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = classify_message(&message);
        Self { kind, message }
    }

    /// A network-class error (also used for timeouts).
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// An invalid-parameters error.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }
}

fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    let contains_any = |keys: &[&str]| keys.iter().any(|k| lower.contains(k));

    if contains_any(&["invalid", "validation", "parameter", "format"]) {
        ErrorKind::InvalidParams
    } else if contains_any(&["network", "connection", "timeout", "http", "request"]) {
        ErrorKind::Network
    } else if contains_any(&["logic", "index", "key", "attribute", "type"]) {
        ErrorKind::Logic
    } else {
        ErrorKind::Unknown
    }
}

/// One backend database adapter.
///
/// `fetch` must return at most `limit` normalized records matching the
/// filters. An empty list is a valid success; `NoResults` as an error is
/// reserved for sources that signal emptiness out-of-band.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Fetches up to `limit` records matching `filters`.
    ///
    /// # Errors
    ///
    /// Returns a classified [`SourceError`] on failure. Implementations
    /// should classify their own failures where possible; the engine falls
    /// back to message-based classification otherwise.
    async fn fetch(
        &self,
        filters: &SearchFilters,
        limit: usize,
        format: OutputFormat,
    ) -> Result<Vec<StructureRecord>, SourceError>;
}

/// Ordered registry of backend sources.
///
/// Registration order is significant: it is the deterministic tie-break
/// order for quota allocation and merge interleaving.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    entries: Vec<(SourceId, Arc<dyn Retriever>)>,
}

impl SourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source, replacing any earlier registration of the same
    /// id in place (the original position is kept).
    pub fn register(&mut self, id: impl Into<SourceId>, retriever: Arc<dyn Retriever>) {
        let id = id.into();
        if let Some(slot) = self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            slot.1 = retriever;
        } else {
            self.entries.push((id, retriever));
        }
    }

    /// Returns the retriever registered under `id`, if any.
    #[must_use]
    pub fn get(&self, id: &SourceId) -> Option<Arc<dyn Retriever>> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, r)| Arc::clone(r))
    }

    /// Returns all source ids in registration order.
    #[must_use]
    pub fn ids(&self) -> Vec<SourceId> {
        self.entries.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Returns every registered (id, retriever) pair in registration order.
    #[must_use]
    pub fn all(&self) -> Vec<(SourceId, Arc<dyn Retriever>)> {
        self.entries
            .iter()
            .map(|(id, r)| (id.clone(), Arc::clone(r)))
            .collect()
    }

    /// Returns the registered (id, retriever) pairs for the requested ids,
    /// preserving registration order. Unknown ids are skipped.
    #[must_use]
    pub fn subset(&self, requested: &[SourceId]) -> Vec<(SourceId, Arc<dyn Retriever>)> {
        self.entries
            .iter()
            .filter(|(id, _)| requested.contains(id))
            .map(|(id, r)| (id.clone(), Arc::clone(r)))
            .collect()
    }

    /// Number of registered sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no source is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.ids())
            .finish()
    }
}
