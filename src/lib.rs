//! # Matfed
//!
//! A federated search engine for heterogeneous materials databases.
//!
//! Matfed answers one logical search query by querying several independent
//! backend sources in parallel, reconciling their partial (and possibly
//! failing) responses into one bounded, fairly-distributed, ranked result
//! set.
//!
//! ## Features
//!
//! - Concurrent fan-out with per-source failure isolation and timeouts
//! - Two-level max-min (water-filling) quota allocation under observed
//!   per-source capacity
//! - Identity-based dedup, round-robin interleave, and relevance ranking
//!   with guaranteed multi-source representation
//! - Bounded degradation ladder that relaxes filters when a query returns
//!   nothing
//! - Pluggable `Retriever`, `Preprocessor`, and `CorrectionOracle` seams
//!
//! ## Example
//!
//! ```rust,ignore
//! use matfed::{EngineConfig, FederationEngine, SearchRequest};
//!
//! let engine = FederationEngine::new(config, registry, preprocessor, oracle);
//! let response = engine.search(SearchRequest::new("LiFePO4 cathode", 10)).await;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod engine;
pub mod llm;
pub mod models;
pub mod observability;
pub mod retriever;

// Re-exports for convenience
pub use config::{EngineConfig, FanoutConfig, LlmConfig};
pub use engine::{
    CapacityTable, DegradationLevel, DegradationRecord, FanoutExecutor, FanoutOutcome,
    FederationEngine, QuotaPlan, allocate,
};
pub use llm::{CorrectionOracle, PreprocessedQuery, Preprocessor};
pub use models::{
    NumericRange, OutputFormat, ResponseStatus, SearchFilters, SearchRequest, SearchResponse,
    SourceId, StructureRecord, TimeRange,
};
pub use retriever::{ErrorKind, Retriever, SourceError, SourceRegistry};

/// Error type for matfed operations.
///
/// Engine-internal faults only; per-source retrieval failures are carried
/// as [`SourceError`] values in the response error map and never surface
/// through this type once a search round has started.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A configuration file cannot be parsed
    /// - A filter value is structurally malformed (e.g. inverted range)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - Configuration file I/O fails
    /// - An LLM capability call fails and no fallback applies
    /// - The blocking-task bridge to the LLM client is disrupted
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for matfed operations.
pub type Result<T> = std::result::Result<T, Error>;
