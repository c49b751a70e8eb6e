//! Data models for matfed.
//!
//! This module contains the request/response types and the typed filter bag
//! exchanged between the engine, the retriever seams, and consumers.

mod filter;
mod record;
mod response;
mod source;

pub use filter::{NumericRange, SearchFilters, TimeRange};
pub use record::{RecordIdentity, StructureRecord};
pub use response::{ResponseStatus, SearchRequest, SearchResponse};
pub use source::{OutputFormat, SourceId};
