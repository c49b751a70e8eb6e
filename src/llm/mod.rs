//! LLM-backed query capabilities.
//!
//! Two seams the engine consumes: a [`Preprocessor`] that turns a
//! natural-language query into a typed filter bag, and a
//! [`CorrectionOracle`] consulted by the degradation ladder. Both are
//! best-effort collaborators; every failure path degrades to a heuristic
//! or to "no correction available" rather than failing the request.

mod client;
pub mod heuristics;
mod prompts;

pub use client::ChatClient;

use crate::models::{SearchFilters, SourceId};
use crate::{Error, Result};
use serde::Deserialize;
use tracing::warn;

/// Output of query preprocessing.
#[derive(Debug, Clone)]
pub struct PreprocessedQuery {
    /// Extracted filter bag (keywords included).
    pub filters: SearchFilters,
    /// Sources the query should be routed to (empty = all registered).
    pub target_sources: Vec<SourceId>,
    /// The query text after expansion/translation.
    pub expanded_query: String,
}

/// Result of a parameter-correction request.
#[derive(Debug, Clone)]
pub struct Correction {
    /// The corrected filter bag (the original when nothing was corrected).
    pub filters: SearchFilters,
    /// Whether the oracle actually changed anything.
    pub corrected: bool,
    /// Oracle's reasoning, for diagnostics.
    pub reason: String,
}

/// Natural-language-to-filter translation capability.
pub trait Preprocessor: Send + Sync {
    /// Extracts filters, keywords, and routing hints from a query.
    ///
    /// # Errors
    ///
    /// Returns an error if translation fails entirely; the engine then
    /// falls back to heuristic extraction.
    fn preprocess(&self, query: &str) -> Result<PreprocessedQuery>;
}

/// Best-effort parameter correction capability.
pub trait CorrectionOracle: Send + Sync {
    /// Attempts to fix filters a source rejected as invalid.
    ///
    /// # Errors
    ///
    /// Returns an error when the oracle is unreachable; callers treat that
    /// as "no correction available".
    fn correct_parameters(
        &self,
        query: &str,
        filters: &SearchFilters,
        error_text: &str,
    ) -> Result<Correction>;

    /// Expands vague category terms (e.g. "rare earth") into a concrete
    /// element list and returns element-only filters plus the expanded
    /// query text.
    ///
    /// # Errors
    ///
    /// Returns an error when the oracle is unreachable.
    fn relax_to_elements_only(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<(SearchFilters, String)>;
}

/// LLM-backed implementation of both capabilities.
///
/// Falls back to regex heuristics when the model is unreachable or returns
/// unparseable output, so a missing API key never blocks a search.
pub struct LlmQueryAnalyzer {
    client: ChatClient,
}

impl LlmQueryAnalyzer {
    /// Creates an analyzer over the given chat client.
    #[must_use]
    pub const fn new(client: ChatClient) -> Self {
        Self { client }
    }
}

/// Wire shape of the extraction/correction responses.
#[derive(Debug, Deserialize)]
struct ExtractionPayload {
    #[serde(default)]
    expanded_query: Option<String>,
    #[serde(default)]
    filters: SearchFilters,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    target_sources: Vec<String>,
    #[serde(default)]
    corrected: Option<bool>,
    #[serde(default)]
    reason: Option<String>,
}

impl Preprocessor for LlmQueryAnalyzer {
    fn preprocess(&self, query: &str) -> Result<PreprocessedQuery> {
        let user = prompts::extraction_prompt(query);
        match self
            .client
            .complete(prompts::SYSTEM_PROMPT, &user)
            .and_then(|raw| parse_payload(&raw))
        {
            Ok(payload) => {
                let mut filters = payload.filters.normalized();
                if filters.keywords.is_empty() {
                    filters.keywords = payload.keywords;
                }
                Ok(PreprocessedQuery {
                    filters,
                    target_sources: payload.target_sources.into_iter().map(Into::into).collect(),
                    expanded_query: payload
                        .expanded_query
                        .unwrap_or_else(|| query.to_string()),
                })
            }
            Err(err) => {
                warn!("llm preprocessing failed, using heuristics: {err}");
                Ok(heuristics::preprocess(query))
            }
        }
    }
}

impl CorrectionOracle for LlmQueryAnalyzer {
    fn correct_parameters(
        &self,
        query: &str,
        filters: &SearchFilters,
        error_text: &str,
    ) -> Result<Correction> {
        let user = prompts::correction_prompt(query, filters, error_text)?;
        let payload = self
            .client
            .complete(prompts::SYSTEM_PROMPT, &user)
            .and_then(|raw| parse_payload(&raw))?;

        if payload.corrected.unwrap_or(false) {
            Ok(Correction {
                filters: payload.filters.normalized(),
                corrected: true,
                reason: payload
                    .reason
                    .unwrap_or_else(|| "parameters corrected".to_string()),
            })
        } else {
            Ok(Correction {
                filters: filters.clone(),
                corrected: false,
                reason: "correction not available".to_string(),
            })
        }
    }

    fn relax_to_elements_only(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<(SearchFilters, String)> {
        let user = prompts::element_relax_prompt(query, filters)?;
        let payload = self
            .client
            .complete(prompts::SYSTEM_PROMPT, &user)
            .and_then(|raw| parse_payload(&raw))?;

        let relaxed = SearchFilters {
            elements: payload.filters.elements,
            keywords: filters.keywords.clone(),
            ..Default::default()
        }
        .normalized();
        let expanded = payload
            .expanded_query
            .unwrap_or_else(|| query.to_string());
        Ok((relaxed, expanded))
    }
}

fn parse_payload(raw: &str) -> Result<ExtractionPayload> {
    let json = extract_json_from_response(raw);
    serde_json::from_str(json).map_err(|e| Error::OperationFailed {
        operation: "parse_llm_response".to_string(),
        cause: format!("Invalid JSON: {e}. Response: {raw}"),
    })
}

/// Extracts JSON from LLM response, handling markdown code blocks.
fn extract_json_from_response(response: &str) -> &str {
    let trimmed = response.trim();

    // Handle ```json ... ``` blocks
    if let Some(start) = trimmed.find("```json") {
        let json_start = start + 7;
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // Handle ``` ... ``` blocks (without json marker)
    if let Some(start) = trimmed.find("```") {
        let content_start = start + 3;
        let after_marker = &trimmed[content_start..];
        let json_start = after_marker
            .find('{')
            .map_or(content_start, |pos| content_start + pos);
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // Handle raw JSON (find first { to last })
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            return &trimmed[start..=end];
        }
    }

    trimmed
}
