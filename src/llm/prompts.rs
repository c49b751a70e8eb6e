//! Prompt templates for query analysis.

use crate::models::SearchFilters;
use crate::{Error, Result};

/// Shared system prompt for every analysis call.
pub const SYSTEM_PROMPT: &str = "You are a materials database search assistant. \
    Extract, correct, or relax search parameters as asked. \
    Return strict JSON only.";

/// Builds the filter-extraction prompt.
#[must_use]
pub fn extraction_prompt(query: &str) -> String {
    format!(
        r#"Input Query: {query}

Return JSON:
{{
  "expanded_query": "...",
  "filters": {{
    "formula": "...",
    "elements": ["..."],
    "elements_options": [["..."]],
    "space_group": "...",
    "band_gap": {{"min": 0.0, "max": 0.0}},
    "formation_energy": {{"min": 0.0, "max": 0.0}}
  }},
  "keywords": ["..."],
  "target_sources": ["..."]
}}

Omit any filter the query does not constrain. Use "elements_options" only
for vague categories that broaden into several representative element sets."#
    )
}

/// Builds the parameter-correction prompt.
///
/// # Errors
///
/// Returns an error if the current filters cannot be serialized.
pub fn correction_prompt(
    query: &str,
    filters: &SearchFilters,
    error_text: &str,
) -> Result<String> {
    let current = serialize_filters(filters)?;
    Ok(format!(
        r#"Original Query: {query}
Current Parameters: {current}
Error Message: {error_text}

The parameters were rejected by a database. Return JSON:
{{
  "corrected": true,
  "reason": "...",
  "filters": {{ ... same shape as the input parameters ... }}
}}

Set "corrected" to false if the parameters cannot be fixed."#
    ))
}

/// Builds the element-only relaxation prompt.
///
/// # Errors
///
/// Returns an error if the current filters cannot be serialized.
pub fn element_relax_prompt(query: &str, filters: &SearchFilters) -> Result<String> {
    let current = serialize_filters(filters)?;
    Ok(format!(
        r#"Original Query: {query}
Current Parameters: {current}

All stricter searches returned nothing. Expand any vague category terms in
the query (e.g. "rare earth", "transition metal") into concrete element
symbols and return JSON:
{{
  "expanded_query": "...",
  "filters": {{ "elements": ["..."] }}
}}"#
    ))
}

fn serialize_filters(filters: &SearchFilters) -> Result<String> {
    serde_json::to_string(filters).map_err(|e| Error::OperationFailed {
        operation: "serialize_filters".to_string(),
        cause: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_prompts_embed_inputs() {
        let filters = SearchFilters::new().with_formula("Fe2O3");
        assert!(extraction_prompt("iron oxide").contains("iron oxide"));

        let correction = correction_prompt("iron oxide", &filters, "bad space group").unwrap();
        assert!(correction.contains("Fe2O3"));
        assert!(correction.contains("bad space group"));

        let relax = element_relax_prompt("rare earth oxides", &filters).unwrap();
        assert!(relax.contains("rare earth oxides"));
    }
}
