//! Regex fallbacks for filter extraction.
//!
//! Used when no LLM is configured or a call fails; precision is deliberately
//! modest (a capitalized word can look like an element symbol) because these
//! filters only seed ranking and the degradation ladder.

use super::PreprocessedQuery;
use crate::models::SearchFilters;
use once_cell::sync::Lazy;
use regex::Regex;

static FORMULA_RE: Lazy<Regex> = Lazy::new(|| {
    // Two or more element-symbol(+count) groups, e.g. Fe2O3, LiFePO4.
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\b(?:[A-Z][a-z]?\d*){2,}\b").unwrap()
});

static ELEMENT_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"[A-Z][a-z]?").unwrap()
});

/// Extracts a chemical formula from free text, if one is present.
#[must_use]
pub fn extract_formula(query: &str) -> Option<String> {
    FORMULA_RE.find(query).map(|m| m.as_str().to_string())
}

/// Collects candidate element symbols from free text, first occurrence
/// order, deduplicated.
#[must_use]
pub fn extract_elements(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ELEMENT_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|e| seen.insert(e.clone()))
        .collect()
}

/// Heuristic preprocessing: formula + elements + whitespace keywords.
///
/// When a formula is found, elements are parsed from it rather than from
/// the whole query for precision.
#[must_use]
pub fn preprocess(query: &str) -> PreprocessedQuery {
    let formula = extract_formula(query);
    let elements = formula
        .as_deref()
        .map_or_else(|| extract_elements(query), extract_elements);

    let filters = SearchFilters {
        formula,
        elements,
        keywords: query
            .split_whitespace()
            .map(ToString::to_string)
            .collect(),
        ..Default::default()
    }
    .normalized();

    PreprocessedQuery {
        filters,
        target_sources: Vec::new(),
        expanded_query: query.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_formula() {
        assert_eq!(extract_formula("band gap of Fe2O3"), Some("Fe2O3".into()));
        assert_eq!(extract_formula("LiFePO4 cathode"), Some("LiFePO4".into()));
        assert_eq!(extract_formula("perovskite solar cells"), None);
    }

    #[test]
    fn test_extract_elements_dedup_ordered() {
        assert_eq!(extract_elements("Fe2O3"), vec!["Fe", "O"]);
        assert_eq!(extract_elements("LiFePO4"), vec!["Li", "Fe", "P", "O"]);
        // Duplicates collapse to first occurrence.
        assert_eq!(extract_elements("FeO Fe"), vec!["Fe", "O"]);
    }

    #[test]
    fn test_preprocess_prefers_formula_elements() {
        let pre = preprocess("Stable Fe2O3 phases");
        assert_eq!(pre.filters.formula.as_deref(), Some("Fe2O3"));
        // "Stable" would match the element regex; formula parsing wins.
        assert_eq!(pre.filters.elements, vec!["Fe", "O"]);
        assert_eq!(pre.filters.keywords.len(), 3);
        assert!(pre.target_sources.is_empty());
    }

    #[test]
    fn test_preprocess_without_formula() {
        let pre = preprocess("oxides of Ti and V");
        assert!(pre.filters.formula.is_none());
        assert!(pre.filters.elements.contains(&"Ti".to_string()));
        assert!(pre.filters.elements.contains(&"V".to_string()));
    }
}
