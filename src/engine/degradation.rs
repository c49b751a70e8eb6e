//! Filter relaxation ladder.
//!
//! When a strict search comes back empty, the engine retries with
//! progressively weaker constraints instead of giving up. Each rung is a
//! pure transformation of the original filter bag; ranking keywords are
//! never dropped because they only order results, they never exclude any.

use crate::llm::heuristics;
use crate::models::{SearchFilters, SourceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One rung of the relaxation ladder, strictest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    /// All extracted filters applied as-is.
    Strict,
    /// Strict constraints dropped (numeric windows, time window, space
    /// group); composition filters kept.
    RelaxedNumeric,
    /// Only composition filters (formula and element sets) kept.
    Minimal,
    /// Element-only last resort, with vague category terms expanded into
    /// concrete element lists where an oracle is available.
    ElementRescue,
}

impl DegradationLevel {
    /// The ladder, strictest first.
    pub const ALL: [Self; 4] = [
        Self::Strict,
        Self::RelaxedNumeric,
        Self::Minimal,
        Self::ElementRescue,
    ];

    /// Numeric level (0 = strict).
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Strict => 0,
            Self::RelaxedNumeric => 1,
            Self::Minimal => 2,
            Self::ElementRescue => 3,
        }
    }

    /// The level for a numeric value, if in range.
    #[must_use]
    pub const fn from_u8(level: u8) -> Option<Self> {
        match level {
            0 => Some(Self::Strict),
            1 => Some(Self::RelaxedNumeric),
            2 => Some(Self::Minimal),
            3 => Some(Self::ElementRescue),
            _ => None,
        }
    }

    /// The next weaker rung, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        Self::from_u8(self.as_u8() + 1)
    }

    /// Short label for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::RelaxedNumeric => "relaxed_numeric",
            Self::Minimal => "minimal",
            Self::ElementRescue => "element_rescue",
        }
    }
}

/// Relaxes a filter bag to one rung of the ladder.
///
/// Pure: the input is never mutated, and applying the same level twice
/// yields the same filters. For [`DegradationLevel::ElementRescue`] this is
/// the oracle-free fallback; when the original filters carry no element
/// list, elements are parsed out of the formula.
#[must_use]
pub fn relax(filters: &SearchFilters, level: DegradationLevel) -> SearchFilters {
    match level {
        DegradationLevel::Strict => filters.clone(),
        DegradationLevel::RelaxedNumeric => SearchFilters {
            band_gap: None,
            formation_energy: None,
            time_range: None,
            space_group: None,
            ..filters.clone()
        },
        DegradationLevel::Minimal => SearchFilters {
            formula: filters.formula.clone(),
            elements: filters.elements.clone(),
            elements_options: filters.elements_options.clone(),
            keywords: filters.keywords.clone(),
            ..Default::default()
        },
        DegradationLevel::ElementRescue => {
            let elements = if filters.elements.is_empty() {
                filters
                    .formula
                    .as_deref()
                    .map(heuristics::extract_elements)
                    .unwrap_or_default()
            } else {
                filters.elements.clone()
            };
            SearchFilters {
                elements,
                keywords: filters.keywords.clone(),
                ..Default::default()
            }
            .normalized()
        }
    }
}

/// One recorded retrieval attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradationAttempt {
    /// Ladder rung the attempt ran at.
    pub level: DegradationLevel,
    /// Filters actually sent to the sources.
    pub filters: SearchFilters,
    /// Sources queried.
    pub sources: Vec<SourceId>,
    /// Records retrieved across all sources.
    pub result_count: usize,
    /// Per-source failures for this attempt.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<SourceId, String>,
}

/// Audit trail of every attempt one search made, in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DegradationRecord {
    attempts: Vec<DegradationAttempt>,
}

impl DegradationRecord {
    /// Creates an empty record.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    /// Appends an attempt.
    pub fn push(&mut self, attempt: DegradationAttempt) {
        self.attempts.push(attempt);
    }

    /// The attempts in execution order.
    #[must_use]
    pub fn attempts(&self) -> &[DegradationAttempt] {
        &self.attempts
    }

    /// The deepest level reached (0 when nothing ran).
    #[must_use]
    pub fn final_level(&self) -> u8 {
        self.attempts
            .last()
            .map_or(0, |attempt| attempt.level.as_u8())
    }

    /// Number of attempts made.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    /// Returns true if no attempt ran.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NumericRange;

    fn full_filters() -> SearchFilters {
        SearchFilters::new()
            .with_formula("Fe2O3")
            .with_elements(["Fe", "O"])
            .with_space_group("R-3c")
            .with_band_gap(NumericRange::new(1.0, 3.0))
            .with_keywords(["hematite"])
    }

    #[test]
    fn test_ladder_order() {
        let mut level = DegradationLevel::Strict;
        let mut seen = vec![level];
        while let Some(next) = level.next() {
            seen.push(next);
            level = next;
        }
        assert_eq!(seen, DegradationLevel::ALL);
        assert_eq!(level.as_u8(), 3);
        assert!(level.next().is_none());
    }

    #[test]
    fn test_strict_is_identity() {
        let filters = full_filters();
        assert_eq!(relax(&filters, DegradationLevel::Strict), filters);
    }

    #[test]
    fn test_relaxed_numeric_drops_strict_constraints() {
        let relaxed = relax(&full_filters(), DegradationLevel::RelaxedNumeric);
        assert!(relaxed.band_gap.is_none());
        assert!(relaxed.space_group.is_none());
        // Composition filters survive this rung.
        assert_eq!(relaxed.formula.as_deref(), Some("Fe2O3"));
        assert_eq!(relaxed.elements, vec!["Fe", "O"]);
    }

    #[test]
    fn test_minimal_keeps_composition_only() {
        let relaxed = relax(&full_filters(), DegradationLevel::Minimal);
        assert_eq!(relaxed.formula.as_deref(), Some("Fe2O3"));
        assert_eq!(relaxed.elements, vec!["Fe", "O"]);
        assert!(relaxed.space_group.is_none());
        assert!(relaxed.band_gap.is_none());
        // Ranking keywords survive every rung.
        assert_eq!(relaxed.keywords, vec!["hematite"]);
    }

    #[test]
    fn test_element_rescue_is_elements_only() {
        let relaxed = relax(&full_filters(), DegradationLevel::ElementRescue);
        assert_eq!(relaxed.elements, vec!["Fe", "O"]);
        assert!(relaxed.formula.is_none());
        assert!(relaxed.elements_options.is_empty());
    }

    #[test]
    fn test_element_rescue_derives_from_formula() {
        let filters = SearchFilters::new().with_formula("LiFePO4");
        let relaxed = relax(&filters, DegradationLevel::ElementRescue);
        assert_eq!(relaxed.elements, vec!["Li", "Fe", "P", "O"]);
    }

    #[test]
    fn test_relax_is_idempotent_per_level() {
        let filters = full_filters();
        for level in DegradationLevel::ALL {
            let once = relax(&filters, level);
            let twice = relax(&once, level);
            assert_eq!(once, twice, "level {} not idempotent", level.label());
        }
    }

    #[test]
    fn test_record_tracks_final_level() {
        let mut record = DegradationRecord::new();
        assert_eq!(record.final_level(), 0);
        for level in [DegradationLevel::Strict, DegradationLevel::Minimal] {
            record.push(DegradationAttempt {
                level,
                filters: SearchFilters::new(),
                sources: vec![SourceId::new("alpha")],
                result_count: 0,
                errors: BTreeMap::new(),
            });
        }
        assert_eq!(record.len(), 2);
        assert_eq!(record.final_level(), 2);
    }
}
