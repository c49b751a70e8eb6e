//! The provider-agnostic filter bag.
//!
//! Filters are a single typed struct with optional fields for every known
//! constraint plus a raw-query escape hatch. Absent and vacuous values are
//! treated identically: an empty element list, an empty string, or a range
//! with no bounds all count as "filter not present".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An optional-bounded numeric range (e.g. band gap in eV).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NumericRange {
    /// Inclusive lower bound.
    pub min: Option<f64>,
    /// Inclusive upper bound.
    pub max: Option<f64>,
}

impl NumericRange {
    /// Creates a range with both bounds set.
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Returns true if neither bound is set.
    #[must_use]
    pub const fn is_vacuous(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// An optional-bounded time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start of the window.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive end of the window.
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Returns true if neither bound is set.
    #[must_use]
    pub const fn is_vacuous(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Search constraints extracted from a natural-language query.
///
/// Every field is optional; retrievers interpret the subset they support.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    /// Exact chemical formula (e.g. `Fe2O3`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    /// Required element symbols.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<String>,
    /// Alternative element sets for vague categories (e.g. "transition
    /// metal sulfides" broadens to `[S,Ti]`, `[S,V]`, `[S,Mo]`, ...).
    /// Each option is fanned out as its own query and results are merged.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub elements_options: Vec<Vec<String>>,
    /// Space group symbol or number, as text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space_group: Option<String>,
    /// Band gap window in eV.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band_gap: Option<NumericRange>,
    /// Formation energy window in eV/atom.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formation_energy: Option<NumericRange>,
    /// Publication/update time window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    /// Free-text keywords used for ranking.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    /// Raw provider query escape hatch (passed through verbatim).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_query: Option<String>,
}

impl SearchFilters {
    /// Creates an empty filter bag (matches everything).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the formula filter.
    #[must_use]
    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    /// Sets the element filter.
    #[must_use]
    pub fn with_elements<I, S>(mut self, elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.elements = elements.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the space group filter.
    #[must_use]
    pub fn with_space_group(mut self, space_group: impl Into<String>) -> Self {
        self.space_group = Some(space_group.into());
        self
    }

    /// Sets the band gap window.
    #[must_use]
    pub const fn with_band_gap(mut self, range: NumericRange) -> Self {
        self.band_gap = Some(range);
        self
    }

    /// Sets the ranking keywords.
    #[must_use]
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Normalizes vacuous values to their absent form.
    ///
    /// Empty or whitespace-only strings become `None`, blank element
    /// symbols are dropped, and ranges with no bounds are removed, so the
    /// rest of the engine never distinguishes "present but empty" from
    /// "absent".
    #[must_use]
    pub fn normalized(mut self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }

        self.formula = clean(self.formula);
        self.space_group = clean(self.space_group);
        self.raw_query = clean(self.raw_query);
        self.elements.retain(|e| !e.trim().is_empty());
        self.keywords.retain(|k| !k.trim().is_empty());
        self.elements_options = self
            .elements_options
            .into_iter()
            .map(|opt| {
                opt.into_iter()
                    .map(|e| e.trim().to_string())
                    .filter(|e| !e.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|opt| !opt.is_empty())
            .collect();
        self.band_gap = self.band_gap.filter(|r| !r.is_vacuous());
        self.formation_energy = self.formation_energy.filter(|r| !r.is_vacuous());
        self.time_range = self.time_range.filter(|r| !r.is_vacuous());
        self
    }

    /// Returns true if no constraint is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.formula.is_none()
            && self.elements.is_empty()
            && self.elements_options.is_empty()
            && self.space_group.is_none()
            && self.band_gap.is_none()
            && self.formation_energy.is_none()
            && self.time_range.is_none()
            && self.keywords.is_empty()
            && self.raw_query.is_none()
    }
}
