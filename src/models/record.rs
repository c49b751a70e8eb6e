//! Normalized result records.

use super::SourceId;
use serde::{Deserialize, Serialize};

/// A normalized search result from any backend source.
///
/// Fields a source cannot provide are left `None`; the merge and ranking
/// stages only consult fields that are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureRecord {
    /// Human-readable structure name.
    pub name: String,
    /// Opaque handle to a materialized structure file, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure_file: Option<String>,
    /// Chemical formula.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    /// Element symbols present in the structure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<String>,
    /// Space group symbol or number, as text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space_group: Option<String>,
    /// Number of atoms in the cell.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_atoms: Option<u32>,
    /// Band gap in eV.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band_gap: Option<f64>,
    /// Formation energy in eV/atom.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formation_energy: Option<f64>,
    /// The source this record came from.
    pub source: SourceId,
    /// Source-local identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl StructureRecord {
    /// Creates a minimal record with just a name and source.
    #[must_use]
    pub fn new(name: impl Into<String>, source: impl Into<SourceId>) -> Self {
        Self {
            name: name.into(),
            structure_file: None,
            formula: None,
            elements: Vec::new(),
            space_group: None,
            n_atoms: None,
            band_gap: None,
            formation_energy: None,
            source: source.into(),
            id: None,
        }
    }

    /// Sets the source-local identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the chemical formula.
    #[must_use]
    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    /// Sets the element list.
    #[must_use]
    pub fn with_elements<I, S>(mut self, elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.elements = elements.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the space group.
    #[must_use]
    pub fn with_space_group(mut self, space_group: impl Into<String>) -> Self {
        self.space_group = Some(space_group.into());
        self
    }

    /// Dedup identity: (source, id) when the id is non-empty, otherwise
    /// (source, name).
    #[must_use]
    pub fn identity(&self) -> RecordIdentity {
        let local = match self.id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => self.name.as_str(),
        };
        RecordIdentity {
            source: self.source.clone(),
            local: local.to_string(),
        }
    }
}

/// Identity key used for first-occurrence-wins deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordIdentity {
    /// Source the record came from.
    pub source: SourceId,
    /// Source-local id, or the record name when no id is present.
    pub local: String,
}
