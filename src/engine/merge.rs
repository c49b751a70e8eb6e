//! Merge, ranking, and bounded selection.
//!
//! The pipeline after quota truncation: interleave per-source lists into
//! one candidate list, score every candidate against the filters, rank by
//! score (stable, so provider-assigned order breaks ties), then select a
//! bounded final list that keeps every contributing source represented
//! when the budget allows.

use crate::models::{SearchFilters, SourceId, StructureRecord};
use std::collections::HashSet;

/// Interleaves per-source result lists round-robin in source order and
/// drops duplicate records (first occurrence wins, identity-based).
///
/// With a single contributing source this is just that source's list. The
/// round-robin start alternates fairly: position k of every source comes
/// before position k+1 of any source.
#[must_use]
pub fn merge(per_source: &[(SourceId, Vec<StructureRecord>)]) -> Vec<StructureRecord> {
    let mut merged = Vec::with_capacity(per_source.iter().map(|(_, r)| r.len()).sum());
    let longest = per_source.iter().map(|(_, r)| r.len()).max().unwrap_or(0);
    for position in 0..longest {
        for (_, records) in per_source {
            if let Some(record) = records.get(position) {
                merged.push(record.clone());
            }
        }
    }

    let mut seen = HashSet::with_capacity(merged.len());
    merged.retain(|record| seen.insert(record.identity()));
    merged
}

/// Scores one record against the filter bag.
///
/// Additive: +2 for a formula match, +2 for a space-group match, +1 per
/// overlapping element, +1 per keyword found in the name and +1 per keyword
/// found in the formula. All text comparisons are case-insensitive.
#[must_use]
pub fn score(record: &StructureRecord, filters: &SearchFilters) -> i64 {
    let mut score = 0;

    if let (Some(want), Some(have)) = (&filters.formula, &record.formula) {
        if want.eq_ignore_ascii_case(have.trim()) {
            score += 2;
        }
    }
    if let (Some(want), Some(have)) = (&filters.space_group, &record.space_group) {
        if want.eq_ignore_ascii_case(have.trim()) {
            score += 2;
        }
    }

    for element in &filters.elements {
        if record
            .elements
            .iter()
            .any(|e| e.eq_ignore_ascii_case(element))
        {
            score += 1;
        }
    }

    let name = record.name.to_lowercase();
    let formula = record.formula.as_deref().unwrap_or("").to_lowercase();
    for keyword in &filters.keywords {
        let keyword = keyword.to_lowercase();
        if name.contains(&keyword) {
            score += 1;
        }
        if !formula.is_empty() && formula.contains(&keyword) {
            score += 1;
        }
    }

    score
}

/// Ranks candidates by descending score.
///
/// The sort is stable, so records with equal scores keep their merged
/// (interleaved) order and cross-source fairness survives ranking.
#[must_use]
pub fn rank(records: Vec<StructureRecord>, filters: &SearchFilters) -> Vec<StructureRecord> {
    let mut scored: Vec<(i64, StructureRecord)> = records
        .into_iter()
        .map(|record| (score(&record, filters), record))
        .collect();
    scored.sort_by_key(|(s, _)| std::cmp::Reverse(*s));
    scored.into_iter().map(|(_, record)| record).collect()
}

/// Selects up to `target` records from a ranked list, keeping every
/// contributing source represented when the budget allows.
///
/// Two passes: first the best-ranked record of each source, walking
/// `source_order` (the requested/registered order) so that a budget below
/// the source count favors earlier sources regardless of rank; then the
/// remaining slots are filled in rank order. The result never exceeds
/// `target`: with more sources than budget, later sources are simply not
/// represented.
#[must_use]
pub fn select(
    ranked: &[StructureRecord],
    target: usize,
    source_order: &[SourceId],
) -> Vec<StructureRecord> {
    if target == 0 || ranked.is_empty() {
        return Vec::new();
    }

    let distinct: HashSet<&SourceId> = ranked.iter().map(|r| &r.source).collect();
    if distinct.len() <= 1 {
        return ranked.iter().take(target).cloned().collect();
    }

    let mut picked: Vec<usize> = Vec::with_capacity(target);
    let mut represented: HashSet<&SourceId> = HashSet::new();
    for source in source_order {
        if picked.len() == target {
            break;
        }
        if represented.contains(source) {
            continue;
        }
        if let Some(best) = ranked.iter().position(|r| &r.source == source) {
            picked.push(best);
            represented.insert(&ranked[best].source);
        }
    }
    // Sources present in the ranking but missing from the given order
    // still get their slot, in first-appearance order.
    for (index, record) in ranked.iter().enumerate() {
        if picked.len() == target {
            break;
        }
        if represented.insert(&record.source) {
            picked.push(index);
        }
    }
    for (index, _) in ranked.iter().enumerate() {
        if picked.len() == target {
            break;
        }
        if !picked.contains(&index) {
            picked.push(index);
        }
    }

    picked.sort_unstable();
    picked.into_iter().map(|i| ranked[i].clone()).collect()
}
