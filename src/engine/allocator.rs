//! Fair quota allocation under observed capacity.
//!
//! This module turns "I want K items total" into a per-source (and
//! per-sub-resource) item budget:
//!
//! - [`CapacityTable`]: observed candidate counts per (source, sub-resource)
//! - [`allocate`]: two-level max-min water-filling
//! - [`QuotaPlan`]: the resulting budgets
//!
//! ## Design principles
//!
//! - **Fairness**: equalize across sources first (off by at most 1), then
//!   across sub-resources within a source, respecting capacity caps
//! - **Conservation**: the plan sums to `min(target, total capacity)` —
//!   items are never invented
//! - **Determinism**: pure computation, stable given the table's entry
//!   order (which follows source registration order)

use crate::models::SourceId;
use serde::{Deserialize, Serialize};

/// Sub-resource id used when a source exposes a single queryable endpoint
/// (the common case).
pub const DEFAULT_SUB_RESOURCE: &str = "default";

/// Observed capacity for one sub-resource of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubResourceCapacity {
    /// Sub-resource identifier (endpoint, clause, provider URL, ...).
    pub id: String,
    /// Candidate items available in the current response.
    pub available: usize,
}

/// Observed capacities for one source, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCapacity {
    /// The source.
    pub source: SourceId,
    /// Per-sub-resource capacities.
    pub sub_resources: Vec<SubResourceCapacity>,
}

impl SourceCapacity {
    /// Total capacity across the source's sub-resources.
    #[must_use]
    pub fn total(&self) -> usize {
        self.sub_resources.iter().map(|s| s.available).sum()
    }
}

/// Capacity observed for each (source, sub-resource) pair, in source
/// registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityTable {
    entries: Vec<SourceCapacity>,
}

impl CapacityTable {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Records capacity for a (source, sub-resource) pair.
    ///
    /// New sources and sub-resources are appended in call order; repeated
    /// pairs overwrite the earlier value in place.
    pub fn insert(&mut self, source: impl Into<SourceId>, sub: impl Into<String>, available: usize) {
        let source = source.into();
        let sub = sub.into();
        if let Some(entry) = self.entries.iter_mut().find(|e| e.source == source) {
            if let Some(slot) = entry.sub_resources.iter_mut().find(|s| s.id == sub) {
                slot.available = available;
            } else {
                entry.sub_resources.push(SubResourceCapacity {
                    id: sub,
                    available,
                });
            }
        } else {
            self.entries.push(SourceCapacity {
                source,
                sub_resources: vec![SubResourceCapacity {
                    id: sub,
                    available,
                }],
            });
        }
    }

    /// Records single-sub-resource capacity for a source.
    pub fn insert_flat(&mut self, source: impl Into<SourceId>, available: usize) {
        self.insert(source, DEFAULT_SUB_RESOURCE, available);
    }

    /// The entries in order.
    #[must_use]
    pub fn entries(&self) -> &[SourceCapacity] {
        &self.entries
    }

    /// Total capacity across all sources.
    #[must_use]
    pub fn total(&self) -> usize {
        self.entries.iter().map(SourceCapacity::total).sum()
    }

    /// Returns true if no capacity was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Quota granted to one sub-resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubResourceQuota {
    /// Sub-resource identifier.
    pub id: String,
    /// Items granted (0 ≤ quota ≤ capacity).
    pub quota: usize,
}

/// Quotas granted to one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceQuota {
    /// The source.
    pub source: SourceId,
    /// Per-sub-resource quotas, mirroring the capacity table's order.
    pub sub_resources: Vec<SubResourceQuota>,
}

impl SourceQuota {
    /// Total quota granted to the source.
    #[must_use]
    pub fn total(&self) -> usize {
        self.sub_resources.iter().map(|s| s.quota).sum()
    }
}

/// Per-(source, sub-resource) item budgets.
///
/// Invariant: `total() == min(target, capacity total)` for the table the
/// plan was computed from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPlan {
    entries: Vec<SourceQuota>,
}

impl QuotaPlan {
    /// The entries in order.
    #[must_use]
    pub fn entries(&self) -> &[SourceQuota] {
        &self.entries
    }

    /// Total quota across all sources.
    #[must_use]
    pub fn total(&self) -> usize {
        self.entries.iter().map(SourceQuota::total).sum()
    }

    /// Total quota granted to one source (0 if absent).
    #[must_use]
    pub fn source_total(&self, source: &SourceId) -> usize {
        self.entries
            .iter()
            .find(|e| &e.source == source)
            .map_or(0, SourceQuota::total)
    }

    /// Quota for a (source, sub-resource) pair (0 if absent).
    #[must_use]
    pub fn get(&self, source: &SourceId, sub: &str) -> usize {
        self.entries
            .iter()
            .find(|e| &e.source == source)
            .and_then(|e| e.sub_resources.iter().find(|s| s.id == sub))
            .map_or(0, |s| s.quota)
    }

    /// Returns true if nothing was granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Computes a fair quota plan for `target` items over observed capacities.
///
/// Two-level max-min water-filling:
///
/// 1. Equal split (base + remainder, remainder to earlier sources) across
///    *active* sources, capped by each source's total capacity.
/// 2. Inside each source, the same equal-split step across sub-resources,
///    capped per sub-resource, with intra-source round-robin water-fill
///    over remaining headroom.
/// 3. Budget left over from capacity-capped sources is water-filled across
///    sources, always topping up the source(s) holding the minimum running
///    total first, each granted unit going to that source's sub-resources
///    round-robin.
///
/// Pure and deterministic given the table's entry order. A zero target or
/// an all-zero table yields a plan with zero grants; when total capacity is
/// below the target the plan sums to total capacity.
#[must_use]
pub fn allocate(capacities: &CapacityTable, target: usize) -> QuotaPlan {
    let mut plan = QuotaPlan {
        entries: capacities
            .entries
            .iter()
            .map(|entry| SourceQuota {
                source: entry.source.clone(),
                sub_resources: entry
                    .sub_resources
                    .iter()
                    .map(|sub| SubResourceQuota {
                        id: sub.id.clone(),
                        quota: 0,
                    })
                    .collect(),
            })
            .collect(),
    };

    if target == 0 || capacities.is_empty() {
        return plan;
    }

    // Only sources with nonzero capacity participate.
    let active: Vec<usize> = capacities
        .entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.total() > 0)
        .map(|(i, _)| i)
        .collect();
    if active.is_empty() {
        return plan;
    }

    // Step 1: equal targets across active sources (base + remainder),
    // capped by source capacity. Earlier-registered sources take the +1.
    let base = target / active.len();
    let remainder = target % active.len();
    let mut source_targets = vec![0usize; capacities.entries.len()];
    for (rank, &idx) in active.iter().enumerate() {
        let want = base + usize::from(rank < remainder);
        source_targets[idx] = want.min(capacities.entries[idx].total());
    }

    // Step 2: split each source's target across its sub-resources.
    let mut totals = vec![0usize; capacities.entries.len()];
    for &idx in &active {
        let quota = source_targets[idx];
        if quota == 0 {
            continue;
        }
        let caps: Vec<usize> = capacities.entries[idx]
            .sub_resources
            .iter()
            .map(|s| s.available)
            .collect();
        let assigned = split_within_source(quota, &caps);
        for (slot, granted) in plan.entries[idx].sub_resources.iter_mut().zip(&assigned) {
            slot.quota = *granted;
        }
        totals[idx] = assigned.iter().sum();
    }

    // Step 3: water-fill leftover budget across sources, minimum running
    // total first, preserving registration order among equals.
    let mut remaining = target.saturating_sub(totals.iter().sum());
    let mut cursors = vec![0usize; capacities.entries.len()];
    while remaining > 0 {
        let headroom = |i: usize| capacities.entries[i].total() - totals[i];
        let candidates: Vec<usize> = active.iter().copied().filter(|&i| headroom(i) > 0).collect();
        let Some(min_total) = candidates.iter().map(|&i| totals[i]).min() else {
            break;
        };

        let mut progressed = false;
        for &idx in &candidates {
            if remaining == 0 {
                break;
            }
            if totals[idx] == min_total && give_one(&mut plan.entries[idx], &capacities.entries[idx], &mut cursors[idx])
            {
                totals[idx] += 1;
                remaining -= 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    plan
}

/// Equal split with remainder across sub-resources, capped per
/// sub-resource, then round-robin water-fill over residual headroom.
fn split_within_source(quota: usize, caps: &[usize]) -> Vec<usize> {
    let n = caps.len();
    let base = quota / n;
    let remainder = quota % n;

    let mut assigned: Vec<usize> = caps
        .iter()
        .enumerate()
        .map(|(i, &cap)| (base + usize::from(i < remainder)).min(cap))
        .collect();

    let mut left = quota.saturating_sub(assigned.iter().sum());
    let mut i = 0;
    while left > 0 && assigned.iter().zip(caps).any(|(a, c)| a < c) {
        if assigned[i] < caps[i] {
            assigned[i] += 1;
            left -= 1;
        }
        i = (i + 1) % n;
    }
    assigned
}

/// Grants one unit to the source's next sub-resource with headroom,
/// advancing a round-robin cursor. Returns false when no headroom remains.
fn give_one(quota: &mut SourceQuota, capacity: &SourceCapacity, cursor: &mut usize) -> bool {
    let n = quota.sub_resources.len();
    for step in 0..n {
        let i = (*cursor + step) % n;
        if quota.sub_resources[i].quota < capacity.sub_resources[i].available {
            quota.sub_resources[i].quota += 1;
            *cursor = (i + 1) % n;
            return true;
        }
    }
    false
}
