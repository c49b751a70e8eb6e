//! Concurrent fan-out over backend sources.
//!
//! One [`FanoutExecutor::execute`] call dispatches a filter set to every
//! selected source at once and waits for all of them, bounded by per-source
//! and optional whole-round timeouts. Failures are isolated: a source that
//! errors, times out, or panics occupies only its own slot in the outcome's
//! error map while the others proceed.

use super::allocator::{CapacityTable, QuotaPlan};
use crate::config::FanoutConfig;
use crate::models::{OutputFormat, SearchFilters, SourceId, StructureRecord};
use crate::retriever::{Retriever, SourceError};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// The collected outcome of one fan-out round.
///
/// Per-source record lists are kept in dispatch order (which follows source
/// registration order), so downstream quota allocation and interleaving are
/// deterministic.
#[derive(Debug, Default)]
pub struct FanoutOutcome {
    per_source: Vec<(SourceId, Vec<StructureRecord>)>,
    errors: BTreeMap<SourceId, SourceError>,
}

impl FanoutOutcome {
    /// Successful per-source result lists, in dispatch order. A source that
    /// succeeded with zero records is present with an empty list.
    #[must_use]
    pub fn results(&self) -> &[(SourceId, Vec<StructureRecord>)] {
        &self.per_source
    }

    /// Per-source failures. Sources absent from this map succeeded.
    #[must_use]
    pub const fn errors(&self) -> &BTreeMap<SourceId, SourceError> {
        &self.errors
    }

    /// Records returned by one source (empty if it failed or was absent).
    #[must_use]
    pub fn records_for(&self, source: &SourceId) -> &[StructureRecord] {
        self.per_source
            .iter()
            .find(|(id, _)| id == source)
            .map_or(&[], |(_, records)| records.as_slice())
    }

    /// Total records across all sources.
    #[must_use]
    pub fn total_records(&self) -> usize {
        self.per_source.iter().map(|(_, r)| r.len()).sum()
    }

    /// Returns true if at least one failure could be helped by relaxing
    /// filters and retrying.
    #[must_use]
    pub fn has_relaxable_failures(&self) -> bool {
        self.errors.values().any(|e| e.kind.is_relaxable())
    }

    /// Per-source error messages in display form.
    #[must_use]
    pub fn error_summary(&self) -> BTreeMap<SourceId, String> {
        self.errors
            .iter()
            .map(|(id, err)| (id.clone(), err.to_string()))
            .collect()
    }

    /// Truncates each source's record list to its granted quota.
    pub fn apply_plan(&mut self, plan: &QuotaPlan) {
        for (source, records) in &mut self.per_source {
            records.truncate(plan.source_total(source));
        }
    }

    /// Folds another outcome into this one.
    ///
    /// Records are appended per source with identity-based deduplication;
    /// error messages for the same source are concatenated with `"; "`.
    /// Used to combine the per-option rounds of a broadened query.
    pub fn absorb(&mut self, other: Self) {
        for (source, records) in other.per_source {
            let slot = if let Some(pos) = self.per_source.iter().position(|(id, _)| *id == source) {
                &mut self.per_source[pos].1
            } else {
                self.per_source.push((source, Vec::new()));
                let last = self.per_source.len() - 1;
                &mut self.per_source[last].1
            };
            let mut seen: HashSet<_> = slot.iter().map(StructureRecord::identity).collect();
            for record in records {
                if seen.insert(record.identity()) {
                    slot.push(record);
                }
            }
        }
        for (source, err) in other.errors {
            self.errors
                .entry(source)
                .and_modify(|existing| {
                    existing.message = format!("{}; {}", existing.message, err.message);
                })
                .or_insert(err);
        }
    }
}

impl CapacityTable {
    /// Builds a capacity table from observed per-source result counts.
    #[must_use]
    pub fn from_outcome(outcome: &FanoutOutcome) -> Self {
        let mut table = Self::new();
        for (source, records) in outcome.results() {
            table.insert_flat(source.clone(), records.len());
        }
        table
    }
}

/// Dispatches one filter set to N sources concurrently.
#[derive(Debug, Clone, Copy)]
pub struct FanoutExecutor {
    config: FanoutConfig,
}

impl FanoutExecutor {
    /// Creates an executor with the given limits.
    #[must_use]
    pub const fn new(config: FanoutConfig) -> Self {
        Self { config }
    }

    /// Runs one fan-out round: every source receives the same filters and
    /// per-source `limit`, under the per-source timeout.
    ///
    /// Never fails as a whole; per-source failures land in the outcome's
    /// error map. If the optional whole-round budget expires, sources that
    /// have not answered yet are aborted and recorded as network-class
    /// failures.
    pub async fn execute(
        &self,
        sources: &[(SourceId, Arc<dyn Retriever>)],
        filters: &SearchFilters,
        limit: usize,
        format: OutputFormat,
    ) -> FanoutOutcome {
        let mut outcome = FanoutOutcome::default();
        if sources.is_empty() || limit == 0 {
            return outcome;
        }

        let per_source = Duration::from_millis(self.config.per_source_timeout_ms);
        let mut tasks = JoinSet::new();
        let mut task_sources = HashMap::new();

        for (index, (source, retriever)) in sources.iter().enumerate() {
            let source = source.clone();
            let retriever = Arc::clone(retriever);
            let filters = filters.clone();
            let handle = tasks.spawn(async move {
                let fetched = tokio::time::timeout(
                    per_source,
                    retriever.fetch(&filters, limit, format),
                )
                .await;
                let result = match fetched {
                    Ok(result) => result,
                    Err(_) => Err(SourceError::network(format!(
                        "source timed out after {}ms",
                        per_source.as_millis()
                    ))),
                };
                (index, result)
            });
            task_sources.insert(handle.id(), (index, source));
        }

        let mut slots: Vec<Option<Result<Vec<StructureRecord>, SourceError>>> =
            (0..sources.len()).map(|_| None).collect();

        let drain = async {
            while let Some(joined) = tasks.join_next_with_id().await {
                match joined {
                    Ok((id, (index, result))) => {
                        task_sources.remove(&id);
                        slots[index] = Some(result);
                    }
                    Err(join_err) => {
                        // A panicked retriever fails only its own slot.
                        if let Some((index, source)) = task_sources.remove(&join_err.id()) {
                            warn!(source = %source, "retriever task failed: {join_err}");
                            slots[index] = Some(Err(SourceError::new(
                                crate::retriever::ErrorKind::Logic,
                                format!("retriever task failed: {join_err}"),
                            )));
                        }
                    }
                }
            }
        };

        if self.config.round_timeout_ms > 0 {
            let budget = Duration::from_millis(self.config.round_timeout_ms);
            if tokio::time::timeout(budget, drain).await.is_err() {
                // Dropping the JoinSet aborts whatever is still running;
                // mark those sources explicitly below.
                warn!("fan-out round exceeded {}ms budget", budget.as_millis());
            }
        } else {
            drain.await;
        }
        drop(tasks);

        for (index, (source, _)) in sources.iter().enumerate() {
            match slots[index].take() {
                Some(Ok(records)) => {
                    debug!(source = %source, count = records.len(), "source answered");
                    outcome.per_source.push((source.clone(), records));
                }
                Some(Err(err)) => {
                    debug!(source = %source, error = %err, "source failed");
                    outcome.errors.insert(source.clone(), err);
                }
                None => {
                    outcome.errors.insert(
                        source.clone(),
                        SourceError::network(format!(
                            "fan-out round exceeded {}ms budget",
                            self.config.round_timeout_ms
                        )),
                    );
                }
            }
        }
        outcome
    }

    /// Runs one fan-out round per element-set option, all rounds
    /// concurrently, and folds the rounds together.
    ///
    /// Options beyond the configured cap are dropped. Each option runs with
    /// `elements` replaced by the option's set and a per-option budget of
    /// `ceil(limit / options)`, never below one, so a broad query cannot
    /// multiply the total fetch volume unbounded. Outcomes are absorbed in
    /// option order, keeping the merged result deterministic regardless of
    /// which round finishes first.
    pub async fn execute_options(
        &self,
        sources: &[(SourceId, Arc<dyn Retriever>)],
        filters: &SearchFilters,
        limit: usize,
        format: OutputFormat,
    ) -> FanoutOutcome {
        let options: Vec<_> = filters
            .elements_options
            .iter()
            .take(self.config.max_element_options)
            .cloned()
            .collect();
        if options.is_empty() {
            return self.execute(sources, filters, limit, format).await;
        }
        if filters.elements_options.len() > options.len() {
            debug!(
                dropped = filters.elements_options.len() - options.len(),
                "element options capped"
            );
        }

        let per_option = (limit.div_ceil(options.len())).max(1);
        let option_count = options.len();
        let mut rounds = JoinSet::new();
        for (index, elements) in options.into_iter().enumerate() {
            let executor = *self;
            let sources = sources.to_vec();
            let option_filters = SearchFilters {
                elements,
                elements_options: Vec::new(),
                ..filters.clone()
            };
            rounds.spawn(async move {
                let outcome = executor
                    .execute(&sources, &option_filters, per_option, format)
                    .await;
                (index, outcome)
            });
        }

        let mut collected: Vec<Option<FanoutOutcome>> =
            (0..option_count).map(|_| None).collect();
        while let Some(joined) = rounds.join_next().await {
            match joined {
                Ok((index, outcome)) => collected[index] = Some(outcome),
                Err(err) => warn!("option round task failed: {err}"),
            }
        }

        let mut combined = FanoutOutcome::default();
        for outcome in collected.into_iter().flatten() {
            combined.absorb(outcome);
        }
        combined
    }
}
