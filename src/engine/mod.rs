//! The federated search engine.
//!
//! [`FederationEngine`] is the single entry point: it preprocesses the
//! query, fans it out over the registered sources, allocates a fair quota
//! over whatever came back, merges and ranks the survivors, and walks a
//! bounded degradation ladder when everything comes back empty. One search
//! never returns an `Err` once an attempt has run; per-source failures are
//! carried in the response's error map instead.

pub mod allocator;
pub mod degradation;
pub mod fanout;
pub mod merge;

pub use allocator::{
    CapacityTable, QuotaPlan, SourceCapacity, SourceQuota, SubResourceCapacity, SubResourceQuota,
    allocate,
};
pub use degradation::{DegradationAttempt, DegradationLevel, DegradationRecord, relax};
pub use fanout::{FanoutExecutor, FanoutOutcome};

use crate::config::EngineConfig;
use crate::llm::{heuristics, ChatClient, CorrectionOracle, LlmQueryAnalyzer, PreprocessedQuery, Preprocessor};
use crate::models::{ResponseStatus, SearchFilters, SearchRequest, SearchResponse, SourceId};
use crate::retriever::{ErrorKind, Retriever, SourceRegistry};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

/// The federated search engine.
///
/// Owns the configuration, the source registry, and the two LLM-backed
/// capability seams. All state is immutable after construction, so the
/// engine is cheap to share behind an `Arc` across request handlers.
pub struct FederationEngine {
    config: EngineConfig,
    registry: SourceRegistry,
    executor: FanoutExecutor,
    preprocessor: Arc<dyn Preprocessor>,
    oracle: Arc<dyn CorrectionOracle>,
}

impl FederationEngine {
    /// Creates an engine with explicit capability implementations.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        registry: SourceRegistry,
        preprocessor: Arc<dyn Preprocessor>,
        oracle: Arc<dyn CorrectionOracle>,
    ) -> Self {
        let executor = FanoutExecutor::new(config.fanout);
        Self {
            config,
            registry,
            executor,
            preprocessor,
            oracle,
        }
    }

    /// Creates an engine whose preprocessor and correction oracle are both
    /// backed by the configured LLM endpoint.
    ///
    /// With no API key configured the analyzer degrades to regex
    /// heuristics, so this constructor is always safe to use.
    #[must_use]
    pub fn with_llm(config: EngineConfig, registry: SourceRegistry) -> Self {
        let analyzer = Arc::new(LlmQueryAnalyzer::new(ChatClient::from_config(&config.llm)));
        let preprocessor: Arc<dyn Preprocessor> = analyzer.clone();
        let oracle: Arc<dyn CorrectionOracle> = analyzer;
        Self::new(config, registry, preprocessor, oracle)
    }

    /// The engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The registered sources.
    #[must_use]
    pub const fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Runs one federated search.
    ///
    /// Never fails: invalid input yields an empty `NoResults` response and
    /// per-source failures are reported in the response's error map.
    pub async fn search(&self, request: SearchRequest) -> SearchResponse {
        self.search_detailed(request).await.0
    }

    /// Runs one federated search and returns the attempt-by-attempt audit
    /// trail alongside the response.
    pub async fn search_detailed(
        &self,
        request: SearchRequest,
    ) -> (SearchResponse, DegradationRecord) {
        let query = request.query.trim().to_string();
        if query.is_empty() {
            debug!("empty query, skipping fan-out");
            return (SearchResponse::empty("", 0), DegradationRecord::new());
        }
        let target = self.config.normalize_n_results(request.n_results);

        let pre = self.preprocess(&query).await;
        let mut query_used = pre.expanded_query.clone();

        let sources = self.select_sources(&pre);
        if sources.is_empty() {
            warn!("no sources registered, returning empty response");
            return (SearchResponse::empty(query_used, 0), DegradationRecord::new());
        }
        let source_ids: Vec<SourceId> = sources.iter().map(|(id, _)| id.clone()).collect();

        info!(
            query = %query,
            target,
            sources = sources.len(),
            "starting federated search"
        );

        let base = pre.filters;
        let mut record = DegradationRecord::new();
        let mut corrected_once = false;
        let mut outcome_and_filters: Option<(FanoutOutcome, SearchFilters)> = None;
        let max_level = self.config.max_degradation_level.min(3);

        let mut level_value = 0u8;
        while level_value <= max_level {
            let Some(level) = DegradationLevel::from_u8(level_value) else {
                break;
            };
            let filters = if level == DegradationLevel::ElementRescue {
                let (filters, expanded) = self.element_rescue(&query, &base).await;
                if let Some(expanded) = expanded {
                    query_used = expanded;
                }
                filters
            } else {
                relax(&base, level)
            };

            debug!(level = level.label(), "running retrieval attempt");
            let mut outcome = self
                .executor
                .execute_options(&sources, &filters, target, request.output_format)
                .await;
            record.push(Self::attempt(level, &filters, &source_ids, &outcome));

            if outcome.total_records() > 0 {
                outcome_and_filters = Some((outcome, filters));
                break;
            }

            // One parameter-correction retry per search, at the level
            // where a source first rejected the filters.
            if !corrected_once && has_invalid_params(&outcome) {
                if let Some(corrected) = self.correct(&query, &filters, &outcome).await {
                    corrected_once = true;
                    let retry = self
                        .executor
                        .execute_options(&sources, &corrected, target, request.output_format)
                        .await;
                    record.push(Self::attempt(level, &corrected, &source_ids, &retry));
                    if retry.total_records() > 0 {
                        outcome_and_filters = Some((retry, corrected));
                        break;
                    }
                    outcome = retry;
                }
            }

            // Escalating only helps when some source ran out of matches or
            // rejected the filters; pure transport/logic failures will fail
            // the same way with weaker filters.
            let retry_could_help =
                !outcome.results().is_empty() || outcome.has_relaxable_failures();
            outcome_and_filters = Some((outcome, filters));
            if !retry_could_help {
                debug!("no relaxable failures, stopping degradation ladder");
                break;
            }
            level_value += 1;
        }

        let fallback_level = record.final_level();
        let Some((mut outcome, filters_used)) = outcome_and_filters else {
            return (SearchResponse::empty(query_used, fallback_level), record);
        };

        let by_source_found: BTreeMap<SourceId, usize> = outcome
            .results()
            .iter()
            .map(|(id, records)| (id.clone(), records.len()))
            .collect();

        let capacities = CapacityTable::from_outcome(&outcome);
        let plan = allocate(&capacities, target);
        outcome.apply_plan(&plan);

        let merged = merge::merge(outcome.results());
        let n_found = merged.len();
        let ranked = merge::rank(merged, &filters_used);
        let results = merge::select(&ranked, target, &source_ids);

        let status = if results.is_empty() {
            ResponseStatus::NoResults
        } else if outcome.errors().is_empty() {
            ResponseStatus::Success
        } else {
            ResponseStatus::PartialSuccess
        };

        let files: Vec<String> = results
            .iter()
            .filter_map(|r| r.structure_file.clone())
            .collect();
        let by_source = SearchResponse::count_by_source(&results);
        let returned = results.len();

        info!(
            status = status.message(),
            returned,
            n_found,
            fallback_level,
            "federated search finished"
        );

        let response = SearchResponse {
            results,
            n_found,
            returned,
            fallback_level,
            query_used,
            status,
            errors: outcome.error_summary(),
            by_source,
            by_source_found,
            files,
        };
        (response, record)
    }

    /// Preprocesses the query on the blocking pool, falling back to regex
    /// heuristics if the preprocessor errors or the bridge task fails.
    async fn preprocess(&self, query: &str) -> PreprocessedQuery {
        let preprocessor = Arc::clone(&self.preprocessor);
        let owned = query.to_string();
        match spawn_blocking(move || preprocessor.preprocess(&owned)).await {
            Ok(Ok(pre)) => pre,
            Ok(Err(err)) => {
                warn!("query preprocessing failed, using heuristics: {err}");
                heuristics::preprocess(query)
            }
            Err(err) => {
                warn!("preprocessing task failed, using heuristics: {err}");
                heuristics::preprocess(query)
            }
        }
    }

    /// Resolves the sources to query: the preprocessor's routing hints when
    /// they match registered sources, otherwise everything registered.
    fn select_sources(&self, pre: &PreprocessedQuery) -> Vec<(SourceId, Arc<dyn Retriever>)> {
        if pre.target_sources.is_empty() {
            return self.registry.all();
        }
        let subset = self.registry.subset(&pre.target_sources);
        if subset.is_empty() {
            debug!("routing hints matched no registered source, querying all");
            self.registry.all()
        } else {
            subset
        }
    }

    /// Builds element-rescue filters, preferring the oracle's category
    /// expansion over the oracle-free fallback.
    async fn element_rescue(
        &self,
        query: &str,
        base: &SearchFilters,
    ) -> (SearchFilters, Option<String>) {
        let oracle = Arc::clone(&self.oracle);
        let owned_query = query.to_string();
        let owned_base = base.clone();
        match spawn_blocking(move || oracle.relax_to_elements_only(&owned_query, &owned_base)).await
        {
            Ok(Ok((filters, expanded))) if !filters.elements.is_empty() => {
                (filters, Some(expanded))
            }
            Ok(Ok(_)) => (relax(base, DegradationLevel::ElementRescue), None),
            Ok(Err(err)) => {
                debug!("element expansion unavailable: {err}");
                (relax(base, DegradationLevel::ElementRescue), None)
            }
            Err(err) => {
                warn!("element expansion task failed: {err}");
                (relax(base, DegradationLevel::ElementRescue), None)
            }
        }
    }

    /// Asks the oracle to fix rejected filters. Returns the corrected
    /// filters only when the oracle actually changed something.
    async fn correct(
        &self,
        query: &str,
        filters: &SearchFilters,
        outcome: &FanoutOutcome,
    ) -> Option<SearchFilters> {
        let error_text: String = outcome
            .errors()
            .values()
            .filter(|e| e.kind == ErrorKind::InvalidParams)
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");

        let oracle = Arc::clone(&self.oracle);
        let owned_query = query.to_string();
        let owned_filters = filters.clone();
        match spawn_blocking(move || {
            oracle.correct_parameters(&owned_query, &owned_filters, &error_text)
        })
        .await
        {
            Ok(Ok(correction)) if correction.corrected => {
                debug!(reason = %correction.reason, "applying parameter correction");
                Some(correction.filters)
            }
            Ok(Ok(_)) => None,
            Ok(Err(err)) => {
                debug!("parameter correction unavailable: {err}");
                None
            }
            Err(err) => {
                warn!("correction task failed: {err}");
                None
            }
        }
    }

    fn attempt(
        level: DegradationLevel,
        filters: &SearchFilters,
        sources: &[SourceId],
        outcome: &FanoutOutcome,
    ) -> DegradationAttempt {
        DegradationAttempt {
            level,
            filters: filters.clone(),
            sources: sources.to_vec(),
            result_count: outcome.total_records(),
            errors: outcome.error_summary(),
        }
    }
}

fn has_invalid_params(outcome: &FanoutOutcome) -> bool {
    outcome
        .errors()
        .values()
        .any(|e| e.kind == ErrorKind::InvalidParams)
}

impl std::fmt::Debug for FederationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationEngine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OutputFormat, StructureRecord};
    use crate::retriever::{Retriever, SourceError};
    use crate::Error;
    use async_trait::async_trait;

    struct Passthrough;

    impl Preprocessor for Passthrough {
        fn preprocess(&self, query: &str) -> crate::Result<PreprocessedQuery> {
            Ok(heuristics::preprocess(query))
        }
    }

    struct NoOracle;

    impl CorrectionOracle for NoOracle {
        fn correct_parameters(
            &self,
            _query: &str,
            filters: &SearchFilters,
            _error_text: &str,
        ) -> crate::Result<crate::llm::Correction> {
            Ok(crate::llm::Correction {
                filters: filters.clone(),
                corrected: false,
                reason: "correction not available".to_string(),
            })
        }

        fn relax_to_elements_only(
            &self,
            _query: &str,
            _filters: &SearchFilters,
        ) -> crate::Result<(SearchFilters, String)> {
            Err(Error::OperationFailed {
                operation: "relax_to_elements_only".to_string(),
                cause: "oracle disabled".to_string(),
            })
        }
    }

    struct FixedRetriever {
        records: Vec<StructureRecord>,
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn fetch(
            &self,
            _filters: &SearchFilters,
            limit: usize,
            _format: OutputFormat,
        ) -> Result<Vec<StructureRecord>, SourceError> {
            Ok(self.records.iter().take(limit).cloned().collect())
        }
    }

    fn engine(registry: SourceRegistry) -> FederationEngine {
        FederationEngine::new(
            EngineConfig::default(),
            registry,
            Arc::new(Passthrough),
            Arc::new(NoOracle),
        )
    }

    fn records(source: &str, count: usize) -> Vec<StructureRecord> {
        (0..count)
            .map(|i| StructureRecord::new(format!("{source}-{i}"), source))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_query_short_circuits() {
        let engine = engine(SourceRegistry::new());
        let response = engine.search(SearchRequest::new("   ", 5)).await;
        assert_eq!(response.status, ResponseStatus::NoResults);
        assert_eq!(response.returned, 0);
    }

    #[tokio::test]
    async fn test_no_sources_yields_empty_response() {
        let engine = engine(SourceRegistry::new());
        let response = engine.search(SearchRequest::new("Fe2O3", 5)).await;
        assert_eq!(response.status, ResponseStatus::NoResults);
    }

    #[tokio::test]
    async fn test_happy_path_fair_split() {
        let mut registry = SourceRegistry::new();
        registry.register(
            "alpha",
            Arc::new(FixedRetriever {
                records: records("alpha", 5),
            }),
        );
        registry.register(
            "beta",
            Arc::new(FixedRetriever {
                records: records("beta", 3),
            }),
        );

        let engine = engine(registry);
        let response = engine.search(SearchRequest::new("Fe2O3", 6)).await;

        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.returned, 6);
        assert_eq!(response.by_source[&SourceId::new("alpha")], 3);
        assert_eq!(response.by_source[&SourceId::new("beta")], 3);
        assert_eq!(response.by_source_found[&SourceId::new("alpha")], 5);
        assert_eq!(response.fallback_level, 0);
        assert!(response.errors.is_empty());
    }

    #[tokio::test]
    async fn test_n_results_normalization() {
        let mut registry = SourceRegistry::new();
        registry.register(
            "alpha",
            Arc::new(FixedRetriever {
                records: records("alpha", 30),
            }),
        );
        let engine = engine(registry);

        // Zero falls back to the default of 5.
        let response = engine.search(SearchRequest::new("Fe2O3", 0)).await;
        assert_eq!(response.returned, 5);

        // Oversized requests clamp to the configured maximum of 20.
        let response = engine.search(SearchRequest::new("Fe2O3", 500)).await;
        assert_eq!(response.returned, 20);
    }

    #[tokio::test]
    async fn test_degradation_record_bounded() {
        let mut registry = SourceRegistry::new();
        registry.register(
            "alpha",
            Arc::new(FixedRetriever {
                records: Vec::new(),
            }),
        );
        let engine = engine(registry);

        let (response, record) = engine
            .search_detailed(SearchRequest::new("Fe2O3", 5))
            .await;

        // One attempt per ladder rung, no corrections: at most L+1.
        assert_eq!(record.len(), 4);
        assert_eq!(response.fallback_level, 3);
        assert_eq!(response.status, ResponseStatus::NoResults);
    }

    #[test]
    fn test_with_llm_constructor_falls_back_to_heuristics() {
        // No API key configured: the analyzer serves both capability seams
        // and degrades to regex preprocessing without touching the network.
        let mut registry = SourceRegistry::new();
        registry.register(
            "alpha",
            Arc::new(FixedRetriever {
                records: records("alpha", 2),
            }),
        );
        let engine = FederationEngine::with_llm(EngineConfig::default(), registry);

        let response = tokio_test::block_on(engine.search(SearchRequest::new("Fe2O3", 3)));
        assert_eq!(response.returned, 2);
        assert_eq!(response.status, ResponseStatus::Success);
    }

    #[tokio::test]
    async fn test_partial_success_on_source_failure() {
        struct Failing;

        #[async_trait]
        impl Retriever for Failing {
            async fn fetch(
                &self,
                _filters: &SearchFilters,
                _limit: usize,
                _format: OutputFormat,
            ) -> Result<Vec<StructureRecord>, SourceError> {
                Err(SourceError::network("connection refused"))
            }
        }

        let mut registry = SourceRegistry::new();
        registry.register("alpha", Arc::new(Failing));
        registry.register(
            "beta",
            Arc::new(FixedRetriever {
                records: records("beta", 3),
            }),
        );
        let engine = engine(registry);

        let response = engine.search(SearchRequest::new("Fe2O3", 5)).await;
        assert_eq!(response.status, ResponseStatus::PartialSuccess);
        assert_eq!(response.returned, 3);
        assert!(response.errors.contains_key(&SourceId::new("alpha")));
    }
}
