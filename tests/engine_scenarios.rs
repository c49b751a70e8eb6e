//! End-to-end engine scenarios over stub sources.

use async_trait::async_trait;
use matfed::llm::Correction;
use matfed::{
    CorrectionOracle, EngineConfig, FederationEngine, OutputFormat, PreprocessedQuery,
    Preprocessor, ResponseStatus, Retriever, SearchFilters, SearchRequest, SourceError, SourceId,
    SourceRegistry, StructureRecord,
};
use std::sync::Arc;

/// Preprocessor stub that hands the engine a fixed filter bag.
struct FixedPreprocessor {
    filters: SearchFilters,
}

impl Preprocessor for FixedPreprocessor {
    fn preprocess(&self, query: &str) -> matfed::Result<PreprocessedQuery> {
        Ok(PreprocessedQuery {
            filters: self.filters.clone(),
            target_sources: Vec::new(),
            expanded_query: query.to_string(),
        })
    }
}

/// Oracle stub: no corrections, no category expansion.
struct SilentOracle;

impl CorrectionOracle for SilentOracle {
    fn correct_parameters(
        &self,
        _query: &str,
        filters: &SearchFilters,
        _error_text: &str,
    ) -> matfed::Result<Correction> {
        Ok(Correction {
            filters: filters.clone(),
            corrected: false,
            reason: "not available".to_string(),
        })
    }

    fn relax_to_elements_only(
        &self,
        _query: &str,
        _filters: &SearchFilters,
    ) -> matfed::Result<(SearchFilters, String)> {
        Err(matfed::Error::OperationFailed {
            operation: "relax".to_string(),
            cause: "not available".to_string(),
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

fn records(source: &str, count: usize) -> Vec<StructureRecord> {
    (0..count)
        .map(|i| StructureRecord::new(format!("{source}-{i}"), source).with_id(format!("{source}:{i}")))
        .collect()
}

fn engine_with(
    registry: SourceRegistry,
    filters: SearchFilters,
) -> FederationEngine {
    FederationEngine::new(
        EngineConfig::default(),
        registry,
        Arc::new(FixedPreprocessor { filters }),
        Arc::new(SilentOracle),
    )
}

#[tokio::test]
async fn fair_split_with_capped_source() {
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
            records: records("beta", 2),
        }),
    );

    let engine = engine_with(registry, SearchFilters::new().with_formula("Fe2O3"));
    let response = engine.search(SearchRequest::new("Fe2O3", 6)).await;

    // beta caps at 2; its shortfall water-fills to alpha.
    assert_eq!(response.returned, 6);
    assert_eq!(response.by_source[&SourceId::new("alpha")], 4);
    assert_eq!(response.by_source[&SourceId::new("beta")], 2);
    assert_eq!(response.status, ResponseStatus::Success);
}

#[tokio::test]
async fn short_results_are_not_padded() {
    let mut registry = SourceRegistry::new();
    registry.register(
        "alpha",
        Arc::new(FixedRetriever {
            records: records("alpha", 4),
        }),
    );

    let engine = engine_with(registry, SearchFilters::new());
    let response = engine.search(SearchRequest::new("Fe2O3", 10)).await;

    assert_eq!(response.returned, 4);
    assert_eq!(response.n_found, 4);
    assert_eq!(response.results.len(), 4);
    assert_eq!(response.status, ResponseStatus::Success);
}

#[tokio::test]
async fn target_below_source_count_is_a_hard_cap() {
    let mut registry = SourceRegistry::new();
    registry.register(
        "alpha",
        Arc::new(FixedRetriever {
            records: records("alpha", 3),
        }),
    );
    registry.register(
        "beta",
        Arc::new(FixedRetriever {
            records: records("beta", 3),
        }),
    );

    // The keyword makes beta's records outrank alpha's; the single slot
    // still goes to the first source in registration order.
    let engine = engine_with(registry, SearchFilters::new().with_keywords(["beta"]));
    let response = engine.search(SearchRequest::new("anything", 1)).await;

    assert_eq!(response.returned, 1);
    assert_eq!(response.results[0].source, SourceId::new("alpha"));
}

#[tokio::test]
async fn failing_source_does_not_block_the_others() {
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

    let engine = engine_with(registry, SearchFilters::new());
    let response = engine.search(SearchRequest::new("Fe2O3", 5)).await;

    assert_eq!(response.status, ResponseStatus::PartialSuccess);
    assert_eq!(response.returned, 3);
    assert!(response.errors[&SourceId::new("alpha")].contains("connection refused"));
    assert!(!response.errors.contains_key(&SourceId::new("beta")));
}

/// Succeeds only once both the numeric window and the raw provider query
/// are gone, i.e. at the "minimal" rung of the ladder.
struct StrictnessSensitive;

#[async_trait]
impl Retriever for StrictnessSensitive {
    async fn fetch(
        &self,
        filters: &SearchFilters,
        limit: usize,
        _format: OutputFormat,
    ) -> Result<Vec<StructureRecord>, SourceError> {
        if filters.band_gap.is_some() || filters.raw_query.is_some() {
            return Ok(Vec::new());
        }
        Ok(records("alpha", 4).into_iter().take(limit).collect())
    }
}

#[tokio::test]
async fn degradation_stops_at_first_productive_level() {
    let mut registry = SourceRegistry::new();
    registry.register("alpha", Arc::new(StrictnessSensitive));
    registry.register(
        "beta",
        Arc::new(FixedRetriever {
            records: Vec::new(),
        }),
    );

    let filters = SearchFilters {
        raw_query: Some("band_gap>1.0 AND band_gap<3.0".to_string()),
        ..SearchFilters::new()
            .with_formula("Fe2O3")
            .with_band_gap(matfed::NumericRange::new(1.0, 3.0))
    };
    let engine = engine_with(registry, filters);

    let (response, record) = engine
        .search_detailed(SearchRequest::new("Fe2O3 insulator", 5))
        .await;

    // Strict and relaxed-numeric both miss; minimal hits.
    assert_eq!(response.fallback_level, 2);
    assert_eq!(response.n_found, 4);
    assert_eq!(response.returned, 4);
    assert_eq!(record.len(), 3);
}

/// Rejects everything except one corrected formula.
struct PickyRetriever;

#[async_trait]
impl Retriever for PickyRetriever {
    async fn fetch(
        &self,
        filters: &SearchFilters,
        limit: usize,
        _format: OutputFormat,
    ) -> Result<Vec<StructureRecord>, SourceError> {
        if filters.formula.as_deref() == Some("Fe2O3") {
            Ok(records("alpha", 3).into_iter().take(limit).collect())
        } else {
            Err(SourceError::invalid_params("unknown formula syntax"))
        }
    }
}

/// Oracle that fixes the formula once.
struct FixingOracle;

impl CorrectionOracle for FixingOracle {
    fn correct_parameters(
        &self,
        _query: &str,
        filters: &SearchFilters,
        error_text: &str,
    ) -> matfed::Result<Correction> {
        assert!(error_text.contains("unknown formula syntax"));
        Ok(Correction {
            filters: SearchFilters {
                formula: Some("Fe2O3".to_string()),
                ..filters.clone()
            },
            corrected: true,
            reason: "normalized formula".to_string(),
        })
    }

    fn relax_to_elements_only(
        &self,
        _query: &str,
        _filters: &SearchFilters,
    ) -> matfed::Result<(SearchFilters, String)> {
        Err(matfed::Error::OperationFailed {
            operation: "relax".to_string(),
            cause: "not available".to_string(),
        })
    }
}

#[tokio::test]
async fn invalid_params_get_one_correction_retry() {
    let mut registry = SourceRegistry::new();
    registry.register("alpha", Arc::new(PickyRetriever));

    let engine = FederationEngine::new(
        EngineConfig::default(),
        registry,
        Arc::new(FixedPreprocessor {
            filters: SearchFilters::new().with_formula("iron(III) oxide"),
        }),
        Arc::new(FixingOracle),
    );

    let (response, record) = engine
        .search_detailed(SearchRequest::new("iron oxide", 5))
        .await;

    assert_eq!(response.status, ResponseStatus::Success);
    assert_eq!(response.returned, 3);
    assert_eq!(response.fallback_level, 0);
    // Original attempt plus the corrected retry.
    assert_eq!(record.len(), 2);
}

/// Answers only element-only queries for lanthanum.
struct RescueOnly;

#[async_trait]
impl Retriever for RescueOnly {
    async fn fetch(
        &self,
        filters: &SearchFilters,
        limit: usize,
        _format: OutputFormat,
    ) -> Result<Vec<StructureRecord>, SourceError> {
        let rescued = filters.formula.is_none()
            && filters.space_group.is_none()
            && filters.elements == vec!["La".to_string()];
        if rescued {
            Ok(records("alpha", 2).into_iter().take(limit).collect())
        } else {
            Ok(Vec::new())
        }
    }
}

/// Oracle that expands "rare earth" to a concrete element.
struct ExpandingOracle;

impl CorrectionOracle for ExpandingOracle {
    fn correct_parameters(
        &self,
        _query: &str,
        filters: &SearchFilters,
        _error_text: &str,
    ) -> matfed::Result<Correction> {
        Ok(Correction {
            filters: filters.clone(),
            corrected: false,
            reason: "not available".to_string(),
        })
    }

    fn relax_to_elements_only(
        &self,
        query: &str,
        _filters: &SearchFilters,
    ) -> matfed::Result<(SearchFilters, String)> {
        Ok((
            SearchFilters::new().with_elements(["La"]),
            format!("{query} (expanded: La)"),
        ))
    }
}

#[tokio::test]
async fn element_rescue_consults_the_oracle() {
    let mut registry = SourceRegistry::new();
    registry.register("alpha", Arc::new(RescueOnly));

    let engine = FederationEngine::new(
        EngineConfig::default(),
        registry,
        Arc::new(FixedPreprocessor {
            filters: SearchFilters::new().with_formula("rare-earth-oxide"),
        }),
        Arc::new(ExpandingOracle),
    );

    let (response, record) = engine
        .search_detailed(SearchRequest::new("rare earth oxides", 5))
        .await;

    assert_eq!(response.fallback_level, 3);
    assert_eq!(response.returned, 2);
    assert!(response.query_used.contains("expanded: La"));
    assert_eq!(record.len(), 4);
}

#[tokio::test]
async fn routing_hints_narrow_the_fanout() {
    let mut registry = SourceRegistry::new();
    registry.register(
        "alpha",
        Arc::new(FixedRetriever {
            records: records("alpha", 3),
        }),
    );
    registry.register(
        "beta",
        Arc::new(FixedRetriever {
            records: records("beta", 3),
        }),
    );

    struct RoutedPreprocessor;

    impl Preprocessor for RoutedPreprocessor {
        fn preprocess(&self, query: &str) -> matfed::Result<PreprocessedQuery> {
            Ok(PreprocessedQuery {
                filters: SearchFilters::new(),
                target_sources: vec![SourceId::new("beta")],
                expanded_query: query.to_string(),
            })
        }
    }

    let engine = FederationEngine::new(
        EngineConfig::default(),
        registry,
        Arc::new(RoutedPreprocessor),
        Arc::new(SilentOracle),
    );

    let response = engine.search(SearchRequest::new("anything", 4)).await;
    assert_eq!(response.returned, 3);
    assert!(response.by_source.contains_key(&SourceId::new("beta")));
    assert!(!response.by_source.contains_key(&SourceId::new("alpha")));
}

#[tokio::test]
async fn broadened_queries_merge_option_rounds() {
    /// Returns a different record per element option.
    struct PerOption;

    #[async_trait]
    impl Retriever for PerOption {
        async fn fetch(
            &self,
            filters: &SearchFilters,
            _limit: usize,
            _format: OutputFormat,
        ) -> Result<Vec<StructureRecord>, SourceError> {
            let tag = filters.elements.join("-");
            Ok(vec![
                StructureRecord::new(format!("m-{tag}"), "alpha").with_id(tag),
            ])
        }
    }

    let mut registry = SourceRegistry::new();
    registry.register("alpha", Arc::new(PerOption));

    let filters = SearchFilters {
        elements_options: vec![
            vec!["S".to_string(), "Ti".to_string()],
            vec!["S".to_string(), "Mo".to_string()],
        ],
        ..Default::default()
    };
    let engine = engine_with(registry, filters);

    let response = engine
        .search(SearchRequest::new("transition metal sulfides", 6))
        .await;

    assert_eq!(response.returned, 2);
    let names: Vec<_> = response.results.iter().map(|r| r.name.as_str()).collect();
    assert!(names.contains(&"m-S-Ti"));
    assert!(names.contains(&"m-S-Mo"));
}
