//! Pipeline configuration: every tunable knob named in SPEC_FULL.md §4.1/§4.8, collected into
//! one record so tests can override any of them, following the reference client's
//! `EngineConfig::DEFAULT_*` associated-const pattern.

use std::time::Duration;

/// Quality thresholds applied by both the Leaser's SQL predicate and the in-memory pre-filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityThresholds {
    /// Minimum `filter_validation_confidence` to pass (optional field; null passes).
    pub min_filter_validation_confidence: f64,
    /// Minimum `prediction_quality` to pass (optional field; null passes).
    pub min_prediction_quality: f64,
    /// Minimum `llm_confidence` to pass (optional field; null passes).
    pub min_llm_confidence: f64,
    /// Maximum `vagueness` to pass (optional field; null passes).
    pub max_vagueness: f64,
}

impl QualityThresholds {
    /// Literal defaults from SPEC_FULL.md §4.1.
    pub const DEFAULT: Self = Self {
        min_filter_validation_confidence: 0.85,
        min_prediction_quality: 30.0,
        min_llm_confidence: 0.50,
        max_vagueness: 0.80,
    };
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Score cutoffs used by outcome mapping, per SPEC_FULL.md §4.7.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutcomeCuts {
    /// `TRUE` decisions with score at or above this map to `MaturedTrue`, else `MaturedMostlyTrue`.
    pub true_strong_min_score: u8,
    /// `FALSE` decisions with score at or below this map to `MaturedFalse`, else `MaturedMostlyFalse`.
    pub false_strong_max_score: u8,
}

impl OutcomeCuts {
    /// Literal defaults from SPEC_FULL.md §4.7.
    pub const DEFAULT: Self = Self {
        true_strong_min_score: 9,
        false_strong_max_score: 2,
    };
}

impl Default for OutcomeCuts {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// All pipeline tunables, collected into one record for test overrides, per §4.8.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Number of diverse queries the Query Enhancer produces on the initial pass.
    pub initial_queries: usize,
    /// Max results requested per search query.
    pub results_per_query: u32,
    /// Once the combined result set reaches this size, skip refinement even if insufficient.
    pub max_total_results: usize,
    /// Refinement passes to run after the first judgment if it reports insufficient evidence.
    ///
    /// Present as a config knob per the spec's design note; the pipeline always runs at most
    /// one refinement pass regardless of this value — a documented design hook, not yet a live
    /// parameter (SPEC_FULL.md §9 "Refinement cap").
    pub max_refinement_iterations: u32,
    /// Maximum character length of a persisted proof.
    pub max_proof_len: usize,
    /// Maximum number of sources persisted per result.
    pub max_sources: usize,
    /// Quality gate thresholds.
    pub thresholds: QualityThresholds,
    /// Outcome-mapping score cuts.
    pub outcome_cuts: OutcomeCuts,
}

impl PipelineConfig {
    /// Literal defaults from SPEC_FULL.md §4.8.
    pub const DEFAULT_INITIAL_QUERIES: usize = 2;
    /// Literal defaults from SPEC_FULL.md §4.8.
    pub const DEFAULT_RESULTS_PER_QUERY: u32 = 10;
    /// Literal defaults from SPEC_FULL.md §4.8.
    pub const DEFAULT_MAX_TOTAL_RESULTS: usize = 30;
    /// Literal defaults from SPEC_FULL.md §4.8.
    pub const DEFAULT_MAX_REFINEMENT_ITERATIONS: u32 = 1;
    /// Proof length bound, per the Data Model invariant.
    pub const DEFAULT_MAX_PROOF_LEN: usize = 700;
    /// Sources bound, per the Data Model invariant.
    pub const DEFAULT_MAX_SOURCES: usize = 2;
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            initial_queries: Self::DEFAULT_INITIAL_QUERIES,
            results_per_query: Self::DEFAULT_RESULTS_PER_QUERY,
            max_total_results: Self::DEFAULT_MAX_TOTAL_RESULTS,
            max_refinement_iterations: Self::DEFAULT_MAX_REFINEMENT_ITERATIONS,
            max_proof_len: Self::DEFAULT_MAX_PROOF_LEN,
            max_sources: Self::DEFAULT_MAX_SOURCES,
            thresholds: QualityThresholds::default(),
            outcome_cuts: OutcomeCuts::default(),
        }
    }
}

/// Worker loop sleep intervals, per §4.10.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerTiming {
    /// How long a worker sleeps after finding an empty queue.
    pub idle_sleep: Duration,
    /// How long a worker sleeps after a recoverable (transient DB) error.
    pub error_sleep: Duration,
}

impl WorkerTiming {
    /// Literal defaults from SPEC_FULL.md §4.10.
    pub const DEFAULT: Self = Self {
        idle_sleep: Duration::from_secs(10),
        error_sleep: Duration::from_secs(5),
    };
}

impl Default for WorkerTiming {
    fn default() -> Self {
        Self::DEFAULT
    }
}
