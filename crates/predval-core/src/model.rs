//! Domain entities shared across the validation pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single `{start, end}` slice of a post's text, in Unicode scalar (char) offsets.
///
/// Half-open range: `[start, end)`. `source_post_id` overrides which post's text the
/// slice is taken from; absent means "the post this prediction was attached to".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GoalSlice {
    /// Start offset, inclusive, in chars.
    pub start: usize,
    /// End offset, exclusive, in chars.
    pub end: usize,
    /// Overriding source post, if the slice quotes a different post than the one leased.
    #[serde(default)]
    pub source_post_id: Option<i64>,
}

/// One parsed claim, as produced by the upstream pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Opaque, unique identifier.
    pub id: i64,
    /// The post this prediction was extracted from.
    pub source_post_id: i64,
    /// Ordered substrings of the source text that make up the claim.
    pub goal_slices: Vec<GoalSlice>,
    /// Confidence the upstream LLM had that this is in fact a prediction.
    pub llm_confidence: Option<f64>,
    /// Upstream-assessed quality score, 0..100.
    pub prediction_quality: Option<f64>,
    /// Upstream-assessed vagueness, 0..1 (higher is vaguer).
    pub vagueness: Option<f64>,
}

/// Timeframe status sentinel values tracked alongside a prediction's timeframe.
pub mod timeframe_status {
    /// The upstream pipeline could not determine a timeframe at all.
    pub const MISSING: &str = "missing";
}

/// Extra per-prediction metadata populated by the upstream pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionDetails {
    /// The prediction this row describes.
    pub prediction_id: i64,
    /// Pre-computed summary text; used verbatim as prediction text when present and non-empty.
    pub prediction_context: Option<String>,
    /// Start of the predicted timeframe.
    pub timeframe_start: Option<DateTime<Utc>>,
    /// End of the predicted timeframe; a prediction is matured once this has passed.
    pub timeframe_end: Option<DateTime<Utc>>,
    /// One of the upstream pipeline's timeframe status strings (see `timeframe_status`).
    pub timeframe_status: Option<String>,
    /// Confidence that the pre-filter's automated quality gate was applied correctly.
    pub filter_validation_confidence: Option<f64>,
    /// Free-text reasoning behind `filter_validation_confidence`, scanned for keywords.
    pub filter_validation_reasoning: Option<String>,
}

/// Original text a prediction's goal slices may reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    /// Primary key.
    pub id: i64,
    /// Full post text, indexed by Unicode scalar value in `GoalSlice`.
    pub text: String,
}

/// The tuple a single lease hands to a worker.
#[derive(Debug, Clone)]
pub struct LeasedPrediction {
    /// The prediction itself.
    pub prediction: Prediction,
    /// Its extra metadata.
    pub details: PredictionDetails,
    /// The post it was extracted from.
    pub post: Post,
}

/// Final label written for a validated prediction.
///
/// `NotMatured` is declared for storage schema compatibility only; the core never writes it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum Outcome {
    /// Prediction held true in full.
    MaturedTrue,
    /// Prediction held true with minor caveats.
    MaturedMostlyTrue,
    /// Prediction did not hold.
    MaturedFalse,
    /// Prediction mostly did not hold.
    MaturedMostlyFalse,
    /// Not enough evidence to judge either way.
    MissingContext,
    /// Reserved; never produced by this system.
    NotMatured,
    /// Failed pre-validation, or could not be judged at all (e.g. adapter error).
    Invalid,
}

impl Outcome {
    /// `true` for the four outcomes that represent an actual true/false judgment.
    #[must_use]
    pub fn is_matured_verdict(self) -> bool {
        matches!(
            self,
            Outcome::MaturedTrue
                | Outcome::MaturedMostlyTrue
                | Outcome::MaturedFalse
                | Outcome::MaturedMostlyFalse
        )
    }
}

/// A single organic web-search hit, as returned by the Search Adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    /// Result URL.
    pub url: String,
    /// Result title, if the provider returned one.
    pub title: Option<String>,
    /// Short excerpt/snippet, if the provider returned one.
    pub excerpt: Option<String>,
    /// Publication date, as a free-form string (the provider's own format).
    pub pub_date: Option<String>,
}

/// A `SearchResult` whose URL has been confirmed well-formed; what gets persisted as evidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    /// Well-formed result URL.
    pub url: String,
    /// Result title, if any.
    pub title: Option<String>,
    /// Short excerpt/snippet, if any.
    pub excerpt: Option<String>,
    /// Publication date, if any.
    pub pub_date: Option<String>,
}

impl Source {
    /// Build a `Source` from a `SearchResult`, rejecting malformed URLs.
    pub fn try_from_result(result: &SearchResult) -> Option<Self> {
        reqwest::Url::parse(&result.url).ok()?;
        Some(Source {
            url: result.url.clone(),
            title: result.title.clone(),
            excerpt: result.excerpt.clone(),
            pub_date: result.pub_date.clone(),
        })
    }
}

/// Reconciled decision from the Result Judge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Decision {
    /// The evidence supports the claim.
    True,
    /// The evidence contradicts the claim.
    False,
    /// The evidence is insufficient either way.
    Inconclusive,
}

/// Parsed-and-reconciled output of one Result Judge call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgment {
    /// Final decision after score/decision reconciliation (see `judge::reconcile`).
    pub decision: Decision,
    /// Confidence score, 0..10.
    pub score: u8,
    /// One-line summary of the verdict.
    pub summary: String,
    /// Short evidence bullet block, if the model produced one.
    pub evidence: Option<String>,
    /// One-line reasoning, if the model produced one.
    pub reasoning: Option<String>,
    /// Whether the model considered the evidence set sufficient to commit to a verdict.
    pub sufficient: bool,
    /// A follow-up query the model suggests, if it judged the evidence insufficient.
    pub next_query_suggestion: Option<String>,
    /// Input tokens billed for this call.
    pub input_tokens: u32,
    /// Output tokens billed for this call.
    pub output_tokens: u32,
}

/// The core's sole write to durable storage per prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Freshly generated identifier.
    pub id: Uuid,
    /// The prediction this result belongs to.
    pub prediction_id: i64,
    /// Final label.
    pub outcome: Outcome,
    /// Human-readable proof, truncated to at most 700 chars.
    pub proof: String,
    /// Up to two supporting sources, in combined-result order.
    pub sources: Vec<Source>,
    /// When this row was created.
    pub created_at: DateTime<Utc>,
}

/// One append-only cost/telemetry record, written once per completed validation.
///
/// Field names on the wire follow SPEC_FULL.md §6 exactly (`prediction_id`/`prediction_context`
/// stay snake_case; the token/call counters are camelCase) rather than a uniform derive, since
/// that mixed casing is the external contract downstream log consumers expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostLogEntry {
    /// The prediction that was validated.
    pub prediction_id: i64,
    /// The prediction text that was sent to the LLM adapters.
    #[serde(rename = "prediction_context")]
    pub prediction_text: String,
    /// Number of search-API calls issued during this validation.
    #[serde(rename = "searchApiCalls")]
    pub search_api_calls: u32,
    /// Query Enhancer input tokens, summed across all calls.
    #[serde(rename = "queryEnhancerInputTokens")]
    pub query_enhancer_in_tokens: u32,
    /// Query Enhancer output tokens, summed across all calls.
    #[serde(rename = "queryEnhancerOutputTokens")]
    pub query_enhancer_out_tokens: u32,
    /// Result Judge input tokens, summed across all calls.
    #[serde(rename = "resultJudgeInputTokens")]
    pub result_judge_in_tokens: u32,
    /// Result Judge output tokens, summed across all calls.
    #[serde(rename = "resultJudgeOutputTokens")]
    pub result_judge_out_tokens: u32,
    /// Total input tokens (enhancer + judge).
    #[serde(rename = "totalInputTokens")]
    pub total_input_tokens: u32,
    /// Total output tokens (enhancer + judge).
    #[serde(rename = "totalOutputTokens")]
    pub total_output_tokens: u32,
    /// Final outcome.
    pub outcome: Outcome,
    /// When the validation completed.
    pub timestamp: DateTime<Utc>,
}
