//! Database layer: pool construction, row types, the Job Leaser query, and idempotent result
//! persistence, per SPEC_FULL.md §4.1 / §4.14.
//!
//! The Leaser query is grounded directly on `PgJobStore::claim_ready` (`seesaw-job-postgres`):
//! a `FOR UPDATE SKIP LOCKED` CTE feeding an `UPDATE ... RETURNING`, generalized here to a
//! read-only `SELECT ... FOR UPDATE SKIP LOCKED` (the core never mutates predictions) held open
//! for the lifetime of the worker's transaction.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::goal_text::PostTextFetcher;
use crate::model::{GoalSlice, LeasedPrediction, Post, Prediction, PredictionDetails, Source, ValidationResult};
use crate::settings::QualityThresholds;

/// Build a connection pool sized to support at least `worker_count` concurrent transactions
/// plus head-room for the Leaser's own queries (§5), per `DB_POOL_SIZE`.
pub async fn connect(database_url: &str, pool_size: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(pool_size)
        .connect(database_url)
        .await
        .map_err(Error::Database)
}

/// Select, lock, and return the oldest matured, unvalidated, quality-passing prediction, or
/// `None` if the queue is empty. Must be called within a transaction that is later committed
/// (after a `ValidationResult` row is inserted) to release the lock — see `insert_result`.
pub async fn lease(
    tx: &mut Transaction<'_, Postgres>,
    now: DateTime<Utc>,
    thresholds: &QualityThresholds,
) -> Result<Option<LeasedPrediction>> {
    let row = sqlx::query(
        r#"
        SELECT
            p.id,
            p.source_post_id,
            p.goal_slices,
            p.llm_confidence,
            p.prediction_quality,
            p.vagueness,
            d.prediction_context,
            d.timeframe_start,
            d.timeframe_end,
            d.timeframe_status,
            d.filter_validation_confidence,
            d.filter_validation_reasoning,
            post.id AS post_id,
            post.text AS post_text
        FROM parsed_prediction p
        JOIN parsed_prediction_details d ON d.prediction_id = p.id
        JOIN scraped_post post ON post.id = p.source_post_id
        LEFT JOIN validation_result vr ON vr.parsed_prediction_id = p.id
        WHERE vr.id IS NULL
          AND d.timeframe_end IS NOT NULL
          AND d.timeframe_end <= $1
          AND (d.timeframe_start IS NULL OR d.timeframe_start <= d.timeframe_end)
          AND COALESCE(d.timeframe_status, '') <> 'missing'
          AND (d.filter_validation_confidence IS NULL OR d.filter_validation_confidence >= $2)
          AND (p.prediction_quality IS NULL OR p.prediction_quality >= $3)
          AND (p.llm_confidence IS NULL OR p.llm_confidence >= $4)
          AND (p.vagueness IS NULL OR p.vagueness <= $5)
        ORDER BY d.timeframe_end ASC
        LIMIT 1
        FOR UPDATE OF p SKIP LOCKED
        "#,
    )
    .bind(now)
    .bind(thresholds.min_filter_validation_confidence)
    .bind(thresholds.min_prediction_quality)
    .bind(thresholds.min_llm_confidence)
    .bind(thresholds.max_vagueness)
    .fetch_optional(&mut **tx)
    .await
    .map_err(Error::Database)?;

    let Some(row) = row else {
        return Ok(None);
    };

    let goal_slices: JsonValue = row.try_get("goal_slices").map_err(Error::Database)?;
    let goal_slices: Vec<GoalSlice> = serde_json::from_value(goal_slices).unwrap_or_default();

    let prediction = Prediction {
        id: row.try_get("id").map_err(Error::Database)?,
        source_post_id: row.try_get("source_post_id").map_err(Error::Database)?,
        goal_slices,
        llm_confidence: row.try_get("llm_confidence").map_err(Error::Database)?,
        prediction_quality: row.try_get("prediction_quality").map_err(Error::Database)?,
        vagueness: row.try_get("vagueness").map_err(Error::Database)?,
    };

    let details = PredictionDetails {
        prediction_id: prediction.id,
        prediction_context: row.try_get("prediction_context").map_err(Error::Database)?,
        timeframe_start: row.try_get("timeframe_start").map_err(Error::Database)?,
        timeframe_end: row.try_get("timeframe_end").map_err(Error::Database)?,
        timeframe_status: row.try_get("timeframe_status").map_err(Error::Database)?,
        filter_validation_confidence: row
            .try_get("filter_validation_confidence")
            .map_err(Error::Database)?,
        filter_validation_reasoning: row
            .try_get("filter_validation_reasoning")
            .map_err(Error::Database)?,
    };

    let post = Post {
        id: row.try_get("post_id").map_err(Error::Database)?,
        text: row.try_get("post_text").map_err(Error::Database)?,
    };

    Ok(Some(LeasedPrediction {
        prediction,
        details,
        post,
    }))
}

/// Insert a `ValidationResult`, swallowing a unique-constraint violation silently (another
/// worker won the race — invariant 1 / Testable Property 1). Returns `true` if this call's row
/// was the one actually persisted.
pub async fn insert_result(
    tx: &mut Transaction<'_, Postgres>,
    result: &ValidationResult,
) -> Result<bool> {
    let sources = serde_json::to_value(&result.sources).unwrap_or(JsonValue::Array(vec![]));

    let outcome = sqlx::query(
        r#"
        INSERT INTO validation_result (id, parsed_prediction_id, outcome, proof, sources, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (parsed_prediction_id) DO NOTHING
        "#,
    )
    .bind(result.id)
    .bind(result.prediction_id)
    .bind(result.outcome)
    .bind(&result.proof)
    .bind(sources)
    .bind(result.created_at)
    .execute(&mut **tx)
    .await
    .map_err(Error::Database)?;

    Ok(outcome.rows_affected() == 1)
}

/// Fetch a post's text by id, for goal-slice cross-references that quote a different post than
/// the one leased (§4.3).
pub struct PgPostTextFetcher {
    pool: PgPool,
}

impl PgPostTextFetcher {
    /// Build a fetcher over the shared pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PostTextFetcher for PgPostTextFetcher {
    async fn fetch_text(&self, post_id: i64) -> Result<Option<String>> {
        let row = sqlx::query("SELECT text FROM scraped_post WHERE id = $1")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.map(|r| r.get::<String, _>("text")))
    }
}

/// Build a `Source` list by dropping malformed URLs, preserving order, per the `Source` type's
/// well-formedness guarantee.
pub fn sources_from_results(results: &[crate::model::SearchResult], max: usize) -> Vec<Source> {
    results
        .iter()
        .filter_map(Source::try_from_result)
        .take(max)
        .collect()
}

/// Generate a fresh identifier for a new `ValidationResult` row.
pub fn new_result_id() -> Uuid {
    Uuid::new_v4()
}
