//! Worker loop: lease → pipeline → persist → cost update → sleep, per SPEC_FULL.md §4.10.
//!
//! Grounded in the reference client's `run_worker_task`/`run_job` shape: a command loop with a
//! retry/sleep idiom on error, generalized here from "receive a `WorkerCommand`" to "drive its
//! own lease/validate/persist cycle directly" since each iteration is independent async I/O
//! rather than dispatched CPU-bound compute.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::mpsc;

use crate::chat::ChatClient;
use crate::cost::CostTracker;
use crate::db::{self, PgPostTextFetcher};
use crate::model::{Outcome, ValidationResult};
use crate::pipeline::{self, Models, Prompts};
use crate::search::SearchClient;
use crate::settings::{PipelineConfig, WorkerTiming};

/// Events a worker emits for the Supervisor's broadcast channel.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// The worker leased and began validating a prediction.
    LeaseAcquired { worker_idx: usize, prediction_id: i64 },
    /// The worker found no eligible predictions.
    QueueEmpty { worker_idx: usize },
    /// A validation completed (successfully or as `Invalid`/`MissingContext`).
    ValidationCompleted {
        worker_idx: usize,
        prediction_id: i64,
        outcome: Outcome,
    },
    /// A recoverable (transient DB) error occurred; the worker will retry.
    RecoverableError { worker_idx: usize, message: String },
}

/// Everything one worker iteration needs, shared process-wide across workers.
pub struct WorkerDeps {
    pub pool: PgPool,
    pub chat: Arc<dyn ChatClient>,
    pub search: Arc<dyn SearchClient>,
    pub cost: CostTracker,
    pub prompts: Arc<Prompts>,
    pub models: Arc<Models>,
    pub pipeline_config: Arc<PipelineConfig>,
    pub timing: WorkerTiming,
}

/// Run one worker's loop until `stop` is set. Every iteration is: open a transaction, lease,
/// (if present) run the pipeline, persist, commit; on any transient DB error, roll back and
/// sleep. See §4.10 for the exact control flow and §7 for error policy.
pub async fn run_worker(
    worker_idx: usize,
    deps: Arc<WorkerDeps>,
    stop: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }

        match run_iteration(worker_idx, &deps, &events).await {
            Ok(IterationOutcome::Validated) => {}
            Ok(IterationOutcome::QueueEmpty) => {
                deps.cost.mark_worker(worker_idx, "Waiting (idle)", false);
                let _ = events.send(WorkerEvent::QueueEmpty { worker_idx });
                sleep_or_stop(deps.timing.idle_sleep, &stop).await;
            }
            Err(err) => {
                deps.cost.mark_worker(worker_idx, "Error (retrying)", false);
                tracing::error!(worker_idx, error = %err, "worker iteration failed");
                let _ = events.send(WorkerEvent::RecoverableError {
                    worker_idx,
                    message: err.to_string(),
                });
                sleep_or_stop(deps.timing.error_sleep, &stop).await;
            }
        }
    }
}

async fn sleep_or_stop(duration: std::time::Duration, stop: &AtomicBool) {
    let deadline = tokio::time::Instant::now() + duration;
    while tokio::time::Instant::now() < deadline {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }
}

enum IterationOutcome {
    Validated,
    QueueEmpty,
}

async fn run_iteration(
    worker_idx: usize,
    deps: &WorkerDeps,
    events: &mpsc::UnboundedSender<WorkerEvent>,
) -> crate::error::Result<IterationOutcome> {
    let mut tx = deps.pool.begin().await.map_err(crate::error::Error::Database)?;

    let leased = db::lease(&mut tx, Utc::now(), &deps.pipeline_config.thresholds).await?;

    let Some(leased) = leased else {
        tx.commit().await.map_err(crate::error::Error::Database)?;
        return Ok(IterationOutcome::QueueEmpty);
    };

    deps.cost.mark_worker(worker_idx, "Validating", true);
    tracing::info!(worker_idx, prediction_id = leased.prediction.id, "lease acquired");
    let _ = events.send(WorkerEvent::LeaseAcquired {
        worker_idx,
        prediction_id: leased.prediction.id,
    });

    let fetcher = PgPostTextFetcher::new(deps.pool.clone());
    let output = pipeline::run(
        &leased,
        &fetcher,
        deps.chat.as_ref(),
        deps.search.as_ref(),
        &deps.prompts,
        &deps.models,
        &deps.pipeline_config,
    )
    .await;

    persist(&mut tx, &output.result).await?;
    tx.commit().await.map_err(crate::error::Error::Database)?;

    deps.cost.record(&output.cost_entry);
    tracing::info!(
        worker_idx,
        prediction_id = output.result.prediction_id,
        outcome = ?output.result.outcome,
        "validation completed"
    );
    let _ = events.send(WorkerEvent::ValidationCompleted {
        worker_idx,
        prediction_id: output.result.prediction_id,
        outcome: output.result.outcome,
    });

    Ok(IterationOutcome::Validated)
}

async fn persist(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    result: &ValidationResult,
) -> crate::error::Result<()> {
    // Idempotent: `ON CONFLICT (parsed_prediction_id) DO NOTHING` makes a concurrent duplicate a
    // silent no-op rather than an error (§7: "DB constraint (unique) → Swallow silently").
    db::insert_result(tx, result).await?;
    Ok(())
}
