//! Public API: Supervisor handle, event stream, and snapshot types, per SPEC_FULL.md §4.11.
//!
//! Shape grounded in the reference client's `api.rs` (`EngineHandle`/`EngineEvent`/
//! `StatusSnapshot`): a broadcast event channel plus a `watch` snapshot, generalized from
//! proof-job summaries to validation-lifecycle events.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::broadcast;

use crate::chat::ChatClient;
use crate::cost::{CostSnapshot, CostTracker};
use crate::model::Outcome;
use crate::pipeline::{Models, Prompts};
use crate::search::SearchClient;
use crate::settings::{PipelineConfig, WorkerTiming};
use crate::worker::{WorkerDeps, WorkerEvent, run_worker};

/// Configuration for the Supervisor.
pub struct SupervisorConfig {
    /// Database pool to lease from and persist into.
    pub pool: PgPool,
    /// Chat Adapter, shared process-wide (stateless).
    pub chat: Arc<dyn ChatClient>,
    /// Search Adapter, shared process-wide (stateless).
    pub search: Arc<dyn SearchClient>,
    /// Static system prompts.
    pub prompts: Prompts,
    /// Chat model identifiers for the two adapter roles.
    pub models: Models,
    /// Pipeline tunables.
    pub pipeline_config: PipelineConfig,
    /// Worker sleep intervals.
    pub timing: WorkerTiming,
    /// Number of workers to run concurrently.
    pub worker_count: usize,
    /// Path to the append-only cost log.
    pub cost_log_path: std::path::PathBuf,
}

impl SupervisorConfig {
    /// Default worker count, per SPEC_FULL.md §4.11.
    pub const DEFAULT_WORKER_COUNT: usize = 10;
}

/// A single worker's last-known activity, as shown on the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    /// Worker index (0-based).
    pub worker_idx: usize,
    /// Human-readable activity string.
    pub activity: String,
    /// Whether the worker currently holds a lease.
    pub is_active: bool,
}

/// Current Supervisor state snapshot, built from the Cost Tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Whether a stop has been requested.
    pub stop_requested: bool,
    /// Per-worker activity.
    pub workers: Vec<WorkerSnapshot>,
    /// Cost/telemetry snapshot.
    pub cost: CostSnapshot,
}

/// Supervisor event stream payload, consumed by the console presentation layer (§4.16) and any
/// richer dashboard attached to the same broadcast channel.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// The Supervisor has started all workers.
    Started,
    /// A graceful shutdown was requested.
    StopRequested,
    /// Forwarded from a worker.
    Worker(WorkerEvent),
    /// All workers have exited.
    Stopped,
}

pub(crate) struct SupervisorInner {
    pub(crate) event_tx: broadcast::Sender<SupervisorEvent>,
    pub(crate) cost: CostTracker,
    pub(crate) stop: Arc<AtomicBool>,
}

/// Handle to a running Supervisor instance.
pub struct SupervisorHandle {
    pub(crate) inner: Arc<SupervisorInner>,
    pub(crate) join: tokio::task::JoinHandle<()>,
    /// The receiver subscribed before `Started` was published, so the first caller to
    /// `subscribe()` still observes it instead of it being dropped for lack of a listener.
    pub(crate) initial_rx: std::sync::Mutex<Option<broadcast::Receiver<SupervisorEvent>>>,
}

impl SupervisorHandle {
    /// Subscribe to the Supervisor's event stream. The first call returns the receiver that was
    /// live when `Started` was published, so that event is never missed; later calls get a fresh
    /// subscription starting from whatever is sent from that point on.
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        let mut initial = self.initial_rx.lock().unwrap_or_else(|e| e.into_inner());
        initial
            .take()
            .unwrap_or_else(|| self.inner.event_tx.subscribe())
    }

    /// Pull a snapshot of current Supervisor + Cost Tracker state.
    pub fn snapshot(&self) -> StatusSnapshot {
        let cost = self.inner.cost.snapshot();
        let workers = cost
            .workers
            .iter()
            .map(|(idx, activity)| WorkerSnapshot {
                worker_idx: *idx,
                activity: activity.activity.clone(),
                is_active: activity.is_active,
            })
            .collect();
        StatusSnapshot {
            stop_requested: self.inner.stop.load(std::sync::atomic::Ordering::SeqCst),
            workers,
            cost,
        }
    }

    /// Request a graceful shutdown: workers finish their current validation, then exit.
    pub fn request_stop(&self) {
        if !self
            .inner
            .stop
            .swap(true, std::sync::atomic::Ordering::SeqCst)
        {
            let _ = self.inner.event_tx.send(SupervisorEvent::StopRequested);
        }
    }

    /// Wait for all workers to exit.
    pub async fn wait(self) -> anyhow::Result<()> {
        self.join
            .await
            .map_err(|err| anyhow::anyhow!("supervisor task join error: {err}"))
    }
}

/// Start N workers per `config.worker_count`, return a handle to observe and stop them.
pub fn start_supervisor(config: SupervisorConfig) -> SupervisorHandle {
    let (event_tx, initial_rx) = broadcast::channel(1024);
    let stop = Arc::new(AtomicBool::new(false));
    let cost = CostTracker::init(&config.cost_log_path);

    let inner = Arc::new(SupervisorInner {
        event_tx: event_tx.clone(),
        cost: cost.clone(),
        stop: stop.clone(),
    });

    let deps = Arc::new(WorkerDeps {
        pool: config.pool,
        chat: config.chat,
        search: config.search,
        cost: cost.clone(),
        prompts: Arc::new(config.prompts),
        models: Arc::new(config.models),
        pipeline_config: Arc::new(config.pipeline_config),
        timing: config.timing,
    });

    let worker_count = config.worker_count.max(1);
    let _ = event_tx.send(SupervisorEvent::Started);

    let join = tokio::spawn({
        let event_tx = event_tx.clone();
        let stop = stop.clone();
        async move {
            let (worker_tx, mut worker_rx) = tokio::sync::mpsc::unbounded_channel();

            let mut handles = Vec::with_capacity(worker_count);
            for worker_idx in 0..worker_count {
                let deps = deps.clone();
                let stop = stop.clone();
                let worker_tx = worker_tx.clone();
                handles.push(tokio::spawn(async move {
                    run_worker(worker_idx, deps, stop, worker_tx).await;
                }));
            }
            drop(worker_tx);

            let forward = tokio::spawn({
                let event_tx = event_tx.clone();
                async move {
                    while let Some(ev) = worker_rx.recv().await {
                        let _ = event_tx.send(SupervisorEvent::Worker(ev));
                    }
                }
            });

            for handle in handles {
                let _ = handle.await;
            }
            drop(forward);

            let _ = event_tx.send(SupervisorEvent::Stopped);
        }
    });

    SupervisorHandle {
        inner,
        join,
        initial_rx: std::sync::Mutex::new(Some(initial_rx)),
    }
}

/// Default idle/error worker sleep, shown here for discoverability; see `WorkerTiming::DEFAULT`.
pub const DEFAULT_WORKER_SLEEP: Duration = Duration::from_secs(10);

/// Re-exported outcome type, for callers that only need to match on the final label.
pub type ValidationOutcome = Outcome;
