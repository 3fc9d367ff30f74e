//! Cost/telemetry tracker: a process-wide singleton counting validations, search calls, tokens,
//! and per-outcome counts, and deriving a USD estimate from them, per SPEC_FULL.md §4.9.
//!
//! Grounded in the reference client's `EngineInner`/`StatusSnapshot` pair: shared mutable state
//! behind a lock, with a `watch` channel for cheap, lock-free snapshot reads by the dashboard.

use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::model::{CostLogEntry, Outcome};

const SEARCH_COST_PER_CALL: f64 = 100.0 / 35_000.0;
const LLM_INPUT_COST_PER_MILLION: f64 = 0.30;
const LLM_OUTPUT_COST_PER_MILLION: f64 = 2.50;

/// Raw counters shared by the session and historical counter sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counters {
    /// Number of completed validations.
    pub validated: u64,
    /// Number of search-API calls issued.
    pub search_api_calls: u64,
    /// Total input tokens billed (enhancer + judge).
    pub input_tokens: u64,
    /// Total output tokens billed (enhancer + judge).
    pub output_tokens: u64,
    /// Count of completed validations, by outcome.
    pub by_outcome: HashMap<Outcome, u64>,
}

// `Outcome` needs to be hashable to key `by_outcome`; derive manually since sqlx::Type doesn't
// imply Hash.
impl std::hash::Hash for Outcome {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
    }
}

impl Counters {
    fn record(&mut self, entry: &CostLogEntry) {
        self.validated += 1;
        self.search_api_calls += u64::from(entry.search_api_calls);
        self.input_tokens += u64::from(entry.total_input_tokens);
        self.output_tokens += u64::from(entry.total_output_tokens);
        *self.by_outcome.entry(entry.outcome).or_insert(0) += 1;
    }

    /// Derived USD cost estimate, per the pricing formula in SPEC_FULL.md §4.9.
    #[must_use]
    pub fn usd_cost(&self) -> f64 {
        let search_cost = self.search_api_calls as f64 * SEARCH_COST_PER_CALL;
        let llm_cost = (self.input_tokens as f64 / 1e6) * LLM_INPUT_COST_PER_MILLION
            + (self.output_tokens as f64 / 1e6) * LLM_OUTPUT_COST_PER_MILLION;
        search_cost + llm_cost
    }
}

/// Activity state for a single worker, as shown on the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerActivity {
    /// Human-readable activity string, e.g. `"Validating"`, `"Waiting (idle)"`.
    pub activity: String,
    /// Whether the worker currently holds a lease.
    pub is_active: bool,
    /// When this activity was last updated.
    pub last_update: DateTime<Utc>,
}

/// A point-in-time view of the tracker's state, as pulled by the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostSnapshot {
    /// Counters since process start.
    pub session: Counters,
    /// Counters reloaded from the persisted cost log at start, plus everything since.
    pub historical: Counters,
    /// When this process started.
    pub started_at: DateTime<Utc>,
    /// Per-worker activity, keyed by worker index.
    pub workers: HashMap<usize, WorkerActivity>,
}

struct Inner {
    session: Counters,
    historical: Counters,
    workers: HashMap<usize, WorkerActivity>,
}

/// Process-wide cost/telemetry singleton. Cloneable handle; all clones share the same state.
#[derive(Clone)]
pub struct CostTracker {
    inner: std::sync::Arc<Mutex<Inner>>,
    snapshot_tx: watch::Sender<CostSnapshot>,
    started_at: DateTime<Utc>,
    cost_log_path: PathBuf,
    log_lock: std::sync::Arc<Mutex<()>>,
}

impl CostTracker {
    /// Construct a tracker, reloading historical counters from `cost_log_path` if it exists.
    /// Reload failures are logged and treated as "no history" rather than fatal, since the cost
    /// log is best-effort (§7: "a failure to append is logged but does not affect the
    /// transaction outcome").
    pub fn init(cost_log_path: impl AsRef<Path>) -> Self {
        let cost_log_path = cost_log_path.as_ref().to_path_buf();
        let historical = load_historical(&cost_log_path);
        let started_at = Utc::now();

        let snapshot = CostSnapshot {
            session: Counters::default(),
            historical: historical.clone(),
            started_at,
            workers: HashMap::new(),
        };
        let (snapshot_tx, _rx) = watch::channel(snapshot);

        Self {
            inner: std::sync::Arc::new(Mutex::new(Inner {
                session: Counters::default(),
                historical,
                workers: HashMap::new(),
            })),
            snapshot_tx,
            started_at,
            cost_log_path,
            log_lock: std::sync::Arc::new(Mutex::new(())),
        }
    }

    /// Subscribe to snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<CostSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Pull the current snapshot.
    pub fn snapshot(&self) -> CostSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Record one completed validation's cost entry, update counters, append to the cost log,
    /// and publish a fresh snapshot. Called after the owning transaction has committed
    /// (§5: "Cost-tracker updates for a given validation happen after its transaction commits").
    pub fn record(&self, entry: &CostLogEntry) {
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.session.record(entry);
            inner.historical.record(entry);
        }
        if let Err(err) = self.append_cost_log(entry) {
            tracing::warn!(error = %err, "failed to append cost log entry");
        }
        self.publish();
    }

    /// Mark a worker's current activity (e.g. `"Validating"`, `"Waiting (idle)"`,
    /// `"Error (retrying)"`).
    pub fn mark_worker(&self, worker_idx: usize, activity: impl Into<String>, is_active: bool) {
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.workers.insert(
                worker_idx,
                WorkerActivity {
                    activity: activity.into(),
                    is_active,
                    last_update: Utc::now(),
                },
            );
        }
        self.publish();
    }

    fn publish(&self) {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let snapshot = CostSnapshot {
            session: inner.session.clone(),
            historical: inner.historical.clone(),
            started_at: self.started_at,
            workers: inner.workers.clone(),
        };
        let _ = self.snapshot_tx.send(snapshot);
    }

    fn append_cost_log(&self, entry: &CostLogEntry) -> anyhow::Result<()> {
        let _guard = self.log_lock.lock().unwrap_or_else(|e| e.into_inner());
        let line = serde_json::to_string(entry)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.cost_log_path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

fn load_historical(path: &Path) -> Counters {
    let mut counters = Counters::default();
    let Ok(raw) = std::fs::read_to_string(path) else {
        return counters;
    };
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<CostLogEntry>(line) {
            Ok(entry) => counters.record(&entry),
            Err(err) => {
                tracing::warn!(error = %err, "skipping unparsable cost log line on reload");
            }
        }
    }
    counters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(outcome: Outcome) -> CostLogEntry {
        CostLogEntry {
            prediction_id: 1,
            prediction_text: "x".to_string(),
            search_api_calls: 2,
            query_enhancer_in_tokens: 100,
            query_enhancer_out_tokens: 50,
            result_judge_in_tokens: 200,
            result_judge_out_tokens: 80,
            total_input_tokens: 300,
            total_output_tokens: 130,
            outcome,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn usd_cost_matches_formula() {
        let mut counters = Counters::default();
        counters.record(&entry(Outcome::MaturedTrue));
        let expected = 2.0 * (100.0 / 35_000.0) + (300.0 / 1e6) * 0.30 + (130.0 / 1e6) * 2.50;
        assert!((counters.usd_cost() - expected).abs() < 1e-12);
    }

    #[test]
    fn tracker_records_and_snapshots() {
        let dir = std::env::temp_dir().join(format!("predval-cost-test-{}", std::process::id()));
        let tracker = CostTracker::init(&dir);
        tracker.record(&entry(Outcome::MaturedFalse));
        let snap = tracker.snapshot();
        assert_eq!(snap.session.validated, 1);
        assert_eq!(snap.session.by_outcome.get(&Outcome::MaturedFalse), Some(&1));
        let _ = std::fs::remove_file(&dir);
    }
}
