//! Minimal, non-interactive console consumer of the Supervisor's event stream, per
//! SPEC_FULL.md §4.16. Deliberately not a TUI: one line per worker-stage transition and per
//! completed validation, plus a periodic one-line cost/throughput summary. A richer dashboard
//! is expected to attach to the same broadcast channel independently.

use std::time::Duration;

use predval_core::SupervisorHandle;
use predval_core::api::SupervisorEvent;
use predval_core::worker::WorkerEvent;
use tokio::sync::broadcast;

const SUMMARY_INTERVAL: Duration = Duration::from_secs(30);

/// Drain `events` until the Supervisor reports `Stopped`, printing one line per transition and
/// a periodic cost summary pulled from `handle`.
pub async fn run(handle: &SupervisorHandle, events: &mut broadcast::Receiver<SupervisorEvent>) {
    let mut summary = tokio::time::interval(SUMMARY_INTERVAL);
    summary.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = summary.tick() => {
                print_summary(handle);
            }
            evt = events.recv() => {
                match evt {
                    Ok(SupervisorEvent::Started) => {
                        println!("supervisor started");
                    }
                    Ok(SupervisorEvent::StopRequested) => {
                        println!("shutdown requested; finishing in-flight validations");
                    }
                    Ok(SupervisorEvent::Worker(worker_event)) => print_worker_event(worker_event),
                    Ok(SupervisorEvent::Stopped) => {
                        print_summary(handle);
                        println!("supervisor stopped");
                        return;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "console consumer lagged behind event stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    }
}

fn print_worker_event(event: WorkerEvent) {
    match event {
        WorkerEvent::LeaseAcquired { worker_idx, prediction_id } => {
            println!("worker {worker_idx}: leased prediction {prediction_id}");
        }
        WorkerEvent::QueueEmpty { worker_idx } => {
            tracing::debug!(worker_idx, "queue empty");
        }
        WorkerEvent::ValidationCompleted { worker_idx, prediction_id, outcome } => {
            println!("worker {worker_idx}: prediction {prediction_id} -> {outcome:?}");
        }
        WorkerEvent::RecoverableError { worker_idx, message } => {
            tracing::warn!(worker_idx, error = %message, "worker retrying after error");
        }
    }
}

fn print_summary(handle: &SupervisorHandle) {
    let snapshot = handle.snapshot();
    let session = &snapshot.cost.session;
    println!(
        "cost summary: validated={} search_calls={} tokens_in={} tokens_out={} usd=${:.4}",
        session.validated,
        session.search_api_calls,
        session.input_tokens,
        session.output_tokens,
        session.usd_cost(),
    );
}
