//! Two termination-signal handling, per SPEC_FULL.md §4.11: the Supervisor honours SIGINT and
//! SIGTERM, both routed through the same graceful-then-immediate escalation (first signal of
//! either kind requests a graceful drain; a second signal of either kind forces an immediate
//! exit) so a CI/process-supervisor SIGTERM behaves the same as an operator's CTRL+C.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::mpsc;

#[derive(Debug, Default)]
pub struct ShutdownController {
    forced: AtomicU8,
}

#[derive(Debug, Clone, Copy)]
pub enum ShutdownEvent {
    Graceful,
    Immediate,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump_forced(&self) -> u8 {
        self.forced.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn signal_received(shutdown: &Arc<ShutdownController>, shutdown_tx: &mpsc::UnboundedSender<ShutdownEvent>) -> bool {
    let n = shutdown.bump_forced();
    if n == 1 {
        let _ = shutdown_tx.send(ShutdownEvent::Graceful);
        true
    } else {
        let _ = shutdown_tx.send(ShutdownEvent::Immediate);
        false
    }
}

/// Install handlers for both termination signals. On Unix this is SIGINT and SIGTERM; on other
/// platforms only CTRL+C (SIGINT's equivalent) is available.
pub fn spawn_signal_handlers(
    shutdown: Arc<ShutdownController>,
    shutdown_tx: mpsc::UnboundedSender<ShutdownEvent>,
) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(_) => return,
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => return,
        };
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }
                if !signal_received(&shutdown, &shutdown_tx) {
                    return;
                }
            }
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                if !signal_received(&shutdown, &shutdown_tx) {
                    return;
                }
            }
        });
    }
}
