//! Binary entry point: load configuration, initialize logging, build the HTTP/DB adapters,
//! start the Supervisor, install two-signal graceful shutdown, and drive the minimal console
//! consumer until the Supervisor has drained, per SPEC_FULL.md §4.12/§4.13/§4.16.

mod console;
mod shutdown;

use std::sync::Arc;

use predval_config::settings::{self, Settings};
use predval_core::chat::HttpChatClient;
use predval_core::db;
use predval_core::pipeline::{Models, Prompts};
use predval_core::search::HttpSearchClient;
use predval_core::settings::{PipelineConfig, WorkerTiming};
use predval_core::{SupervisorConfig, start_supervisor};

use crate::shutdown::{ShutdownController, ShutdownEvent, spawn_signal_handlers};

fn init_logging(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(log_level.to_string()))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config is validated before any logging sink, DB connection, or worker is started — a
    // missing required variable is a fatal start-up error (§7 "Config missing → Fatal").
    let config: Settings = settings::load();
    init_logging(&config.log_level);

    tracing::info!(
        worker_count = config.worker_count,
        pool_size = config.effective_db_pool_size(),
        "starting predval"
    );

    let pool = db::connect(&config.database_url, config.effective_db_pool_size()).await?;

    let http = reqwest::Client::new();
    let chat: Arc<dyn predval_core::chat::ChatClient> = Arc::new(HttpChatClient::new(
        http.clone(),
        config.chat_base_url(),
        config.chat_api_key.clone(),
    ));
    let search: Arc<dyn predval_core::search::SearchClient> = Arc::new(HttpSearchClient::new(
        http,
        config.search_base_url(),
        config.search_api_key.clone(),
    ));

    let handle = start_supervisor(SupervisorConfig {
        pool,
        chat,
        search,
        prompts: Prompts::default(),
        models: Models {
            enhancer: "gpt-4o-mini".to_string(),
            judge: "gpt-4o".to_string(),
        },
        pipeline_config: PipelineConfig::default(),
        timing: WorkerTiming::default(),
        worker_count: config.worker_count,
        cost_log_path: config.cost_log_path.clone(),
    });

    let shutdown = Arc::new(ShutdownController::new());
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::unbounded_channel::<ShutdownEvent>();
    spawn_signal_handlers(shutdown.clone(), shutdown_tx);

    let mut events = handle.subscribe();
    loop {
        tokio::select! {
            () = console::run(&handle, &mut events) => break,
            Some(event) = shutdown_rx.recv() => {
                match event {
                    ShutdownEvent::Graceful => {
                        tracing::info!("shutdown requested; draining in-flight validations");
                        handle.request_stop();
                    }
                    ShutdownEvent::Immediate => {
                        tracing::warn!("second shutdown signal received; exiting immediately");
                        std::process::exit(130);
                    }
                }
            }
        }
    }

    handle.wait().await?;
    tracing::info!("predval exited cleanly");
    Ok(())
}
