//! Process-environment configuration, per SPEC_FULL.md §4.12.
//!
//! Generalized from the reference client's `ensure_submitter_config` ("load, else prompt
//! interactively, else fall back to defaults") to "fail fast, fail loud": this system has no
//! interactive operator, so a missing required variable is a fatal start-up error before any
//! database connection is opened or worker spawned. `clap`'s own `env`-backed `Parser::parse`
//! already prints a clear diagnostic naming the missing variable(s) and exits non-zero, which is
//! exactly the posture §6/§7 call for.

use std::path::PathBuf;

use clap::Parser;
use reqwest::Url;

/// Validated process-environment configuration for the engine + supervisor.
#[derive(Debug, Clone, Parser)]
#[command(name = "predval", version, about = "Prediction-validation worker pool")]
pub struct Settings {
    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// API key for the web-search provider.
    #[arg(long, env = "SEARCH_API_KEY")]
    pub search_api_key: String,

    /// API key for the chat-completion provider.
    #[arg(long, env = "CHAT_API_KEY")]
    pub chat_api_key: String,

    /// Number of workers to run concurrently.
    #[arg(long, env = "WORKER_COUNT", default_value_t = Self::DEFAULT_WORKER_COUNT)]
    pub worker_count: usize,

    /// Log level filter (e.g. `info`, `debug`, `predval_core=debug,info`).
    #[arg(long, env = "LOG_LEVEL", default_value = Self::DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    /// Path to the append-only cost log.
    #[arg(long, env = "COST_LOG_PATH", default_value = Self::DEFAULT_COST_LOG_PATH)]
    pub cost_log_path: PathBuf,

    /// Override base URL for the chat-completion endpoint.
    #[arg(long, env = "CHAT_API_BASE_URL")]
    pub chat_api_base_url: Option<Url>,

    /// Override base URL for the web-search endpoint.
    #[arg(long, env = "SEARCH_API_BASE_URL")]
    pub search_api_base_url: Option<Url>,

    /// Database pool size. Defaults to `worker_count + 2`, giving the Leaser's own queries
    /// head-room per §5.
    #[arg(long, env = "DB_POOL_SIZE")]
    pub db_pool_size: Option<u32>,

    /// Reserved; not bound by the core itself (see spec Non-goals).
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,
}

impl Settings {
    /// Default worker count, per §4.11/§4.12.
    pub const DEFAULT_WORKER_COUNT: usize = 10;
    /// Default log level filter.
    pub const DEFAULT_LOG_LEVEL: &'static str = "info";
    /// Default cost log path.
    pub const DEFAULT_COST_LOG_PATH: &'static str = "costs.json";

    /// Effective DB pool size: the configured override, or `worker_count + 2`.
    #[must_use]
    pub fn effective_db_pool_size(&self) -> u32 {
        self.db_pool_size
            .unwrap_or_else(|| self.worker_count as u32 + 2)
    }

    /// Default chat-completion base URL, used when `chat_api_base_url` is unset.
    #[must_use]
    pub fn chat_base_url(&self) -> Url {
        self.chat_api_base_url
            .clone()
            .unwrap_or_else(|| Url::parse("https://api.openai.com/v1/chat/completions").unwrap())
    }

    /// Default web-search base URL, used when `search_api_base_url` is unset.
    #[must_use]
    pub fn search_base_url(&self) -> Url {
        self.search_api_base_url
            .clone()
            .unwrap_or_else(|| Url::parse("https://serpapi.com/search").unwrap())
    }
}

/// Parse and validate settings from the process environment, exiting non-zero with a clear
/// message if a required variable is missing — the "Config missing → Fatal" row of §7.
#[must_use]
pub fn load() -> Settings {
    Settings::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_pool_size_defaults_to_worker_count_plus_two() {
        let settings = Settings {
            database_url: "postgres://localhost/db".to_string(),
            search_api_key: "k".to_string(),
            chat_api_key: "k".to_string(),
            worker_count: 10,
            log_level: "info".to_string(),
            cost_log_path: PathBuf::from("costs.json"),
            chat_api_base_url: None,
            search_api_base_url: None,
            db_pool_size: None,
            port: None,
        };
        assert_eq!(settings.effective_db_pool_size(), 12);
    }

    #[test]
    fn db_pool_size_override_is_respected() {
        let settings = Settings {
            database_url: "postgres://localhost/db".to_string(),
            search_api_key: "k".to_string(),
            chat_api_key: "k".to_string(),
            worker_count: 10,
            log_level: "info".to_string(),
            cost_log_path: PathBuf::from("costs.json"),
            chat_api_base_url: None,
            search_api_base_url: None,
            db_pool_size: Some(50),
            port: None,
        };
        assert_eq!(settings.effective_db_pool_size(), 50);
    }
}
