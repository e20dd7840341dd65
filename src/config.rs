use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LINK_BASE_URL: &str = "http://localhost:3000/recover";
pub const DEFAULT_STORAGE_TIMEOUT_MS: u64 = 5_000;

/// When a record's recovery link is (re)generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkPolicy {
    /// Generated once when the record is opened; already-sent links stay valid.
    #[default]
    Once,
    /// Replaced on every counted retry attempt.
    PerRetry,
}

/// Settings shared by every subcommand that touches the record store.
#[derive(Debug, Clone, Args)]
pub struct EngineConfig {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "AUTORECOVER_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Base URL recovery links are minted under.
    #[arg(long, env = "AUTORECOVER_LINK_BASE_URL", default_value = DEFAULT_LINK_BASE_URL)]
    pub link_base_url: String,

    /// Whether a retry attempt replaces the recovery link.
    #[arg(long, env = "AUTORECOVER_LINK_POLICY", value_enum, default_value_t = LinkPolicy::Once)]
    pub link_policy: LinkPolicy,

    /// Upper bound for any single storage operation, in milliseconds.
    #[arg(long, env = "AUTORECOVER_STORAGE_TIMEOUT_MS", default_value_t = DEFAULT_STORAGE_TIMEOUT_MS)]
    pub storage_timeout_ms: u64,
}

impl EngineConfig {
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServeConfig {
    /// Address the HTTP API listens on.
    #[arg(long, env = "AUTORECOVER_ADDR", default_value = "127.0.0.1:3000")]
    pub addr: SocketAddr,

    /// Events CSV replayed into the store before the server starts accepting requests.
    #[arg(long)]
    pub seed_events: Option<PathBuf>,
}
