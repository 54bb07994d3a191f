//! Application configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::api::ApiServerConfig;
use crate::pipeline::{EngineConfig, WorkerPoolConfig};

/// Which persistence backend to run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Durable SQLite store and queue.
    Sqlite,
    /// In-process store and queue; state dies with the process.
    Memory,
}

impl StorageBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ApiServerConfig,
    pub backend: StorageBackend,
    pub database_url: String,
    pub data_dir: PathBuf,
    pub workers: usize,
    pub poll_interval_ms: u64,
    pub stage_timeout_secs: u64,
    pub visibility_timeout_secs: u64,
    pub max_delivery_attempts: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ApiServerConfig::default(),
            backend: StorageBackend::Sqlite,
            database_url: "sqlite:castpipe.db?mode=rwc".to_string(),
            data_dir: PathBuf::from("data"),
            workers: 4,
            poll_interval_ms: 250,
            stage_timeout_secs: 600,
            visibility_timeout_secs: 30 * 60,
            max_delivery_attempts: 5,
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    ///
    /// Supported env vars: `DATABASE_URL`, `CASTPIPE_BACKEND`
    /// ("sqlite"|"memory"), `CASTPIPE_DATA_DIR`, `CASTPIPE_WORKERS`,
    /// `CASTPIPE_POLL_INTERVAL_MS`, `CASTPIPE_STAGE_TIMEOUT_SECS`,
    /// `CASTPIPE_VISIBILITY_TIMEOUT_SECS`,
    /// `CASTPIPE_MAX_DELIVERY_ATTEMPTS`, plus the server's
    /// `API_BIND_ADDRESS`/`API_PORT`.
    pub fn from_env_or_default() -> Self {
        let mut config = Self {
            server: ApiServerConfig::from_env_or_default(),
            ..Self::default()
        };

        if let Some(url) = env_var("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(backend) = env_var("CASTPIPE_BACKEND").and_then(|v| StorageBackend::parse(&v))
        {
            config.backend = backend;
        }
        if let Some(dir) = env_var("CASTPIPE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(workers) = env_var("CASTPIPE_WORKERS").and_then(|v| v.parse().ok()) {
            config.workers = workers;
        }
        if let Some(ms) = env_var("CASTPIPE_POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            config.poll_interval_ms = ms;
        }
        if let Some(secs) = env_var("CASTPIPE_STAGE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            config.stage_timeout_secs = secs;
        }
        if let Some(secs) =
            env_var("CASTPIPE_VISIBILITY_TIMEOUT_SECS").and_then(|v| v.parse().ok())
        {
            config.visibility_timeout_secs = secs;
        }
        if let Some(attempts) =
            env_var("CASTPIPE_MAX_DELIVERY_ATTEMPTS").and_then(|v| v.parse().ok())
        {
            config.max_delivery_attempts = attempts;
        }

        config
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            data_dir: self.data_dir.clone(),
            stage_timeout: Duration::from_secs(self.stage_timeout_secs),
            max_delivery_attempts: self.max_delivery_attempts,
        }
    }

    pub fn worker_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            workers: self.workers,
            poll_interval_ms: self.poll_interval_ms,
        }
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }
}
