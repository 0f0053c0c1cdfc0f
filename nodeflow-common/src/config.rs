use anyhow::{anyhow, Result};
use std::{env, fmt, time::Duration};

/// Fast-cache backend used for interrupt queues, cancel flags and streaming output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
}

impl CacheBackend {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(anyhow!("Unsupported cache backend: {} (use 'redis' or 'memory')", other)),
        }
    }
}

impl fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheBackend::Redis => write!(f, "redis"),
            CacheBackend::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeflowConfig {
    pub db_url: String,
    pub max_db_connections: u32,
    pub cache_backend: CacheBackend,
    pub redis_url: String,
    /// How often a cancellable run polls the cancel flag.
    pub cancel_check_interval: Duration,
    /// Capacity of the bounded channel behind streamed runs.
    pub stream_buffer: usize,
    pub input_fail_fast: bool,
    pub log_filter: String,
}

impl Default for NodeflowConfig {
    fn default() -> Self {
        Self {
            db_url: "sqlite://data/nodeflow.db".into(),
            max_db_connections: 5,
            cache_backend: CacheBackend::Redis,
            redis_url: "redis://127.0.0.1:6379".into(),
            cancel_check_interval: Duration::from_millis(200),
            stream_buffer: 10,
            input_fail_fast: false,
            log_filter: "info".into(),
        }
    }
}

impl NodeflowConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup, falling back to defaults.
    pub fn from_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let db_url = read("NODEFLOW_DB_URL").unwrap_or(defaults.db_url);

        let max_db_connections = match read("NODEFLOW_MAX_DB_CONNECTIONS") {
            Some(v) => parse_positive::<u32>("NODEFLOW_MAX_DB_CONNECTIONS", &v)?,
            None => defaults.max_db_connections,
        };

        let cache_backend = match read("NODEFLOW_CACHE_BACKEND") {
            Some(v) => CacheBackend::from_str(&v)?,
            None => defaults.cache_backend,
        };

        let redis_url = read("NODEFLOW_REDIS_URL").unwrap_or(defaults.redis_url);

        let cancel_check_interval = match read("NODEFLOW_CANCEL_CHECK_MS") {
            Some(v) => {
                Duration::from_millis(parse_positive::<u64>("NODEFLOW_CANCEL_CHECK_MS", &v)?)
            }
            None => defaults.cancel_check_interval,
        };

        let stream_buffer = match read("NODEFLOW_STREAM_BUFFER") {
            Some(v) => parse_positive::<usize>("NODEFLOW_STREAM_BUFFER", &v)?,
            None => defaults.stream_buffer,
        };

        let input_fail_fast = match read("NODEFLOW_INPUT_FAIL_FAST") {
            Some(v) => parse_bool("NODEFLOW_INPUT_FAIL_FAST", &v)?,
            None => defaults.input_fail_fast,
        };

        let log_filter = read("NODEFLOW_LOG").unwrap_or(defaults.log_filter);

        Ok(Self {
            db_url,
            max_db_connections,
            cache_backend,
            redis_url,
            cancel_check_interval,
            stream_buffer,
            input_fail_fast,
            log_filter,
        })
    }

    /// One-line summary for startup logs.
    pub fn summary(&self) -> String {
        format!(
            "db_url={}, max_db_connections={}, cache_backend={}, cancel_check={}ms, stream_buffer={}, input_fail_fast={}",
            self.db_url,
            self.max_db_connections,
            self.cache_backend,
            self.cancel_check_interval.as_millis(),
            self.stream_buffer,
            self.input_fail_fast,
        )
    }
}

fn parse_positive<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: fmt::Display,
{
    let value = raw
        .parse::<T>()
        .map_err(|e| anyhow!("Invalid {}: {} ({})", key, raw, e))?;
    if value <= T::default() {
        return Err(anyhow!("Invalid {}: must be greater than zero", key));
    }
    Ok(value)
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("Invalid {}: {} (use true/false)", key, other)),
    }
}
