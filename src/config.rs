//! API server configuration loaded from environment variables

use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    /// Upper bound on every sales-history query
    pub source_timeout: Duration,
    /// Age after which a `processing` report is considered stalled
    pub stale_report_age: chrono::Duration,
    pub reap_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup, so tests need not touch the process env
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;

        let bind_addr = parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3001)))?;
        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 5u32)?;
        let source_timeout_ms = parse_or(&lookup, "SOURCE_TIMEOUT_MS", 5_000u64)?;
        let stale_minutes = parse_or(&lookup, "STALE_REPORT_MINUTES", 15i64)?;
        let reap_interval_secs = parse_or(&lookup, "REAP_INTERVAL_SECS", 300u64)?;

        Ok(Config {
            database_url,
            bind_addr,
            db_max_connections,
            source_timeout: Duration::from_millis(source_timeout_ms),
            stale_report_age: chrono::Duration::minutes(stale_minutes),
            reap_interval: Duration::from_secs(reap_interval_secs.max(1)),
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
