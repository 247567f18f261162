//! Server configuration module
//!
//! Handles loading configuration from environment variables with sensible defaults.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use crate::backfill::DEFAULT_BATCH_SIZE;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3000)
    pub port: u16,
    /// Server host (default: 127.0.0.1)
    pub host: IpAddr,
    /// PostgreSQL URL; in-memory storage when unset
    pub database_url: Option<String>,
    /// Database connection pool maximum connections (default: 20)
    pub database_max_connections: u32,
    /// Database connection pool minimum connections (default: 2)
    pub database_min_connections: u32,
    /// Root directory of the document library (default: ./library)
    pub library_root: PathBuf,
    /// Allowed CORS origins, comma-separated (default: allow all in dev)
    pub allowed_origins: Option<Vec<String>>,
    /// Request body limit in KB (default: 64)
    pub body_limit_kb: usize,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Enable rate limiting (default: false for tests, true when loaded from env)
    pub rate_limit_enabled: bool,
    /// Rate limit: requests per second (default: 10)
    pub rate_limit_per_sec: u64,
    /// Rate limit: burst size (default: 20)
    pub rate_limit_burst: u32,
    /// Serve Swagger UI at /docs
    pub enable_docs: bool,
    /// Documents per backfill batch (default: 50)
    pub backfill_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            database_url: None,
            database_max_connections: 20,
            database_min_connections: 2,
            library_root: PathBuf::from("./library"),
            allowed_origins: None, // None = allow all (dev mode)
            body_limit_kb: 64,
            timeout_secs: 30,
            rate_limit_enabled: false, // Disabled by default (for tests)
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
            enable_docs: false,
            backfill_batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = match std::env::var("HOST") {
            Ok(h) => h.parse().unwrap_or_else(|_| {
                tracing::warn!(host = %h, "Invalid HOST, falling back to 127.0.0.1");
                defaults.host
            }),
            Err(_) => defaults.host,
        };

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let allowed_origins = std::env::var("ALLOWED_ORIGINS").ok().map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        // Rate limiting enabled by default in production, can be disabled with RATE_LIMIT_ENABLED=false
        let rate_limit_enabled = std::env::var("RATE_LIMIT_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let enable_docs = std::env::var("ENABLE_DOCS")
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(defaults.enable_docs);

        Self {
            port: env_parse("PORT").unwrap_or(defaults.port),
            host,
            database_url,
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            database_min_connections: env_parse("DATABASE_MIN_CONNECTIONS")
                .unwrap_or(defaults.database_min_connections),
            library_root: std::env::var("LIBRARY_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.library_root),
            allowed_origins,
            body_limit_kb: env_parse("BODY_LIMIT_KB").unwrap_or(defaults.body_limit_kb),
            timeout_secs: env_parse("REQUEST_TIMEOUT_SECS").unwrap_or(defaults.timeout_secs),
            rate_limit_enabled,
            rate_limit_per_sec: env_parse("RATE_LIMIT_PER_SEC")
                .unwrap_or(defaults.rate_limit_per_sec),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST").unwrap_or(defaults.rate_limit_burst),
            enable_docs,
            backfill_batch_size: env_parse("BACKFILL_BATCH_SIZE")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.backfill_batch_size),
        }
    }

    /// Get socket address from config
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
