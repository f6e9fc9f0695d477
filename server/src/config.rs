//! Configuration management for the RSVP server.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Store configuration
    pub database: DatabaseConfig,
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Bearer-token configuration
    pub auth: AuthConfig,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL; without one only the fallback store is used
    pub url: Option<String>,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
    /// Skip the primary store entirely
    pub use_fallback: bool,
    /// Directory where the fallback store persists its collections
    pub fallback_dir: Option<PathBuf>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Comma-separated `token=userId` pairs
    pub tokens: String,
    /// Treat the bearer value itself as the user id
    pub trust_subject: bool,
}

impl DatabaseConfig {
    /// Whether startup should try the primary store.
    #[must_use]
    pub const fn wants_primary(&self) -> bool {
        !self.use_fallback && self.url.is_some()
    }

    /// Connection timeout as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

impl ServerConfig {
    /// `host:port` to bind.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|s| !s.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            database: DatabaseConfig {
                url: non_empty(&lookup, "DATABASE_URL"),
                max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS", 10),
                connect_timeout: parsed(&lookup, "DATABASE_CONNECT_TIMEOUT", 5),
                use_fallback: parsed(&lookup, "USE_FALLBACK_STORE", false),
                fallback_dir: non_empty(&lookup, "FALLBACK_DATA_DIR").map(PathBuf::from),
            },
            server: ServerConfig {
                host: non_empty(&lookup, "HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parsed(&lookup, "PORT", 5000),
                log_level: non_empty(&lookup, "RUST_LOG").unwrap_or_else(|| "info".to_string()),
            },
            auth: AuthConfig {
                tokens: lookup("AUTH_TOKENS").unwrap_or_default(),
                trust_subject: parsed(&lookup, "AUTH_TRUST_SUBJECT", false),
            },
        }
    }
}
