// src/config.rs

//! Application configuration loaded from environment variables.
//!
//! This module defines all startup-time configuration for the service.
//! Configuration is validated eagerly and failures are treated as
//! deployment errors rather than recoverable runtime conditions.

use anyhow::{anyhow, bail, Result};
use std::time::Duration;

// ============================================================
// Local macros (config-only, intentionally explicit)
// ============================================================

/// Reads a required environment variable.
///
/// # Behavior
/// - Fails fast if the variable is missing
/// - Produces a clear, human-readable error message
/// - Intended for startup-time configuration validation
///
/// Missing configuration is treated as a deployment error,
/// not a recoverable runtime condition.
macro_rules! required_env {
    // ---
    ($key:literal) => {
        std::env::var($key)
            .map_err(|_| anyhow::anyhow!(concat!("Missing required configuration: ", $key)))?
    };
}

/// Reads an optional environment variable and attempts to parse it.
///
/// If the variable is missing or cannot be parsed, the provided
/// default value is used. This macro is appropriate for non-critical
/// tuning parameters where fallback behavior is acceptable.
macro_rules! optional_env_parse {
    // ---
    ($key:literal, $ty:ty, $default:expr) => {
        std::env::var($key)
            .ok()
            .and_then(|v| v.parse::<$ty>().ok())
            .unwrap_or($default)
    };
}

#[cfg(test)]
/// Asserts that a configuration constructor fails due to a missing
/// required environment variable.
///
/// This macro is intended for config unit tests only and enforces
/// consistent error messages across failure cases.
macro_rules! assert_missing_config {
    // ---
    ($expr:expr, $key:literal) => {{
        let err = $expr.expect_err("expected configuration error");
        assert!(
            err.to_string()
                .contains(concat!("Missing required configuration: ", $key)),
            "unexpected error: {err}"
        );
    }};
}

// ============================================================
// Public configuration facade
// ============================================================

/// Aggregated application configuration.
///
/// This is the single source of truth for startup configuration.
/// All required configuration is validated eagerly during initialization.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: server::ServerConfig,
    pub storage: storage::StorageConfig,
    pub metrics: metrics::MetricsConfig,
}

impl AppConfig {
    /// Loads and validates all application configuration from the environment.
    ///
    /// # Errors
    /// Returns an error if any required configuration is missing or invalid.
    /// This function is intended to be called exactly once at startup.
    pub fn from_env() -> Result<Self> {
        // ---
        Ok(Self {
            server: server::ServerConfig::from_env()?,
            storage: storage::StorageConfig::from_env()?,
            metrics: metrics::MetricsConfig::from_env()?,
        })
    }
}

// ============================================================
// Server configuration
// ============================================================

mod server {
    // ---
    use super::*;

    /// Listener and service identity.
    #[derive(Debug, Clone)]
    pub struct ServerConfig {
        /// Address the HTTP listener binds to. Defaults to `0.0.0.0:8000`.
        pub bind_addr: String,

        /// Service name reported by `/` and the `app_info` metric.
        pub app_name: String,
    }

    impl Default for ServerConfig {
        fn default() -> Self {
            Self {
                bind_addr: "0.0.0.0:8000".to_string(),
                app_name: "Axum Data Metrics Service".to_string(),
            }
        }
    }

    impl ServerConfig {
        pub fn from_env() -> Result<Self> {
            // ---
            let defaults = Self::default();
            Ok(Self {
                bind_addr: std::env::var("API_BIND_ADDR").unwrap_or(defaults.bind_addr),
                app_name: std::env::var("AXUM_APP_NAME").unwrap_or(defaults.app_name),
            })
        }
    }
}
pub use server::ServerConfig;

// ============================================================
// Storage configuration
// ============================================================

mod storage {
    // ---
    use super::*;

    /// Which repository backend to build at startup.
    #[derive(Debug, Clone)]
    pub enum StorageConfig {
        /// Process-local storage; contents are lost on restart.
        Memory,
        Postgres(DatabaseConfig),
    }

    impl StorageConfig {
        /// Reads `AXUM_STORAGE_TYPE` (`postgres` by default, or `memory`).
        ///
        /// # Errors
        /// Unknown storage types are rejected, as is a Postgres backend
        /// without `DATABASE_URL`.
        pub fn from_env() -> Result<Self> {
            // ---
            let kind = std::env::var("AXUM_STORAGE_TYPE").unwrap_or_else(|_| "postgres".to_string());

            match kind.trim().to_ascii_lowercase().as_str() {
                "memory" => Ok(Self::Memory),
                "postgres" => Ok(Self::Postgres(DatabaseConfig::from_env()?)),
                other => Err(anyhow!("Unsupported AXUM_STORAGE_TYPE: {other} (expected postgres or memory)")),
            }
        }
    }

    /// Database-related configuration derived from environment variables.
    ///
    /// This configuration is required for the Postgres backend and
    /// is validated eagerly during startup.
    #[derive(Debug, Clone)]
    pub struct DatabaseConfig {
        /// PostgreSQL connection string.
        pub database_url: String,

        /// Table holding data items. Defaults to `data_items`.
        pub table: String,

        /// Number of retry attempts when initializing the database schema. Defaults to 50.
        pub retry_count: u32,

        /// Maximum time to wait when acquiring a connection from the pool. Defaults to 30 seconds.
        pub acquire_timeout: Duration,

        /// Minimum number of connections to keep in the pool, even when idle. Defaults to 2.
        pub min_connections: u32,

        /// Maximum number of connections to be open concurrently. Defaults to 15
        pub max_connections: u32,
    }

    impl DatabaseConfig {
        /// Builds a [`DatabaseConfig`] from environment variables.
        ///
        /// # Errors
        /// Returns an error if required configuration is missing or the
        /// table name is not a plain SQL identifier.
        pub fn from_env() -> Result<Self> {
            // ---
            let database_url = required_env!("DATABASE_URL");
            let table = std::env::var("AXUM_DB_TABLE").unwrap_or_else(|_| "data_items".to_string());
            let retry_count = optional_env_parse!("AXUM_DB_RETRY_COUNT", u32, 50);
            let acquire_timeout_secs = optional_env_parse!("AXUM_DB_ACQUIRE_TIMEOUT_SEC", u64, 30);
            let min_connections = optional_env_parse!("AXUM_DB_MIN_CONNECTIONS", u32, 2);
            let max_connections = optional_env_parse!("AXUM_DB_MAX_CONNECTIONS", u32, 15);

            if !is_identifier(&table) {
                bail!("Invalid AXUM_DB_TABLE: {table:?} is not a valid SQL identifier");
            }

            Ok(Self {
                database_url,
                table,
                retry_count,
                acquire_timeout: Duration::from_secs(acquire_timeout_secs),
                min_connections,
                max_connections,
            })
        }
    }

    /// The table name is interpolated into SQL, so only `[A-Za-z_][A-Za-z0-9_]*`
    /// up to Postgres' 63 byte limit is accepted.
    pub(super) fn is_identifier(name: &str) -> bool {
        // ---
        let mut chars = name.chars();
        let Some(first) = chars.next() else {
            return false;
        };

        name.len() <= 63
            && (first.is_ascii_alphabetic() || first == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}
pub use storage::{DatabaseConfig, StorageConfig};

// ============================================================
// Metrics configuration
// ============================================================

mod metrics {
    // ---
    use super::*;
    use std::path::PathBuf;

    /// Metrics collection settings.
    #[derive(Debug, Clone)]
    pub struct MetricsConfig {
        /// System sampler period. Defaults to 5 seconds.
        pub collection_interval: Duration,

        /// Route prefixes that are not instrumented. Defaults to `/metrics`.
        pub exclude_paths: Vec<String>,

        /// Mount point sampled for disk usage. Defaults to `/`.
        pub disk_path: PathBuf,
    }

    impl Default for MetricsConfig {
        fn default() -> Self {
            Self {
                collection_interval: Duration::from_secs(5),
                exclude_paths: vec!["/metrics".to_string()],
                disk_path: PathBuf::from("/"),
            }
        }
    }

    impl MetricsConfig {
        /// Builds a [`MetricsConfig`] from environment variables.
        ///
        /// # Errors
        /// A zero or unparsable collection interval is rejected.
        pub fn from_env() -> Result<Self> {
            // ---
            let defaults = Self::default();

            let collection_interval = match std::env::var("AXUM_METRICS_INTERVAL_SEC") {
                Ok(raw) => match raw.trim().parse::<u64>() {
                    Ok(secs) if secs > 0 => Duration::from_secs(secs),
                    _ => bail!("Invalid AXUM_METRICS_INTERVAL_SEC: {raw:?} must be a positive integer"),
                },
                Err(_) => defaults.collection_interval,
            };

            let exclude_paths = match std::env::var("AXUM_METRICS_EXCLUDE_PATHS") {
                Ok(raw) => raw
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect(),
                Err(_) => defaults.exclude_paths,
            };

            let disk_path = std::env::var("AXUM_METRICS_DISK_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.disk_path);

            Ok(Self {
                collection_interval,
                exclude_paths,
                disk_path,
            })
        }
    }
}
pub use metrics::MetricsConfig;

// ============================================================
// Tests
// ============================================================
