//! Configuration module for WexHub.
//!
//! Typed configuration structs mapping to the YAML configuration file,
//! with loading, defaults, and validation. Secrets (the JWT signing key,
//! the database path) can be overridden through environment variables so
//! they never have to live in the file.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Default maximum accepted upload size (500 MiB)
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 500 * 1024 * 1024;

/// Top-level configuration for WexHub.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub uploads: UploadConfig,
    pub auth: AuthConfig,
    pub rate_limits: RateLimitConfig,
    pub processing: ProcessingConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8420".to_string(),
        }
    }
}

/// Relational store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file. `WEXHUB_DATABASE_PATH` overrides.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/wexhub.db".to_string(),
        }
    }
}

/// Blob storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for the filesystem blob store.
    pub root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: "data/blobs".to_string(),
        }
    }
}

/// Upload pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Hard cap on accepted file size in bytes.
    pub max_file_size_bytes: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
        }
    }
}

/// Token issuing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC key for access-token signatures. `WEXHUB_JWT_SECRET` overrides;
    /// the file value is a development fallback.
    pub jwt_secret: String,
    /// `iss` claim on issued access tokens.
    pub issuer: String,
    /// Access-token lifetime in seconds.
    pub access_token_ttl_secs: u64,
    /// Refresh-token lifetime in days.
    pub refresh_token_ttl_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: "wexhub".to_string(),
            access_token_ttl_secs: 3600,
            refresh_token_ttl_days: 30,
        }
    }
}

/// One fixed-window rate-limit policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Requests admitted per window.
    pub permit_limit: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

/// Fixed-window policies for the upload endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub upload_reserve: RateLimitPolicy,
    pub upload_content: RateLimitPolicy,
    pub upload_commit: RateLimitPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            upload_reserve: RateLimitPolicy {
                permit_limit: 30,
                window_secs: 60,
            },
            upload_content: RateLimitPolicy {
                permit_limit: 60,
                window_secs: 60,
            },
            upload_commit: RateLimitPolicy {
                permit_limit: 30,
                window_secs: 60,
            },
        }
    }
}

/// Processing queue and worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Bounded queue capacity; a full queue rejects version creation.
    pub queue_capacity: usize,
    /// Number of concurrent worker tasks.
    pub worker_count: usize,
    /// How long a worker blocks waiting for a job before re-checking
    /// shutdown, in seconds.
    pub dequeue_timeout_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            worker_count: 2,
            dequeue_timeout_secs: 5,
        }
    }
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from `path`; fall back to defaults (plus env overrides)
    /// on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|_| {
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        })
    }

    /// Applies environment overrides for secret-bearing fields.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("WEXHUB_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(path) = std::env::var("WEXHUB_DATABASE_PATH") {
            self.database.path = path;
        }
    }

    /// Validates startup-critical settings.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.auth.jwt_secret.len() < 32 {
            anyhow::bail!("auth.jwt_secret must be at least 32 bytes (set WEXHUB_JWT_SECRET)");
        }
        if self.uploads.max_file_size_bytes == 0 {
            anyhow::bail!("uploads.max_file_size_bytes must be positive");
        }
        if self.processing.queue_capacity == 0 || self.processing.worker_count == 0 {
            anyhow::bail!("processing.queue_capacity and worker_count must be positive");
        }
        Ok(())
    }
}
