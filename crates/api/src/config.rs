use std::path::PathBuf;

use swatch_core::admission::AdmissionPolicy;
use swatch_core::pipeline::PipelineConfig;
use swatch_core::source::SourceLimits;

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for running imports to stop (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// JWT token configuration.
    pub jwt: JwtConfig,
    /// Import pipeline settings.
    pub import: ImportConfig,
    /// Catalog write service endpoint.
    pub catalog: CatalogConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = env_parse("PORT", 3000);

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_parse("SHUTDOWN_TIMEOUT_SECS", 30),
            jwt: JwtConfig::from_env(),
            import: ImportConfig::from_env(),
            catalog: CatalogConfig::from_env(),
        }
    }
}

/// Import pipeline settings.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub max_concurrent_per_user: i64,
    pub retry_after_secs: u64,
    pub max_upload_bytes: usize,
    pub max_rows: usize,
    /// Catalog writes per second; `0` disables throttling.
    pub rows_per_second: u32,
    pub write_batch_size: usize,
    /// Operator policy for destructive variant pruning.
    pub allow_prune: bool,
    pub idempotency_window_hours: i32,
    pub default_currency: String,
    /// Root directory of the local object store.
    pub storage_dir: PathBuf,
    /// URL prefix under which stored objects are served.
    pub public_base_url: String,
}

impl ImportConfig {
    /// Load import settings from environment variables.
    ///
    /// | Env Var                            | Default                       |
    /// |------------------------------------|-------------------------------|
    /// | `IMPORT_MAX_CONCURRENT_PER_USER`   | `3`                           |
    /// | `IMPORT_RETRY_AFTER_SECS`          | `5`                           |
    /// | `IMPORT_MAX_UPLOAD_BYTES`          | `26214400`                    |
    /// | `IMPORT_MAX_ROWS`                  | `50000`                       |
    /// | `IMPORT_ROWS_PER_SECOND`           | `50`                          |
    /// | `IMPORT_WRITE_BATCH_SIZE`          | `25`                          |
    /// | `IMPORT_ALLOW_PRUNE`               | `false`                       |
    /// | `IMPORT_IDEMPOTENCY_WINDOW_HOURS`  | `24`                          |
    /// | `IMPORT_DEFAULT_CURRENCY`          | `usd`                         |
    /// | `IMPORT_STORAGE_DIR`               | `/tmp/swatch/storage`         |
    /// | `IMPORT_PUBLIC_BASE_URL`           | `http://localhost:3000/files` |
    pub fn from_env() -> Self {
        Self {
            max_concurrent_per_user: env_parse("IMPORT_MAX_CONCURRENT_PER_USER", 3),
            retry_after_secs: env_parse("IMPORT_RETRY_AFTER_SECS", 5),
            max_upload_bytes: env_parse("IMPORT_MAX_UPLOAD_BYTES", 25 * 1024 * 1024),
            max_rows: env_parse("IMPORT_MAX_ROWS", 50_000),
            rows_per_second: env_parse("IMPORT_ROWS_PER_SECOND", 50),
            write_batch_size: env_parse("IMPORT_WRITE_BATCH_SIZE", 25),
            allow_prune: env_flag("IMPORT_ALLOW_PRUNE"),
            idempotency_window_hours: env_parse("IMPORT_IDEMPOTENCY_WINDOW_HOURS", 24),
            default_currency: std::env::var("IMPORT_DEFAULT_CURRENCY")
                .map(|c| c.trim().to_ascii_lowercase())
                .unwrap_or_else(|_| "usd".into()),
            storage_dir: std::env::var("IMPORT_STORAGE_DIR")
                .unwrap_or_else(|_| "/tmp/swatch/storage".into())
                .into(),
            public_base_url: std::env::var("IMPORT_PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000/files".into())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    pub fn admission_policy(&self) -> AdmissionPolicy {
        AdmissionPolicy {
            max_concurrent_per_user: self.max_concurrent_per_user,
            retry_after_secs: self.retry_after_secs,
        }
    }

    pub fn source_limits(&self) -> SourceLimits {
        SourceLimits {
            max_bytes: self.max_upload_bytes,
            max_rows: self.max_rows,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            default_currency: self.default_currency.clone(),
            rows_per_second: self.rows_per_second,
            write_batch_size: self.write_batch_size,
            ..PipelineConfig::default()
        }
    }
}

/// Catalog write service endpoint.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub api_url: String,
    pub api_token: Option<String>,
}

impl CatalogConfig {
    /// | Env Var             | Default                 |
    /// |---------------------|-------------------------|
    /// | `CATALOG_API_URL`   | `http://localhost:9000` |
    /// | `CATALOG_API_TOKEN` | unset                   |
    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var("CATALOG_API_URL")
                .unwrap_or_else(|_| "http://localhost:9000".into())
                .trim_end_matches('/')
                .to_string(),
            api_token: std::env::var("CATALOG_API_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
        }
    }
}

/// Parse an env var, falling back to `default` when unset.
///
/// # Panics
///
/// Panics if the variable is set but does not parse; misconfiguration
/// should fail fast at startup.
fn env_parse<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{name} must be a valid value: {e}")),
        Err(_) => default,
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
