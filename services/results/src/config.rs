use crate::results_packager::DEFAULT_RUN_DIR_PREFIX;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// S3 rejects multipart parts smaller than this (except the last one)
const MIN_PART_SIZE_BYTES: usize = 5 * 1024 * 1024;

/// Errors that can occur during configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),
}

/// Main configuration for the results service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// S3 configuration
    pub s3: S3Config,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Results packaging configuration
    #[serde(default)]
    pub packaging: PackagingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Prometheus exporter port; no exporter when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

/// S3 results storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// S3 bucket name for results archives
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Lifetime of presigned download URLs in seconds (24h default)
    #[serde(default = "default_download_url_expiry_secs")]
    pub download_url_expiry_secs: u64,
    /// Multipart upload threshold in bytes (5MB default)
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold_bytes: usize,
    /// Part size for multipart uploads in bytes (5MB default)
    #[serde(default = "default_part_size")]
    pub part_size_bytes: usize,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default)]
    pub run_migrations: bool,
}

/// Results packaging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PackagingConfig {
    /// Directory name prefix that marks a run output directory
    #[serde(default = "default_run_dir_prefix")]
    pub run_dir_prefix: String,
}

// Default value functions
fn default_service_name() -> String {
    "results-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_download_url_expiry_secs() -> u64 {
    86400
}

fn default_multipart_threshold() -> usize {
    5 * 1024 * 1024
}

fn default_part_size() -> usize {
    5 * 1024 * 1024
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_run_dir_prefix() -> String {
    DEFAULT_RUN_DIR_PREFIX.to_string()
}

impl Config {
    /// Load configuration from config files and environment.
    ///
    /// `extra_file`, when given, is layered above the default file locations
    /// and below environment variables.
    pub fn load(extra_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("service.name", default_service_name())?
            .set_default("service.log_level", default_log_level())?
            .add_source(config::File::with_name("config/results").required(false))
            .add_source(config::File::with_name("/etc/epistemix/results").required(false));

        if let Some(path) = extra_file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        // RESULTS__S3__BUCKET -> s3.bucket
        let config = builder
            .add_source(
                config::Environment::with_prefix("RESULTS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values serde defaults cannot rule out
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.s3.bucket.is_empty() {
            return Err(ConfigError::MissingRequired("s3.bucket".to_string()));
        }

        if self.database.url.is_empty() {
            return Err(ConfigError::MissingRequired("database.url".to_string()));
        }

        if self.packaging.run_dir_prefix.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "packaging.run_dir_prefix".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if self.s3.part_size_bytes < MIN_PART_SIZE_BYTES {
            return Err(ConfigError::InvalidValue {
                key: "s3.part_size_bytes".to_string(),
                message: format!("must be at least {} bytes", MIN_PART_SIZE_BYTES),
            });
        }

        Ok(())
    }

    /// Get presigned download URL lifetime as Duration
    pub fn download_url_expiry(&self) -> Duration {
        Duration::from_secs(self.s3.download_url_expiry_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: None,
        }
    }
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            run_dir_prefix: default_run_dir_prefix(),
        }
    }
}
