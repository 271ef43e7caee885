//! Configuration types for the HTTP service

use crate::errors::ConfigError;
use archive_relay_core::{
    archiver::GitArchiverSettings,
    parameters::{ParameterPrefix, DEFAULT_PARAMETER_ROOT},
    RelaySettings,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Webhook endpoint settings
    pub webhook: WebhookConfig,

    /// Archive relay settings
    pub relay: RelayConfig,

    /// Archive storage settings
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Check the configuration for values that would only fail at request time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.webhook.endpoint_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                message: format!(
                    "webhook.endpoint_path '{}' must start with '/'",
                    self.webhook.endpoint_path
                ),
            });
        }

        if self.relay.compression_level > 9 {
            return Err(ConfigError::Invalid {
                message: format!(
                    "relay.compression_level must be between 0 and 9, got {}",
                    self.relay.compression_level
                ),
            });
        }

        self.parameter_prefix()?;

        match self.storage.backend {
            StorageBackend::S3 => {
                if self.storage.bucket.as_deref().map_or(true, str::is_empty) {
                    return Err(ConfigError::Missing {
                        key: "storage.bucket".to_string(),
                    });
                }
            }
            StorageBackend::Filesystem => {
                if self.storage.path.is_none() {
                    return Err(ConfigError::Missing {
                        key: "storage.path".to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Parameter namespace for the configured stage
    pub fn parameter_prefix(&self) -> Result<ParameterPrefix, ConfigError> {
        if self.relay.stage.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "relay.stage".to_string(),
            });
        }

        ParameterPrefix::new(&self.relay.parameter_root, &self.relay.stage).map_err(|e| {
            ConfigError::Invalid {
                message: e.to_string(),
            }
        })
    }

    pub fn relay_settings(&self) -> Result<RelaySettings, ConfigError> {
        Ok(RelaySettings {
            parameter_prefix: self.parameter_prefix()?,
            scratch_dir: self
                .relay
                .scratch_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
        })
    }

    pub fn archiver_settings(&self) -> GitArchiverSettings {
        GitArchiverSettings {
            git_program: self.relay.git_program.clone(),
            compression_level: self.relay.compression_level,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
            max_body_size: 5 * 1024 * 1024, // 5MB
        }
    }
}

/// Webhook endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Webhook endpoint path
    pub endpoint_path: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            endpoint_path: "/webhook".to_string(),
        }
    }
}

/// Archive relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Deployment stage; selects the parameter namespace
    pub stage: String,

    /// Root of the parameter namespace
    pub parameter_root: String,

    /// Directory for transient credential files (system temp dir if unset)
    pub scratch_dir: Option<PathBuf>,

    /// git executable
    pub git_program: PathBuf,

    /// zip compression level passed to `git archive`
    pub compression_level: u8,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let archiver = GitArchiverSettings::default();
        Self {
            stage: String::new(), // Must be provided
            parameter_root: DEFAULT_PARAMETER_ROOT.to_string(),
            scratch_dir: None,
            git_program: archiver.git_program,
            compression_level: archiver.compression_level,
        }
    }
}

/// Where archives are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    S3,
    Filesystem,
}

/// Archive storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Bucket name (`s3` backend)
    pub bucket: Option<String>,

    /// Base directory (`filesystem` backend)
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
