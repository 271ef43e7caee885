//! # Archive Relay Service
//!
//! Binary entry point for the archive relay HTTP service.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes logging
//! - Wires the AWS parameter store, the git archiver and the archive store
//! - Starts the HTTP server from archive-relay-api

use archive_relay_api::{
    start_server, ConfigError, LoggingConfig, ServiceConfig, ServiceError, StorageBackend,
};
use archive_relay_core::{
    adapters::{FilesystemArchiveStore, S3ArchiveStore, SsmParameterStore},
    ArchiveRelay, ArchiveStore, GitArchiver,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable naming an operator-supplied configuration file
const CONFIG_FILE_ENV: &str = "ARCHIVE_RELAY_CONFIG_FILE";

/// Prefix of `AR__SECTION__KEY` configuration variables
const ENV_PREFIX: &str = "AR";

#[tokio::main]
async fn main() {
    let loaded = load_configuration(
        std::env::var(CONFIG_FILE_ENV).ok().as_deref(),
        std::env::var("AWS_STAGE").ok(),
        std::env::var("S3_BUCKET").ok(),
    );

    init_logging(loaded.as_ref().map(|c| &c.logging).ok());

    let service_config = match loaded.and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => exit_with(ServiceError::Configuration(e)),
    };

    info!("Starting archive relay service");

    let relay = match build_relay(&service_config).await {
        Ok(relay) => relay,
        Err(e) => exit_with(e),
    };

    info!(
        host = %service_config.server.host,
        port = service_config.server.port,
        endpoint = %service_config.webhook.endpoint_path,
        "Starting HTTP server"
    );

    if let Err(e) = start_server(service_config, Arc::new(relay)).await {
        exit_with(e);
    }
}

fn exit_with(e: ServiceError) -> ! {
    error!(error = %e, "Archive relay service failed");
    std::process::exit(e.exit_code());
}

/// Build the layered service configuration.
///
/// Sources, later ones overriding earlier ones:
///  1. `/etc/archive-relay/service.yaml`
///  2. `./config/service.yaml`
///  3. `explicit_path`, which must exist when given
///  4. `AR__SECTION__KEY` environment variables
///  5. `AWS_STAGE` and `S3_BUCKET`, mapped onto `relay.stage` and
///     `storage.bucket`
fn load_configuration(
    explicit_path: Option<&str>,
    stage: Option<String>,
    bucket: Option<String>,
) -> Result<ServiceConfig, ConfigError> {
    let invalid = |e: config::ConfigError| ConfigError::Invalid {
        message: e.to_string(),
    };

    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/archive-relay/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Some(path) = explicit_path.filter(|p| !p.is_empty()) {
        builder = builder.add_source(
            config::File::with_name(path)
                .required(true)
                .format(config::FileFormat::Yaml),
        );
    }

    builder = builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .set_override_option("relay.stage", stage.filter(|s| !s.is_empty()))
        .map_err(invalid)?
        .set_override_option("storage.bucket", bucket.filter(|b| !b.is_empty()))
        .map_err(invalid)?;

    builder
        .build()
        .map_err(invalid)?
        .try_deserialize()
        .map_err(invalid)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(logging: Option<&LoggingConfig>) {
    let default_level = logging.map_or("info", |l| l.level.as_str());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "archive_relay_service={level},archive_relay_api={level},archive_relay_core={level},tower_http=info",
            level = default_level
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.is_some_and(|l| l.json_format) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wire the relay's collaborators from configuration
async fn build_relay(config: &ServiceConfig) -> Result<ArchiveRelay, ServiceError> {
    let sdk_config = aws_config::load_from_env().await;

    let archive_store: Arc<dyn ArchiveStore> = match config.storage.backend {
        StorageBackend::S3 => {
            let bucket = config.storage.bucket.clone().ok_or(ConfigError::Missing {
                key: "storage.bucket".to_string(),
            })?;
            let store = S3ArchiveStore::from_config(&sdk_config, bucket);
            info!(bucket = %store.bucket(), "Writing archives to S3");
            Arc::new(store)
        }
        StorageBackend::Filesystem => {
            let path = config.storage.path.clone().ok_or(ConfigError::Missing {
                key: "storage.path".to_string(),
            })?;
            let store = FilesystemArchiveStore::new(path)
                .await
                .map_err(|e| ConfigError::Invalid {
                    message: e.to_string(),
                })?;
            info!(path = %store.base_path().display(), "Writing archives to the local filesystem");
            Arc::new(store)
        }
    };

    let settings = config.relay_settings()?;
    info!(prefix = %settings.parameter_prefix.as_str(), "Reading parameters from SSM");

    Ok(ArchiveRelay::new(
        settings,
        Arc::new(SsmParameterStore::from_config(&sdk_config)),
        Arc::new(GitArchiver::new(config.archiver_settings())),
        archive_store,
    ))
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
