//! # Webhook Relay
//!
//! Orchestrates one webhook delivery:
//!
//! ```text
//! body present? -> ping? -> signature present? -> fetch parameters
//!   -> signature matches? -> parse payload -> write private key
//!   -> for each BRANCH change: rewrite known hosts -> archive -> upload
//!   -> remove credential files
//! ```
//!
//! Each guard failure ends the request with a distinct [`RelayError`]. Once
//! credential files exist they are removed on every exit path.

use crate::{
    archiver::{ArchiveError, ArchiveRequest, BranchArchiver},
    credentials::{CredentialError, CredentialFiles},
    parameters::{ConfigurationBundle, ParameterPrefix, ParameterStore, ParameterStoreError},
    payload::{EventPayload, PayloadError},
    signature::{verify_signature, SignatureError, SIGNATURE_HEADER},
    storage::{ArchiveKey, ArchiveStore, StorageError, StoredArchive},
};
use bytes::Bytes;
use std::{collections::HashMap, path::PathBuf, sync::Arc};
use thiserror::Error;
use tracing::{info, instrument};

/// Header naming the Bitbucket event type
pub const EVENT_KEY_HEADER: &str = "x-event-key";

/// Event key of the "Test connection" request sent when a webhook is set up
pub const PING_EVENT_KEY: &str = "diagnostics:ping";

// ============================================================================
// Request / Outcome
// ============================================================================

/// An inbound webhook delivery with case-normalised header names
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    headers: HashMap<String, String>,
    body: Bytes,
}

impl WebhookRequest {
    pub fn new<I, K, V>(headers: I, body: Bytes) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let headers = headers
            .into_iter()
            .map(|(name, value)| (name.as_ref().to_ascii_lowercase(), value.into()))
            .collect();
        Self { headers, body }
    }

    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn event_key(&self) -> Option<&str> {
        self.header(EVENT_KEY_HEADER)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Successful handling of a delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// `diagnostics:ping` acknowledged without further processing
    PingAcknowledged,
    /// Push processed; one entry per uploaded branch archive, in payload order
    Processed { archives: Vec<StoredArchive> },
}

// ============================================================================
// Errors
// ============================================================================

/// Terminal failures of a delivery
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Body missing")]
    MissingBody,

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("Configuration unavailable: {0}")]
    Configuration(#[from] ParameterStoreError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("Credential setup failed: {0}")]
    Credentials(#[from] CredentialError),

    #[error("Archive failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Upload failed: {0}")]
    Upload(StorageError),
}

impl From<StorageError> for RelayError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::ArchiveFailed { source, .. } => Self::Archive(source),
            other => Self::Upload(other),
        }
    }
}

impl RelayError {
    /// Whether the sender caused the failure (bad body or signature)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingBody | Self::Signature(_) | Self::Payload(_)
        )
    }
}

// ============================================================================
// Relay
// ============================================================================

/// Static settings of the relay
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Namespace of the relay's parameters
    pub parameter_prefix: ParameterPrefix,
    /// Directory for transient credential files
    pub scratch_dir: PathBuf,
}

/// Processes webhook deliveries end to end
#[derive(Clone)]
pub struct ArchiveRelay {
    settings: RelaySettings,
    parameters: Arc<dyn ParameterStore>,
    archiver: Arc<dyn BranchArchiver>,
    store: Arc<dyn ArchiveStore>,
}

impl ArchiveRelay {
    pub fn new(
        settings: RelaySettings,
        parameters: Arc<dyn ParameterStore>,
        archiver: Arc<dyn BranchArchiver>,
        store: Arc<dyn ArchiveStore>,
    ) -> Self {
        Self {
            settings,
            parameters,
            archiver,
            store,
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Handle one delivery.
    ///
    /// Parameters are fetched fresh for every call. Uploads that completed
    /// before a later branch failed are not rolled back.
    #[instrument(skip(self, request), fields(event_key = request.event_key().unwrap_or_default()))]
    pub async fn handle(&self, request: &WebhookRequest) -> Result<WebhookOutcome, RelayError> {
        if request.body().is_empty() {
            return Err(RelayError::MissingBody);
        }

        if request.event_key() == Some(PING_EVENT_KEY) {
            info!("Acknowledged ping");
            return Ok(WebhookOutcome::PingAcknowledged);
        }

        let signature = request
            .header(SIGNATURE_HEADER)
            .ok_or(SignatureError::Missing)?;

        let bundle =
            ConfigurationBundle::fetch(self.parameters.as_ref(), &self.settings.parameter_prefix)
                .await?;

        verify_signature(bundle.signing_secret().expose_bytes(), request.body(), signature)?;

        let payload = EventPayload::parse(request.body())?;
        info!(
            repository = %payload.repository_path(),
            changes = payload.changes.len(),
            "Received push event"
        );

        let archives = self.archive_branches(&bundle, &payload).await?;

        Ok(WebhookOutcome::Processed { archives })
    }

    async fn archive_branches(
        &self,
        bundle: &ConfigurationBundle,
        payload: &EventPayload,
    ) -> Result<Vec<StoredArchive>, RelayError> {
        // Dropping `credentials` removes both files, on success and on `?`.
        let credentials = CredentialFiles::create(&self.settings.scratch_dir, bundle.ssh_key()).await?;
        let repository_path = payload.repository_path();
        let mut archives = Vec::new();

        // Strictly sequential: every ssh connection shares the known-hosts
        // file, which ssh may rewrite, so it is restored before each branch.
        for change in payload.branch_changes() {
            credentials.refresh_known_hosts(bundle.known_hosts()).await?;

            let key = ArchiveKey::for_branch(
                &payload.repository.project.key,
                &payload.repository.name,
                change.display_id(),
            )?;

            let request = ArchiveRequest {
                git_authority: bundle.git_authority().to_string(),
                repository_path: repository_path.clone(),
                branch: change.display_id().to_string(),
                identity_file: credentials.identity_file().to_path_buf(),
                known_hosts_file: credentials.known_hosts_file().to_path_buf(),
            };

            let stream = self.archiver.archive_branch(&request).await?;
            let stored = self.store.put_archive(&key, stream).await?;

            info!(
                key = %stored.key,
                size_bytes = stored.size_bytes,
                to_hash = change.to_hash.as_deref().unwrap_or_default(),
                "Uploaded branch archive"
            );
            archives.push(stored);
        }

        Ok(archives)
    }
}

impl std::fmt::Debug for ArchiveRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveRelay")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;
