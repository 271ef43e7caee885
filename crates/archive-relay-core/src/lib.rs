//! # Archive Relay Core
//!
//! Domain logic for turning Bitbucket push notifications into branch archives.
//!
//! A verified push event is parsed, and for every changed branch a zip archive
//! is fetched with `git archive --remote` over ssh and handed to an
//! [`ArchiveStore`](storage::ArchiveStore).
//!
//! ## Architecture
//!
//! The orchestration in [`relay`] depends only on trait abstractions:
//! - [`ParameterStore`](parameters::ParameterStore) resolves the signing secret
//!   and ssh material for every invocation
//! - [`BranchArchiver`](archiver::BranchArchiver) produces the archive stream
//! - [`ArchiveStore`](storage::ArchiveStore) persists it
//!
//! Infrastructure implementations live in [`adapters`] and are injected at
//! runtime.
//!
//! ## Usage
//!
//! ```rust
//! use archive_relay_core::storage::ArchiveKey;
//!
//! let key = ArchiveKey::for_branch("PROJ", "service", "main").unwrap();
//! assert_eq!(key.as_str(), "PROJ/service/main.zip");
//! ```

pub mod adapters;
pub mod archiver;
pub mod credentials;
pub mod parameters;
pub mod payload;
pub mod relay;
pub mod signature;
pub mod storage;

pub use archiver::{ArchiveError, ArchiveRequest, ArchiveStream, BranchArchiver, GitArchiver};
pub use credentials::{CredentialError, CredentialFiles};
pub use parameters::{
    ConfigurationBundle, ParameterName, ParameterPrefix, ParameterStore, ParameterStoreError,
    SecretValue,
};
pub use payload::{EventPayload, PayloadError, RefChange, RefType};
pub use relay::{ArchiveRelay, RelayError, RelaySettings, WebhookOutcome, WebhookRequest};
pub use signature::SignatureError;
pub use storage::{ArchiveKey, ArchiveStore, StorageError, StoredArchive};
