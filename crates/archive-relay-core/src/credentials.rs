//! # Transient Credential Files
//!
//! The ssh transport used by `git archive --remote` reads its identity and
//! trusted host keys from files. [`CredentialFiles`] owns a private key file
//! and a known-hosts file under a scratch directory, both with random names,
//! and removes them when dropped, whichever way the caller's scope is left.

use crate::parameters::SecretValue;
use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;

/// Failures while materialising credential files
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Failed to write {kind} file {path}: {source}")]
    Write {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Private key and known-hosts files for a single invocation
///
/// The private key is written once, owner read-only. The known-hosts file is
/// only created by [`refresh_known_hosts`](Self::refresh_known_hosts), which
/// must be called before every ssh connection because ssh may rewrite the
/// file while connecting.
#[derive(Debug)]
pub struct CredentialFiles {
    identity_file: PathBuf,
    known_hosts_file: PathBuf,
}

impl CredentialFiles {
    /// Write the private key to a fresh file under `scratch_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Write`] if the key cannot be written. Any
    /// partially written file is removed before returning.
    pub async fn create(scratch_dir: &Path, ssh_key: &SecretValue) -> Result<Self, CredentialError> {
        // Constructed first so that a failed write below still cleans up.
        let files = Self {
            identity_file: scratch_dir.join(Uuid::new_v4().to_string()),
            known_hosts_file: scratch_dir.join(Uuid::new_v4().to_string()),
        };

        write_private_key(&files.identity_file, ssh_key)
            .await
            .map_err(|source| CredentialError::Write {
                kind: "private key",
                path: files.identity_file.clone(),
                source,
            })?;

        debug!(identity_file = %files.identity_file.display(), "Wrote ssh private key");
        Ok(files)
    }

    /// (Re)write the known-hosts file with the configured content.
    pub async fn refresh_known_hosts(&self, contents: &SecretValue) -> Result<(), CredentialError> {
        fs::write(&self.known_hosts_file, contents.expose_bytes())
            .await
            .map_err(|source| CredentialError::Write {
                kind: "known hosts",
                path: self.known_hosts_file.clone(),
                source,
            })
    }

    pub fn identity_file(&self) -> &Path {
        &self.identity_file
    }

    pub fn known_hosts_file(&self) -> &Path {
        &self.known_hosts_file
    }
}

impl Drop for CredentialFiles {
    fn drop(&mut self) {
        for path in [&self.identity_file, &self.known_hosts_file] {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "Removed credential file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to remove credential file"
                ),
            }
        }
    }
}

async fn write_private_key(path: &Path, ssh_key: &SecretValue) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o400);

    let mut file = options.open(path).await?;
    file.write_all(ssh_key.expose_bytes()).await?;

    // OpenSSH refuses private keys that do not end with a newline.
    if !ssh_key.expose_secret().ends_with('\n') {
        file.write_all(b"\n").await?;
    }

    file.flush().await
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;
