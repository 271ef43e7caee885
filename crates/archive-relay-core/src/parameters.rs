//! # Parameter Store
//!
//! Retrieval of the relay's secrets from a namespaced key-value store.
//!
//! Every invocation fetches a fresh [`ConfigurationBundle`]; nothing is
//! cached between webhook deliveries, so rotated secrets take effect on the
//! next request.

use async_trait::async_trait;
use std::{collections::HashMap, fmt};
use thiserror::Error;
use zeroize::Zeroizing;

/// Default root of the parameter namespace
pub const DEFAULT_PARAMETER_ROOT: &str = "/bitbucket-code-pipeline-integration";

// ============================================================================
// Core Types
// ============================================================================

/// The fixed set of parameters the relay needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterName {
    /// HMAC key shared with Bitbucket
    SigningSecret,
    /// `user@host[:port]` of the git server
    GitAuthority,
    /// Content for the ssh known-hosts file
    KnownHosts,
    /// Private key used to authenticate to the git server
    SshKey,
}

impl ParameterName {
    pub const ALL: [ParameterName; 4] = [
        ParameterName::SigningSecret,
        ParameterName::GitAuthority,
        ParameterName::KnownHosts,
        ParameterName::SshKey,
    ];

    /// Name relative to the prefix, including the leading slash
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::SigningSecret => "/signingSecret",
            Self::GitAuthority => "/gitAuthority",
            Self::KnownHosts => "/knownHosts",
            Self::SshKey => "/sshKey",
        }
    }
}

impl fmt::Display for ParameterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Environment-specific namespace: `<root>/<stage>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterPrefix(String);

impl ParameterPrefix {
    /// Build a prefix from a root path and a stage name.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterStoreError::InvalidPrefix`] when the stage is empty
    /// or contains a `/`, or the root does not start with `/`.
    pub fn new(root: &str, stage: &str) -> Result<Self, ParameterStoreError> {
        let stage = stage.trim();
        if stage.is_empty() {
            return Err(ParameterStoreError::InvalidPrefix {
                reason: "stage cannot be empty".to_string(),
            });
        }

        if stage.contains('/') {
            return Err(ParameterStoreError::InvalidPrefix {
                reason: format!("stage '{}' must not contain '/'", stage),
            });
        }

        if !root.starts_with('/') {
            return Err(ParameterStoreError::InvalidPrefix {
                reason: format!("root '{}' must start with '/'", root),
            });
        }

        Ok(Self(format!("{}/{}", root.trim_end_matches('/'), stage)))
    }

    /// Prefix under the default root
    pub fn for_stage(stage: &str) -> Result<Self, ParameterStoreError> {
        Self::new(DEFAULT_PARAMETER_ROOT, stage)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fully qualified name of a parameter
    pub fn qualify(&self, name: ParameterName) -> String {
        format!("{}{}", self.0, name.suffix())
    }
}

impl fmt::Display for ParameterPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Secret string that is wiped on drop and never printed
#[derive(Clone)]
pub struct SecretValue {
    inner: Zeroizing<String>,
}

impl SecretValue {
    pub fn from_string(value: String) -> Self {
        Self {
            inner: Zeroizing::new(value),
        }
    }

    /// Get secret as string (only for immediate use)
    pub fn expose_secret(&self) -> &str {
        &self.inner
    }

    pub fn expose_bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl From<&str> for SecretValue {
    fn from(value: &str) -> Self {
        Self::from_string(value.to_string())
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValue")
            .field("length", &self.len())
            .field("value", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Interface Traits
// ============================================================================

/// Interface for a namespaced parameter store
///
/// Implementations return decrypted values keyed by the fully qualified names
/// that were requested. Names the store does not know are simply absent from
/// the result; completeness is checked by [`ConfigurationBundle::fetch`].
#[async_trait]
pub trait ParameterStore: Send + Sync {
    async fn get_parameters(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, SecretValue>, ParameterStoreError>;
}

// ============================================================================
// Configuration Bundle
// ============================================================================

/// The relay's secrets for a single invocation
#[derive(Debug, Clone)]
pub struct ConfigurationBundle {
    signing_secret: SecretValue,
    git_authority: SecretValue,
    known_hosts: SecretValue,
    ssh_key: SecretValue,
}

impl ConfigurationBundle {
    /// Fetch all parameters under `prefix`.
    ///
    /// # Errors
    ///
    /// - [`ParameterStoreError::MissingParameters`] if any parameter is absent
    /// - [`ParameterStoreError::EmptyParameter`] if any value is empty
    /// - whatever the store itself reports
    pub async fn fetch(
        store: &dyn ParameterStore,
        prefix: &ParameterPrefix,
    ) -> Result<Self, ParameterStoreError> {
        let names: Vec<String> = ParameterName::ALL
            .iter()
            .map(|name| prefix.qualify(*name))
            .collect();

        let mut values = store.get_parameters(&names).await?;

        let missing: Vec<String> = names
            .iter()
            .filter(|name| !values.contains_key(*name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ParameterStoreError::MissingParameters { names: missing });
        }

        let mut take = |name: ParameterName| -> Result<SecretValue, ParameterStoreError> {
            let qualified = prefix.qualify(name);
            match values.remove(&qualified) {
                Some(value) if !value.is_empty() => Ok(value),
                Some(_) => Err(ParameterStoreError::EmptyParameter { name: qualified }),
                None => Err(ParameterStoreError::MissingParameters {
                    names: vec![qualified],
                }),
            }
        };

        Ok(Self {
            signing_secret: take(ParameterName::SigningSecret)?,
            git_authority: take(ParameterName::GitAuthority)?,
            known_hosts: take(ParameterName::KnownHosts)?,
            ssh_key: take(ParameterName::SshKey)?,
        })
    }

    pub fn signing_secret(&self) -> &SecretValue {
        &self.signing_secret
    }

    pub fn git_authority(&self) -> &str {
        self.git_authority.expose_secret()
    }

    pub fn known_hosts(&self) -> &SecretValue {
        &self.known_hosts
    }

    pub fn ssh_key(&self) -> &SecretValue {
        &self.ssh_key
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Parameter store and configuration errors
#[derive(Debug, Error)]
pub enum ParameterStoreError {
    #[error("Could not retrieve parameters: {}", names.join(", "))]
    MissingParameters { names: Vec<String> },

    #[error("Parameter is empty: {name}")]
    EmptyParameter { name: String },

    #[error("Invalid parameter prefix: {reason}")]
    InvalidPrefix { reason: String },

    #[error("Parameter store unavailable: {message}")]
    ServiceUnavailable { message: String },
}

#[cfg(test)]
#[path = "parameters_tests.rs"]
mod tests;
