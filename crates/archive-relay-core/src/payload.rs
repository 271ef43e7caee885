//! # Push Event Payload
//!
//! Typed view of the Bitbucket `repo:refs_changed` webhook body. Only the
//! fields the relay needs are modelled; everything else in the JSON is ignored.

use serde::Deserialize;
use thiserror::Error;

/// Errors produced while decoding a webhook body
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Malformed webhook payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A push notification: one repository and the refs that changed in it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventPayload {
    pub repository: Repository,
    pub changes: Vec<RefChange>,
}

impl EventPayload {
    /// Decode a payload from the raw (already verified) request body.
    pub fn parse(body: &[u8]) -> Result<Self, PayloadError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Changes to branches, in payload order. Tags and unknown ref kinds are
    /// skipped.
    pub fn branch_changes(&self) -> impl Iterator<Item = &RefChange> {
        self.changes
            .iter()
            .filter(|change| change.reference.ref_type == RefType::Branch)
    }

    /// `<project-key>/<repository-name>`, the path used for both the git
    /// remote and the archive key.
    pub fn repository_path(&self) -> String {
        format!("{}/{}", self.repository.project.key, self.repository.name)
    }
}

/// Repository the push happened in
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Repository {
    pub name: String,
    pub project: Project,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Project {
    pub key: String,
}

/// One entry of the `changes` array
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefChange {
    #[serde(rename = "ref")]
    pub reference: Ref,

    /// Commit the ref pointed at before the push
    #[serde(default)]
    pub from_hash: Option<String>,

    /// Commit the ref points at after the push
    #[serde(default)]
    pub to_hash: Option<String>,
}

impl RefChange {
    /// Branch (or tag) name, e.g. `main` for `refs/heads/main`.
    pub fn display_id(&self) -> &str {
        &self.reference.display_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ref {
    /// Fully qualified ref, e.g. `refs/heads/main`
    pub id: String,
    pub display_id: String,
    #[serde(rename = "type")]
    pub ref_type: RefType,
}

/// Kind of ref that changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefType {
    Branch,
    Tag,
    #[serde(other)]
    Other,
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
