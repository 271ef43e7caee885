//! # AWS Systems Manager Parameter Store Adapter
//!
//! Resolves parameters with `GetParameters`, decrypting `SecureString`
//! values.

use crate::parameters::{ParameterStore, ParameterStoreError, SecretValue};
use async_trait::async_trait;
use aws_sdk_ssm::{error::DisplayErrorContext, Client};
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

/// [`ParameterStore`] backed by AWS SSM Parameter Store
#[derive(Debug, Clone)]
pub struct SsmParameterStore {
    client: Client,
}

impl SsmParameterStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the shared AWS configuration.
    pub fn from_config(config: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(config))
    }
}

#[async_trait]
impl ParameterStore for SsmParameterStore {
    #[instrument(skip(self), fields(count = names.len()))]
    async fn get_parameters(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, SecretValue>, ParameterStoreError> {
        let output = self
            .client
            .get_parameters()
            .set_names(Some(names.to_vec()))
            .with_decryption(true)
            .send()
            .await
            .map_err(|e| ParameterStoreError::ServiceUnavailable {
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let invalid = output.invalid_parameters();
        if !invalid.is_empty() {
            warn!(invalid = ?invalid, "Parameter store reported unknown parameters");
        }

        let parameters: HashMap<String, SecretValue> = output
            .parameters()
            .iter()
            .filter_map(|parameter| {
                let name = parameter.name()?.to_string();
                let value = parameter.value().unwrap_or_default().to_string();
                Some((name, SecretValue::from_string(value)))
            })
            .collect();

        debug!(resolved = parameters.len(), "Fetched parameters");
        Ok(parameters)
    }
}
