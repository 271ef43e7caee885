//! # In-Memory Parameter Store
//!
//! Thread-safe in-memory [`ParameterStore`] for testing and development.

use crate::parameters::{ParameterStore, ParameterStoreError, SecretValue};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, RwLock,
    },
};

/// In-memory parameter store keyed by fully qualified parameter name
#[derive(Clone, Default)]
pub struct InMemoryParameterStore {
    parameters: Arc<RwLock<HashMap<String, String>>>,
    fetches: Arc<AtomicUsize>,
}

impl InMemoryParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store pre-populated with parameters
    pub fn with_parameters<I, K, V>(parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        {
            let mut map = store.parameters.write().unwrap();
            for (name, value) in parameters {
                map.insert(name.into(), value.into());
            }
        }
        store
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.parameters
            .write()
            .unwrap()
            .insert(name.into(), value.into());
    }

    pub fn remove(&self, name: &str) {
        self.parameters.write().unwrap().remove(name);
    }

    /// Number of `get_parameters` calls served so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParameterStore for InMemoryParameterStore {
    async fn get_parameters(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, SecretValue>, ParameterStoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let parameters = self.parameters.read().unwrap();
        Ok(names
            .iter()
            .filter_map(|name| {
                parameters
                    .get(name)
                    .map(|value| (name.clone(), SecretValue::from_string(value.clone())))
            })
            .collect())
    }
}
