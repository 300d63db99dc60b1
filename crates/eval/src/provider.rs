//! Configuration providers.
//!
//! The engine looks configurations up by name through
//! [`ConfigurationProvider`]. Where configurations come from (files, a
//! database, an admin API) is the provider's business.

use std::collections::BTreeMap;
use std::sync::Arc;

use recordlink_interchange::ConfigDocument;

use crate::configuration::ConfigurationSet;
use crate::error::MatchError;

pub trait ConfigurationProvider: Send + Sync {
    /// A single configuration or a collection, or `None` when unknown.
    fn get_configuration(&self, name: &str) -> Option<Arc<ConfigurationSet>>;
}

/// Provider over configurations registered in memory, keyed by id.
#[derive(Debug, Default)]
pub struct InMemoryConfigurationProvider {
    configurations: BTreeMap<String, Arc<ConfigurationSet>>,
}

impl InMemoryConfigurationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a runtime configuration under its id, replacing any
    /// previous one.
    pub fn register(&mut self, set: ConfigurationSet) {
        self.configurations
            .insert(set.id().to_string(), Arc::new(set));
    }

    pub fn register_document(&mut self, document: &ConfigDocument) -> Result<String, MatchError> {
        let set = ConfigurationSet::from_document(document)?;
        let id = set.id().to_string();
        self.register(set);
        Ok(id)
    }

    /// Parse, validate and register a JSON configuration document. Returns
    /// its id.
    pub fn load_json(&mut self, document: &serde_json::Value) -> Result<String, MatchError> {
        let document = recordlink_interchange::from_json(document)?;
        self.register_document(&document)
    }

    pub fn load_str(&mut self, text: &str) -> Result<String, MatchError> {
        let document = recordlink_interchange::from_str(text)?;
        self.register_document(&document)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.configurations.keys().map(String::as_str)
    }
}

impl ConfigurationProvider for InMemoryConfigurationProvider {
    fn get_configuration(&self, name: &str) -> Option<Arc<ConfigurationSet>> {
        self.configurations.get(name).cloned()
    }
}
