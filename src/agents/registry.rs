// src/agents/registry.rs
//! Source name -> adapter lookup. Populated at startup with the built-in
//! adapters and extensible at runtime, so adapters generated for an unseen
//! domain can be registered without a restart.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use super::types::SourceAdapter;
use super::{github::GithubAdapter, google::GoogleAdapter, reddit::RedditAdapter};

#[derive(Default)]
pub struct AdapterRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn SourceAdapter>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in adapters, configured from the environment.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(GoogleAdapter::from_env()));
        registry.register(Arc::new(RedditAdapter::from_env()));
        registry.register(Arc::new(GithubAdapter::from_env()));
        registry
    }

    /// Register (or replace) an adapter under its own name.
    pub fn register(&self, adapter: Arc<dyn SourceAdapter>) {
        let name = adapter.name().to_ascii_lowercase();
        info!(target: "controller", source = %name, "registered adapter");
        self.adapters
            .write()
            .expect("adapter registry lock poisoned")
            .insert(name, adapter);
    }

    /// Case-insensitive lookup by source name.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters
            .read()
            .expect("adapter registry lock poisoned")
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    /// Adapter owning the given domain, if any. Serves the dynamic-generation
    /// path that routes a bare URL to an existing adapter first.
    pub fn resolve_domain(&self, domain: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters
            .read()
            .expect("adapter registry lock poisoned")
            .values()
            .find(|a| a.supports(domain))
            .cloned()
    }

    /// Registered source names, sorted for stable display.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .adapters
            .read()
            .expect("adapter registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
