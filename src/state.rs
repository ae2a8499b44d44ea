//! Shared application state for all routes. Built once; nothing in it is written per request.

use crate::config::{validate, ApiConfig, ResourceRegistry};
use crate::error::ConfigError;
use crate::store::{DocumentStore, ReadySignal};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub registry: Arc<ResourceRegistry>,
    pub store: Arc<dyn DocumentStore>,
    /// Fires once the store connection is usable.
    pub ready: ReadySignal,
    /// `config.effective_base()`, computed once.
    pub base: Arc<str>,
}

impl AppState {
    pub fn new(config: ApiConfig, store: Arc<dyn DocumentStore>, ready: ReadySignal) -> Result<Self, ConfigError> {
        validate(&config)?;
        let registry = ResourceRegistry::build(&config.resources)?;
        let base: Arc<str> = Arc::from(config.effective_base());
        tracing::info!(name = %config.name, base = %base, resources = registry.len(), "api configured");
        Ok(AppState {
            config: Arc::new(config),
            registry: Arc::new(registry),
            store,
            ready,
            base,
        })
    }
}
