//! Provider registry: builds adapters from the config store and picks one per request

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::traits::ImageProvider;
use super::{gemini, openai, stability};
use crate::config::GenerationSettings;
use crate::error::{AppError, Result};
use crate::models::{ConfigId, ProviderConfig, IMAGE_GEN_SERVICE};
use crate::store::ConfigStore;

/// Constructor for one vendor kind
pub type ProviderFactory = Arc<
    dyn Fn(ProviderConfig, &GenerationSettings) -> Result<Arc<dyn ImageProvider>> + Send + Sync,
>;

/// Kind tag that requests automatic selection
pub const AUTO: &str = "auto";

/// Adapters loaded by one reload. Never mutated once published.
#[derive(Default)]
struct ProviderSnapshot {
    /// Priority order as returned by the store
    ordered: Vec<Arc<dyn ImageProvider>>,
    by_id: HashMap<ConfigId, Arc<dyn ImageProvider>>,
}

/// Loaded adapter as shown to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    pub config_id: ConfigId,
    pub name: String,
    pub provider_kind: String,
    pub model_id: Option<String>,
    pub description: Option<String>,
    pub priority: i32,
}

impl From<&ProviderConfig> for ProviderSummary {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            config_id: config.id,
            name: config.display_name.clone(),
            provider_kind: config.provider_kind.clone(),
            model_id: config.model_id.clone(),
            description: config.description.clone(),
            priority: config.priority,
        }
    }
}

/// Registry of image providers
pub struct ProviderRegistry {
    store: Arc<dyn ConfigStore>,
    settings: GenerationSettings,
    factories: RwLock<HashMap<String, ProviderFactory>>,
    snapshot: RwLock<Arc<ProviderSnapshot>>,
}

impl ProviderRegistry {
    /// Registry with no factories; nothing loads until some are registered
    pub fn new(store: Arc<dyn ConfigStore>, settings: GenerationSettings) -> Self {
        Self {
            store,
            settings,
            factories: RwLock::new(HashMap::new()),
            snapshot: RwLock::new(Arc::new(ProviderSnapshot::default())),
        }
    }

    /// Registry knowing the built-in vendors
    pub fn with_default_factories(
        store: Arc<dyn ConfigStore>,
        settings: GenerationSettings,
    ) -> Self {
        let registry = Self::new(store, settings);
        registry.register_factory(openai::KIND, Arc::new(openai::OpenAiProvider::factory));
        registry.register_factory(stability::KIND, Arc::new(stability::StabilityProvider::factory));
        registry.register_factory(gemini::KIND, Arc::new(gemini::GeminiProvider::factory));
        registry
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Register or replace the factory for a kind. Takes effect on the next reload.
    pub fn register_factory(&self, kind: &str, factory: ProviderFactory) {
        self.factories.write().insert(kind.to_string(), factory);
        debug!(kind = %kind, "Registered provider factory");
    }

    /// Build an adapter for `config` without loading it.
    ///
    /// `Ok(None)` when no factory knows the kind.
    pub fn build_adapter(&self, config: ProviderConfig) -> Result<Option<Arc<dyn ImageProvider>>> {
        let factory = self.factories.read().get(&config.provider_kind).cloned();
        match factory {
            Some(factory) => factory(config, &self.settings).map(Some),
            None => Ok(None),
        }
    }

    /// Rebuild every adapter from the store and publish the new set.
    ///
    /// The previous set stays in place when the store cannot be read.
    pub async fn reload(&self) -> Result<usize> {
        let configs = self.store.list_enabled(IMAGE_GEN_SERVICE).await?;

        let mut snapshot = ProviderSnapshot::default();
        for config in configs {
            let id = config.id;
            let kind = config.provider_kind.clone();
            match self.build_adapter(config) {
                Ok(Some(adapter)) => {
                    snapshot.by_id.insert(id, adapter.clone());
                    snapshot.ordered.push(adapter);
                }
                Ok(None) => {
                    warn!(config_id = id, kind = %kind, "Unknown provider kind, skipping");
                }
                Err(e) => {
                    error!(config_id = id, kind = %kind, error = %e, "Failed to build provider");
                }
            }
        }

        let count = snapshot.ordered.len();
        *self.snapshot.write() = Arc::new(snapshot);
        info!(count = count, "Loaded image providers");
        Ok(count)
    }

    fn current(&self) -> Arc<ProviderSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn resolve_by_id(&self, config_id: ConfigId) -> Result<Arc<dyn ImageProvider>> {
        self.current()
            .by_id
            .get(&config_id)
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!("provider config {} is not loaded", config_id))
            })
    }

    /// Highest-priority adapter of a kind
    pub fn resolve_by_kind(&self, kind: &str) -> Result<Arc<dyn ImageProvider>> {
        self.current()
            .ordered
            .iter()
            .find(|p| p.kind() == kind)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("no provider of kind '{}' is loaded", kind)))
    }

    /// First adapter, in priority order, whose configuration validates
    pub async fn resolve_auto(&self) -> Result<Arc<dyn ImageProvider>> {
        let snapshot = self.current();
        if snapshot.ordered.is_empty() {
            return Err(AppError::Unavailable("no image providers are configured".to_string()));
        }

        for provider in &snapshot.ordered {
            if provider.validate_config().await {
                debug!(provider = %provider.name(), "Auto-selected provider");
                return Ok(provider.clone());
            }
            debug!(provider = %provider.name(), "Skipping provider that failed validation");
        }

        Err(AppError::Unavailable(
            "no image provider passed validation".to_string(),
        ))
    }

    /// Explicit config id, then kind, then automatic selection
    pub async fn resolve(
        &self,
        config_id: Option<ConfigId>,
        kind: Option<&str>,
    ) -> Result<Arc<dyn ImageProvider>> {
        if let Some(id) = config_id {
            return self.resolve_by_id(id);
        }
        match kind {
            Some(kind) if kind != AUTO => self.resolve_by_kind(kind),
            _ => self.resolve_auto().await,
        }
    }

    pub fn list(&self) -> Vec<ProviderSummary> {
        self.current()
            .ordered
            .iter()
            .map(|p| ProviderSummary::from(p.config()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.current().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
