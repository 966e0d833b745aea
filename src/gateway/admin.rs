//! Operator-facing provider management: rate limits, presets, validation
//! and cost reporting

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::models::{
    ConfigId, GenerationId, GenerationOptions, GenerationStatus, ProviderConfig,
    ProviderConfigPatch, ProviderExtra, RateLimitPolicy,
};
use crate::provider::ProviderRegistry;
use crate::store::{ConfigStore, GenerationStore};

const RECENT_GENERATIONS: usize = 10;

/// Result of probing one configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub config_id: ConfigId,
    pub valid: bool,
    pub provider_kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentGeneration {
    pub id: GenerationId,
    pub prompt: String,
    pub cost_estimate: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Spend over completed generations of one configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostStats {
    pub config_id: ConfigId,
    pub config_name: String,
    pub provider_kind: String,
    pub total_cost: f64,
    pub total_requests: usize,
    pub avg_cost: f64,
    pub recent: Vec<RecentGeneration>,
}

pub struct ProviderAdmin {
    configs: Arc<dyn ConfigStore>,
    registry: Arc<ProviderRegistry>,
    generations: Arc<dyn GenerationStore>,
    /// Serializes read-modify-write of one config's `extra`
    edit_locks: DashMap<ConfigId, Arc<Mutex<()>>>,
}

impl ProviderAdmin {
    pub fn new(
        configs: Arc<dyn ConfigStore>,
        registry: Arc<ProviderRegistry>,
        generations: Arc<dyn GenerationStore>,
    ) -> Self {
        Self {
            configs,
            registry,
            generations,
            edit_locks: DashMap::new(),
        }
    }

    async fn config(&self, id: ConfigId) -> Result<ProviderConfig> {
        self.configs
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("provider config {}", id)))
    }

    /// Apply `edit` to the stored `extra` and write it back when it reports
    /// a change. Edits of the same config never interleave.
    async fn update_extra<F>(&self, id: ConfigId, edit: F) -> Result<ProviderExtra>
    where
        F: FnOnce(&mut ProviderExtra) -> Result<bool>,
    {
        let lock = self.edit_locks.entry(id).or_default().clone();
        let _guard = lock.lock().await;

        let mut extra = self.config(id).await?.extra;
        if edit(&mut extra)? {
            self.configs
                .update(id, ProviderConfigPatch::extra(extra.clone()))
                .await?;
        }
        Ok(extra)
    }

    pub async fn set_rate_limit(
        &self,
        id: ConfigId,
        policy: RateLimitPolicy,
    ) -> Result<RateLimitPolicy> {
        self.update_extra(id, |extra| {
            extra.set_rate_limit(&policy)?;
            Ok(true)
        })
        .await?;
        info!(config_id = id, policy = ?policy, "Updated rate limit");
        Ok(policy)
    }

    pub async fn rate_limit(&self, id: ConfigId) -> Result<Option<RateLimitPolicy>> {
        Ok(self.config(id).await?.extra.rate_limit())
    }

    /// Insert or replace a named preset; returns every preset of the config
    pub async fn set_preset(
        &self,
        id: ConfigId,
        name: &str,
        options: GenerationOptions,
    ) -> Result<BTreeMap<String, GenerationOptions>> {
        if name.trim().is_empty() {
            return Err(AppError::InvalidRequest("preset name cannot be empty".to_string()));
        }
        let extra = self
            .update_extra(id, |extra| {
                let mut presets = extra.presets();
                presets.insert(name.to_string(), options);
                extra.set_presets(&presets)?;
                Ok(true)
            })
            .await?;
        info!(config_id = id, preset = %name, "Saved preset");
        Ok(extra.presets())
    }

    pub async fn presets(&self, id: ConfigId) -> Result<BTreeMap<String, GenerationOptions>> {
        Ok(self.config(id).await?.extra.presets())
    }

    /// Removing a preset that does not exist is not an error
    pub async fn delete_preset(&self, id: ConfigId, name: &str) -> Result<()> {
        self.update_extra(id, |extra| {
            let mut presets = extra.presets();
            if presets.remove(name).is_none() {
                return Ok(false);
            }
            extra.set_presets(&presets)?;
            info!(config_id = id, preset = %name, "Deleted preset");
            Ok(true)
        })
        .await?;
        Ok(())
    }

    /// Build a throwaway adapter for the stored config and probe it
    pub async fn validate(&self, id: ConfigId) -> Result<ValidationReport> {
        let config = self.config(id).await?;
        let mut report = ValidationReport {
            config_id: id,
            valid: false,
            provider_kind: config.provider_kind.clone(),
            name: config.display_name.clone(),
            error: None,
        };

        match self.registry.build_adapter(config) {
            Ok(Some(adapter)) => {
                report.valid = adapter.validate_config().await;
            }
            Ok(None) => {
                report.error = Some(format!(
                    "unsupported provider kind '{}'",
                    report.provider_kind
                ));
            }
            Err(e) => {
                report.error = Some(e.to_string());
            }
        }

        if report.valid {
            info!(config_id = id, "Provider configuration validated");
        } else {
            warn!(
                config_id = id,
                error = ?report.error,
                "Provider configuration failed validation"
            );
        }
        Ok(report)
    }

    pub async fn cost_stats(
        &self,
        id: ConfigId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<CostStats> {
        let config = self.config(id).await?;
        let completed: Vec<_> = self
            .generations
            .list_by_config(id, from, to)
            .await?
            .into_iter()
            .filter(|r| r.status == GenerationStatus::Completed)
            .collect();

        let total_requests = completed.len();
        let total_cost: f64 = completed.iter().filter_map(|r| r.cost_estimate).sum();
        let priced = completed.iter().filter(|r| r.cost_estimate.is_some()).count();
        let avg_cost = if priced > 0 {
            total_cost / priced as f64
        } else {
            0.0
        };

        let recent = completed
            .into_iter()
            .take(RECENT_GENERATIONS)
            .map(|r| RecentGeneration {
                id: r.id,
                prompt: r.prompt,
                cost_estimate: r.cost_estimate,
                created_at: r.created_at,
            })
            .collect();

        Ok(CostStats {
            config_id: id,
            config_name: config.display_name,
            provider_kind: config.provider_kind,
            total_cost,
            total_requests,
            avg_cost,
            recent,
        })
    }
}
