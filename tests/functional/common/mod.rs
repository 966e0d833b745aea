//! Shared fixtures: stub providers and a fully wired in-memory application

use async_trait::async_trait;
use image_gen_orchestrator::config::{GenerationSettings, Settings};
use image_gen_orchestrator::models::{
    ConfigId, GenerationOptions, ProviderConfig, ProviderExtra, IMAGE_GEN_SERVICE,
};
use image_gen_orchestrator::provider::{
    GeneratedImage, GenerationOutcome, ImagePayload, ImageProvider, ProviderFactory,
};
use image_gen_orchestrator::store::{MemoryAssetStore, MemoryConfigStore, MemoryGenerationStore};
use image_gen_orchestrator::{AppState, Result};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const STUB_KIND: &str = "stub";

pub const PNG_BYTES: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3, 4];

/// What a stub adapter answers
#[derive(Debug, Clone)]
pub enum StubOutput {
    Base64(Vec<u8>),
    Url(String),
    Fail(String),
}

#[derive(Debug, Clone)]
pub struct StubSpec {
    pub healthy: bool,
    pub output: StubOutput,
    /// Time the vendor call takes before answering
    pub delay: Option<Duration>,
}

impl StubSpec {
    pub fn healthy(output: StubOutput) -> Self {
        Self {
            healthy: true,
            output,
            delay: None,
        }
    }

    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            output: StubOutput::Fail("unhealthy stub was called".into()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Records every call made against it
#[derive(Debug, Default)]
pub struct CallLog {
    pub generate: AtomicUsize,
    pub inpaint: AtomicUsize,
    pub probe: AtomicUsize,
    pub inpaint_inputs: parking_lot::Mutex<Vec<(String, String)>>,
    /// Options handed to the most recent vendor call
    pub last_options: parking_lot::Mutex<Option<GenerationOptions>>,
}

impl CallLog {
    pub fn vendor_calls(&self) -> usize {
        self.generate.load(Ordering::SeqCst) + self.inpaint.load(Ordering::SeqCst)
    }
}

pub struct StubProvider {
    config: ProviderConfig,
    spec: StubSpec,
    calls: Arc<CallLog>,
}

impl StubProvider {
    async fn respond(&self) -> GenerationOutcome {
        if let Some(delay) = self.spec.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome()
    }

    fn outcome(&self) -> GenerationOutcome {
        let payload = match &self.spec.output {
            StubOutput::Base64(bytes) => {
                ImagePayload::Base64(image_gen_orchestrator::storage::base64::encode(bytes))
            }
            StubOutput::Url(url) => ImagePayload::Url(url.clone()),
            StubOutput::Fail(message) => {
                return GenerationOutcome::Failure {
                    provider_kind: STUB_KIND.into(),
                    config_id: self.config.id,
                    error_message: message.clone(),
                }
            }
        };
        let mut metadata = Map::new();
        metadata.insert("seed".into(), json!(42));
        GenerationOutcome::Success(GeneratedImage {
            payload,
            provider_kind: STUB_KIND.into(),
            config_id: self.config.id,
            model_used: Some("stub-model".into()),
            metadata,
            cost_estimate: self.config.extra.cost_per_image(),
        })
    }
}

#[async_trait]
impl ImageProvider for StubProvider {
    fn kind(&self) -> &str {
        STUB_KIND
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn generate(&self, _prompt: &str, options: &GenerationOptions) -> GenerationOutcome {
        self.calls.generate.fetch_add(1, Ordering::SeqCst);
        *self.calls.last_options.lock() = Some(options.clone());
        self.respond().await
    }

    async fn inpaint(
        &self,
        image_url: &str,
        mask_url: &str,
        _prompt: &str,
        _options: &GenerationOptions,
    ) -> GenerationOutcome {
        self.calls.inpaint.fetch_add(1, Ordering::SeqCst);
        self.calls
            .inpaint_inputs
            .lock()
            .push((image_url.to_string(), mask_url.to_string()));
        self.respond().await
    }

    async fn probe(&self) -> Result<bool> {
        self.calls.probe.fetch_add(1, Ordering::SeqCst);
        Ok(self.spec.healthy)
    }
}

pub fn stub_config(id: ConfigId, priority: i32, extra: Value) -> ProviderConfig {
    ProviderConfig {
        id,
        display_name: format!("stub {}", id),
        provider_kind: STUB_KIND.into(),
        service_kind: IMAGE_GEN_SERVICE.into(),
        model_id: None,
        base_url: "http://stub.invalid".into(),
        api_key: "stub-key".into(),
        extra: ProviderExtra::from(extra),
        enabled: true,
        priority,
        description: None,
    }
}

pub struct TestApp {
    pub state: AppState,
    pub configs: Arc<MemoryConfigStore>,
    pub assets: Arc<MemoryAssetStore>,
    pub generations: Arc<MemoryGenerationStore>,
    pub calls: Arc<CallLog>,
}

/// Wire an application whose stub configs answer per `specs`, then load them
pub async fn test_app(providers: Vec<(ProviderConfig, StubSpec)>) -> TestApp {
    test_app_with(Settings::default(), providers).await
}

pub async fn test_app_with(
    settings: Settings,
    providers: Vec<(ProviderConfig, StubSpec)>,
) -> TestApp {
    let configs = Arc::new(MemoryConfigStore::new());
    let mut specs = HashMap::new();
    for (config, spec) in providers {
        specs.insert(config.id, spec);
        configs.upsert(config);
    }

    let assets = Arc::new(MemoryAssetStore::new());
    let generations = Arc::new(MemoryGenerationStore::new());
    let state = AppState::with_stores(
        settings,
        configs.clone(),
        assets.clone(),
        generations.clone(),
    )
    .unwrap();

    let calls = Arc::new(CallLog::default());
    let specs = Arc::new(specs);
    let factory_calls = calls.clone();
    let factory: ProviderFactory = Arc::new(
        move |config: ProviderConfig,
              _settings: &GenerationSettings|
              -> Result<Arc<dyn ImageProvider>> {
            let spec = specs
                .get(&config.id)
                .cloned()
                .unwrap_or_else(StubSpec::unhealthy);
            Ok(Arc::new(StubProvider {
                config,
                spec,
                calls: factory_calls.clone(),
            }))
        },
    );
    state.registry.register_factory(STUB_KIND, factory);
    state.registry.reload().await.unwrap();

    TestApp {
        state,
        configs,
        assets,
        generations,
        calls,
    }
}
