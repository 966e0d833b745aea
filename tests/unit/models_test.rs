//! Unit tests for the persisted data model

use image_gen_orchestrator::models::{
    GenerationKind, GenerationOptions, ProviderConfig, RateLimitPolicy, IMAGE_GEN_SERVICE,
};
use serde_json::json;

#[test]
fn test_provider_config_from_store_json() {
    let config: ProviderConfig = serde_json::from_value(json!({
        "id": 12,
        "displayName": "SDXL (EU)",
        "providerKind": "stability",
        "modelId": "stable-diffusion-xl-1024-v1-0",
        "baseUrl": "https://api.stability.ai/",
        "apiKey": "sk-123",
        "priority": 7,
        "extra": {
            "rateLimit": {"requestsPerMinute": 10, "requestsPerDay": 500},
            "presets": {"portrait": {"aspectRatio": "9:16", "cfgScale": 9.0}}
        }
    }))
    .unwrap();

    assert_eq!(config.service_kind, IMAGE_GEN_SERVICE);
    assert!(config.enabled);
    assert_eq!(config.base_url(), "https://api.stability.ai");
    assert_eq!(
        config.extra.rate_limit(),
        Some(RateLimitPolicy {
            requests_per_minute: Some(10),
            requests_per_hour: None,
            requests_per_day: Some(500),
        })
    );

    let portrait = config.extra.preset("portrait").unwrap();
    assert_eq!(portrait.aspect_ratio.as_deref(), Some("9:16"));
    assert_eq!(portrait.guidance_scale, Some(9.0));
}

#[test]
fn test_null_rate_limit_means_unlimited() {
    let config: ProviderConfig = serde_json::from_value(json!({
        "id": 1,
        "displayName": "openai",
        "providerKind": "openai",
        "baseUrl": "https://api.openai.com/v1",
        "extra": {"rateLimit": null}
    }))
    .unwrap();
    assert!(config.extra.rate_limit().is_none());
}

#[test]
fn test_options_serialize_sparse() {
    let options = GenerationOptions {
        steps: Some(20),
        negative_prompt: Some("text".into()),
        ..Default::default()
    };
    assert_eq!(
        serde_json::to_value(&options).unwrap(),
        json!({"steps": 20, "negativePrompt": "text"})
    );
    assert_eq!(options.sample_count(), 1);
}

#[test]
fn test_generation_kind_tags() {
    assert_eq!(
        serde_json::to_value(GenerationKind::TextToImage).unwrap(),
        json!("text-to-image")
    );
    assert_eq!(GenerationKind::Inpaint.as_str(), "inpaint");
}
