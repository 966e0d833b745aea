//! Vendor adapters against mocked vendor APIs

use image_gen_orchestrator::config::GenerationSettings;
use image_gen_orchestrator::models::{
    GenerationOptions, ProviderConfig, ProviderExtra, IMAGE_GEN_SERVICE,
};
use image_gen_orchestrator::provider::{
    GeminiProvider, GeneratedImage, GenerationOutcome, ImagePayload, ImageProvider,
    OpenAiProvider, StabilityProvider,
};
use image_gen_orchestrator::provider::ProviderRegistry;
use image_gen_orchestrator::store::MemoryConfigStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn vendor_config(kind: &str, base_url: &str, api_key: &str, extra: Value) -> ProviderConfig {
    ProviderConfig {
        id: 42,
        display_name: format!("{} test", kind),
        provider_kind: kind.to_string(),
        service_kind: IMAGE_GEN_SERVICE.to_string(),
        model_id: None,
        base_url: base_url.to_string(),
        api_key: api_key.to_string(),
        extra: ProviderExtra::from(extra),
        enabled: true,
        priority: 0,
        description: None,
    }
}

fn expect_success(outcome: GenerationOutcome) -> GeneratedImage {
    match outcome {
        GenerationOutcome::Success(image) => image,
        GenerationOutcome::Failure { error_message, .. } => {
            panic!("expected success, got failure: {}", error_message)
        }
    }
}

fn expect_failure(outcome: GenerationOutcome) -> String {
    match outcome {
        GenerationOutcome::Failure {
            error_message,
            config_id,
            ..
        } => {
            assert_eq!(config_id, 42);
            error_message
        }
        GenerationOutcome::Success(_) => panic!("expected failure"),
    }
}

async fn serve_inputs(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/inputs/image.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, 0x50, 0x4E, 0x47]))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/inputs/mask.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xFF]))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_openai_generate_returns_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/images/generations"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "dall-e-3",
            "prompt": "a red fox",
            "size": "1792x1024",
            "quality": "standard",
            "style": "vivid"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "url": "https://cdn.vendor.test/fox.png",
                "revised_prompt": "a red fox in snow"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = vendor_config("openai", &server.uri(), "sk-test", json!({"costPerImage": 0.04}));
    let provider = OpenAiProvider::new(config, &GenerationSettings::default()).unwrap();
    let options = GenerationOptions {
        aspect_ratio: Some("16:9".into()),
        ..Default::default()
    };

    let image = expect_success(provider.generate("a red fox", &options).await);
    assert_eq!(
        image.payload,
        ImagePayload::Url("https://cdn.vendor.test/fox.png".into())
    );
    assert_eq!(image.provider_kind, "openai");
    assert_eq!(image.config_id, 42);
    assert_eq!(image.model_used.as_deref(), Some("dall-e-3"));
    assert_eq!(image.metadata["revisedPrompt"], json!("a red fox in snow"));
    assert_eq!(image.cost_estimate, Some(0.04));
}

#[tokio::test]
async fn test_openai_error_message_is_preserved() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/images/generations"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "message": "Your request was rejected by the safety system",
                "type": "invalid_request_error"
            }
        })))
        .mount(&server)
        .await;

    let config = vendor_config("openai", &server.uri(), "sk-test", json!({}));
    let provider = OpenAiProvider::new(config, &GenerationSettings::default()).unwrap();

    let message =
        expect_failure(provider.generate("anything", &GenerationOptions::default()).await);
    assert_eq!(message, "Your request was rejected by the safety system");
}

#[tokio::test]
async fn test_openai_inpaint_downloads_inputs() {
    let server = MockServer::start().await;
    serve_inputs(&server).await;
    Mock::given(method("POST"))
        .and(path("/images/edits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"b64_json": "iVBORw0KGgo="}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = vendor_config("openai", &server.uri(), "sk-test", json!({}));
    let provider = OpenAiProvider::new(config, &GenerationSettings::default()).unwrap();
    let image_url = format!("{}/inputs/image.png", server.uri());
    let mask_url = format!("{}/inputs/mask.png", server.uri());

    let image = expect_success(
        provider
            .inpaint(&image_url, &mask_url, "add a hat", &GenerationOptions::default())
            .await,
    );
    assert_eq!(image.payload, ImagePayload::Base64("iVBORw0KGgo=".into()));
    assert_eq!(image.model_used.as_deref(), Some("dall-e-2"));
}

#[tokio::test]
async fn test_inpaint_fails_when_input_is_missing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/images/edits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(0)
        .mount(&server)
        .await;

    let config = vendor_config("openai", &server.uri(), "sk-test", json!({}));
    let provider = OpenAiProvider::new(config, &GenerationSettings::default()).unwrap();
    let missing = format!("{}/inputs/gone.png", server.uri());

    let message = expect_failure(
        provider
            .inpaint(&missing, &missing, "add a hat", &GenerationOptions::default())
            .await,
    );
    assert!(message.contains("input image"), "{}", message);
}

#[tokio::test]
async fn test_stability_generate_returns_base64_and_seed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(
            "/v1/generation/stable-diffusion-xl-1024-v1-0/text-to-image",
        ))
        .and(header("accept", "application/json"))
        .and(body_partial_json(json!({
            "text_prompts": [
                {"text": "a lighthouse", "weight": 1.0},
                {"text": "blurry", "weight": -1.0}
            ],
            "width": 768,
            "height": 1024,
            "steps": 30
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "artifacts": [{"base64": "iVBORw0KGgo=", "seed": 1234, "finishReason": "SUCCESS"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = vendor_config("stability", &server.uri(), "sk-stab", json!({}));
    let provider = StabilityProvider::new(config, &GenerationSettings::default()).unwrap();
    let options = GenerationOptions {
        width: Some(768),
        height: Some(1024),
        negative_prompt: Some("blurry".into()),
        ..Default::default()
    };

    let image = expect_success(provider.generate("a lighthouse", &options).await);
    assert_eq!(image.payload, ImagePayload::Base64("iVBORw0KGgo=".into()));
    assert_eq!(image.metadata["seed"], json!(1234));
    assert_eq!(image.metadata["finishReason"], json!("SUCCESS"));
    assert_eq!(image.cost_estimate, None);
}

#[tokio::test]
async fn test_stability_error_message_is_preserved() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(
            "/v1/generation/stable-diffusion-xl-1024-v1-0/text-to-image",
        ))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "id": "abc",
            "name": "invalid_dimensions",
            "message": "height and width must be multiples of 64"
        })))
        .mount(&server)
        .await;

    let config = vendor_config("stability", &server.uri(), "sk-stab", json!({}));
    let provider = StabilityProvider::new(config, &GenerationSettings::default()).unwrap();

    let message = expect_failure(provider.generate("x", &GenerationOptions::default()).await);
    assert_eq!(message, "height and width must be multiples of 64");
}

#[tokio::test]
async fn test_stability_inpaint_uses_masking_endpoint() {
    let server = MockServer::start().await;
    serve_inputs(&server).await;
    Mock::given(method("POST"))
        .and(path(
            "/v1/generation/stable-diffusion-xl-1024-v1-0/image-to-image/masking",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "artifacts": [{"base64": "AAAA", "seed": 7}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = vendor_config("stability", &server.uri(), "sk-stab", json!({}));
    let provider = StabilityProvider::new(config, &GenerationSettings::default()).unwrap();
    let image_url = format!("{}/inputs/image.png", server.uri());
    let mask_url = format!("{}/inputs/mask.png", server.uri());

    let image = expect_success(
        provider
            .inpaint(&image_url, &mask_url, "replace the sky", &GenerationOptions::default())
            .await,
    );
    assert_eq!(image.payload, ImagePayload::Base64("AAAA".into()));
}

#[tokio::test]
async fn test_gemini_generate_reads_inline_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash-image:generateContent"))
        .and(header("x-goog-api-key", "g-key"))
        .and(body_partial_json(json!({
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": {"aspectRatio": "1:1"}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "Here is your image"},
                    {"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgo="}}
                ]},
                "finishReason": "STOP"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = vendor_config("gemini", &server.uri(), "g-key", json!({}));
    let provider = GeminiProvider::new(config, &GenerationSettings::default()).unwrap();
    let options = GenerationOptions {
        aspect_ratio: Some("1:1".into()),
        ..Default::default()
    };

    let image = expect_success(provider.generate("a teapot", &options).await);
    assert_eq!(image.payload, ImagePayload::Base64("iVBORw0KGgo=".into()));
    assert_eq!(image.metadata["finishReason"], json!("STOP"));
    assert_eq!(image.metadata["mimeType"], json!("image/png"));
}

#[tokio::test]
async fn test_gemini_without_image_part_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash-image:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"parts": [{"text": "I cannot draw that"}]},
                "finishReason": "SAFETY"
            }]
        })))
        .mount(&server)
        .await;

    let config = vendor_config("gemini", &server.uri(), "g-key", json!({}));
    let provider = GeminiProvider::new(config, &GenerationSettings::default()).unwrap();

    expect_failure(provider.generate("x", &GenerationOptions::default()).await);
}

#[tokio::test]
async fn test_validate_config_probes_vendor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .and(header("authorization", "Bearer good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .and(header("authorization", "Bearer revoked"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let settings = GenerationSettings::default();
    let good = OpenAiProvider::new(
        vendor_config("openai", &server.uri(), "good", json!({})),
        &settings,
    )
    .unwrap();
    let revoked = OpenAiProvider::new(
        vendor_config("openai", &server.uri(), "revoked", json!({})),
        &settings,
    )
    .unwrap();

    assert!(good.validate_config().await);
    assert!(!revoked.validate_config().await);
}

#[tokio::test]
async fn test_slow_health_check_counts_as_unhealthy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .and(header("authorization", "Bearer slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .and(header("authorization", "Bearer fast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let settings = GenerationSettings {
        validation_timeout_ms: 200,
        ..Default::default()
    };
    let mut slow = vendor_config("openai", &server.uri(), "slow", json!({}));
    slow.id = 1;
    slow.priority = 10;
    let mut fast = vendor_config("openai", &server.uri(), "fast", json!({}));
    fast.id = 2;
    fast.priority = 5;

    let adapter = OpenAiProvider::new(slow.clone(), &settings).unwrap();
    assert!(!adapter.validate_config().await);

    let store = Arc::new(MemoryConfigStore::with_configs(vec![slow, fast]));
    let registry = ProviderRegistry::with_default_factories(store, settings);
    assert_eq!(registry.reload().await.unwrap(), 2);
    assert_eq!(registry.resolve_auto().await.unwrap().config_id(), 2);
}

#[tokio::test]
async fn test_validate_config_without_vendor_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let settings = GenerationSettings::default();
    let skipped = StabilityProvider::new(
        vendor_config("stability", &server.uri(), "", json!({"skipValidation": true})),
        &settings,
    )
    .unwrap();
    let keyless = GeminiProvider::new(
        vendor_config("gemini", &server.uri(), "  ", json!({})),
        &settings,
    )
    .unwrap();

    assert!(skipped.validate_config().await);
    assert!(!keyless.validate_config().await);
}

#[tokio::test]
async fn test_unreachable_vendor_is_a_failure_outcome() {
    let config = vendor_config("stability", "http://127.0.0.1:9", "sk", json!({}));
    let provider = StabilityProvider::new(config, &GenerationSettings::default()).unwrap();

    let message = expect_failure(provider.generate("x", &GenerationOptions::default()).await);
    assert!(!message.is_empty());
    assert!(!provider.validate_config().await);
}
