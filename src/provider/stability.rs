//! Stability AI REST v1 adapter

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::http::{
    build_client, cost_estimate, download_image, read_json, top_level_message, transport_error,
    VendorTimeouts,
};
use super::traits::{GeneratedImage, GenerationOutcome, ImagePayload, ImageProvider};
use crate::config::GenerationSettings;
use crate::error::{AppError, Result};
use crate::models::{GenerationOptions, ProviderConfig};

pub const KIND: &str = "stability";

const DEFAULT_MODEL: &str = "stable-diffusion-xl-1024-v1-0";
const DEFAULT_CFG_SCALE: f32 = 7.0;
const DEFAULT_DIMENSION: u32 = 1024;
const DEFAULT_STEPS: u32 = 30;

pub struct StabilityProvider {
    config: ProviderConfig,
    client: Client,
    timeouts: VendorTimeouts,
}

#[derive(Debug, Serialize)]
struct TextPrompt<'a> {
    text: &'a str,
    weight: f32,
}

#[derive(Debug, Serialize)]
struct TextToImageRequest<'a> {
    text_prompts: Vec<TextPrompt<'a>>,
    cfg_scale: f32,
    height: u32,
    width: u32,
    samples: u32,
    steps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ArtifactsResponse {
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Artifact {
    base64: String,
    #[serde(default)]
    seed: Option<i64>,
    #[serde(default)]
    finish_reason: Option<String>,
}

impl StabilityProvider {
    pub fn new(config: ProviderConfig, settings: &GenerationSettings) -> Result<Self> {
        let timeouts = VendorTimeouts::for_config(&config, settings);
        let client = build_client(&timeouts)?;
        Ok(Self {
            config,
            client,
            timeouts,
        })
    }

    pub fn factory(
        config: ProviderConfig,
        settings: &GenerationSettings,
    ) -> Result<Arc<dyn ImageProvider>> {
        Ok(Arc::new(Self::new(config, settings)?))
    }

    fn model<'a>(&'a self, options: &'a GenerationOptions) -> &'a str {
        options
            .model
            .as_deref()
            .or(self.config.model_id.as_deref())
            .unwrap_or(DEFAULT_MODEL)
    }

    fn into_image(
        &self,
        response: ArtifactsResponse,
        model: &str,
        options: &GenerationOptions,
    ) -> Result<GeneratedImage> {
        let artifact = response
            .artifacts
            .into_iter()
            .next()
            .ok_or_else(|| {
                AppError::GenerationFailed("provider returned no artifacts".to_string())
            })?;

        let mut metadata = Map::new();
        if let Some(seed) = artifact.seed {
            metadata.insert("seed".to_string(), Value::from(seed));
        }
        if let Some(reason) = artifact.finish_reason {
            metadata.insert("finishReason".to_string(), Value::String(reason));
        }

        Ok(GeneratedImage {
            payload: ImagePayload::Base64(artifact.base64),
            provider_kind: KIND.to_string(),
            config_id: self.config.id,
            model_used: Some(model.to_string()),
            metadata,
            cost_estimate: cost_estimate(&self.config, options),
        })
    }

    async fn try_generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GeneratedImage> {
        let model = self.model(options);

        let mut text_prompts = vec![TextPrompt {
            text: prompt,
            weight: 1.0,
        }];
        if let Some(negative) = options.negative_prompt.as_deref().filter(|n| !n.is_empty()) {
            text_prompts.push(TextPrompt {
                text: negative,
                weight: -1.0,
            });
        }

        let request = TextToImageRequest {
            text_prompts,
            cfg_scale: options.guidance_scale.unwrap_or(DEFAULT_CFG_SCALE),
            height: options.height.unwrap_or(DEFAULT_DIMENSION),
            width: options.width.unwrap_or(DEFAULT_DIMENSION),
            samples: options.sample_count(),
            steps: options.steps.unwrap_or(DEFAULT_STEPS),
            seed: options.seed,
        };

        let response = self
            .client
            .post(format!(
                "{}/v1/generation/{}/text-to-image",
                self.config.base_url(),
                model
            ))
            .bearer_auth(&self.config.api_key)
            .header(header::ACCEPT, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let body: ArtifactsResponse = read_json(response, top_level_message).await?;
        self.into_image(body, model, options)
    }

    async fn try_inpaint(
        &self,
        image_url: &str,
        mask_url: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GeneratedImage> {
        let model = self.model(options);
        let (image, mask) = futures::try_join!(
            download_image(&self.client, image_url, self.timeouts.download),
            download_image(&self.client, mask_url, self.timeouts.download),
        )?;

        let mut form = Form::new()
            .part("init_image", png_part(image, "init.png")?)
            .part("mask_image", png_part(mask, "mask.png")?)
            .text("mask_source", "MASK_IMAGE_WHITE")
            .text("text_prompts[0][text]", prompt.to_string())
            .text("text_prompts[0][weight]", "1")
            .text(
                "cfg_scale",
                options.guidance_scale.unwrap_or(DEFAULT_CFG_SCALE).to_string(),
            )
            .text("samples", options.sample_count().to_string())
            .text("steps", options.steps.unwrap_or(DEFAULT_STEPS).to_string());
        if let Some(seed) = options.seed {
            form = form.text("seed", seed.to_string());
        }

        let response = self
            .client
            .post(format!(
                "{}/v1/generation/{}/image-to-image/masking",
                self.config.base_url(),
                model
            ))
            .bearer_auth(&self.config.api_key)
            .header(header::ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let body: ArtifactsResponse = read_json(response, top_level_message).await?;
        self.into_image(body, model, options)
    }
}

fn png_part(bytes: Vec<u8>, file_name: &'static str) -> Result<Part> {
    Ok(Part::bytes(bytes).file_name(file_name).mime_str("image/png")?)
}

#[async_trait]
impl ImageProvider for StabilityProvider {
    fn kind(&self) -> &str {
        KIND
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn validation_timeout(&self) -> Duration {
        self.timeouts.validation
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> GenerationOutcome {
        info!(config_id = self.config.id, "Generating image with Stability");
        let result = self.try_generate(prompt, options).await;
        GenerationOutcome::from_result(&self.config, result)
    }

    async fn inpaint(
        &self,
        image_url: &str,
        mask_url: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> GenerationOutcome {
        info!(config_id = self.config.id, "Inpainting with Stability");
        let result = self.try_inpaint(image_url, mask_url, prompt, options).await;
        GenerationOutcome::from_result(&self.config, result)
    }

    async fn probe(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/v1/user/account", self.config.base_url()))
            .bearer_auth(&self.config.api_key)
            .timeout(self.timeouts.validation)
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}
