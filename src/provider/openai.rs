//! OpenAI images API adapter (DALL-E)

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::http::{
    build_client, cost_estimate, download_image, nested_error_message, read_json,
    transport_error, VendorTimeouts,
};
use super::traits::{GeneratedImage, GenerationOutcome, ImagePayload, ImageProvider};
use crate::config::GenerationSettings;
use crate::error::{AppError, Result};
use crate::models::{GenerationOptions, ProviderConfig};

pub const KIND: &str = "openai";

const DEFAULT_MODEL: &str = "dall-e-3";
// Only dall-e-2 supports the edits endpoint
const EDIT_MODEL: &str = "dall-e-2";
const DEFAULT_SIZE: &str = "1024x1024";

pub struct OpenAiProvider {
    config: ProviderConfig,
    client: Client,
    timeouts: VendorTimeouts,
}

#[derive(Debug, Serialize)]
struct ImagesRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: String,
    response_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    quality: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    revised_prompt: Option<String>,
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig, settings: &GenerationSettings) -> Result<Self> {
        let timeouts = VendorTimeouts::for_config(&config, settings);
        let client = build_client(&timeouts)?;
        Ok(Self {
            config,
            client,
            timeouts,
        })
    }

    /// Registry factory
    pub fn factory(
        config: ProviderConfig,
        settings: &GenerationSettings,
    ) -> Result<Arc<dyn ImageProvider>> {
        Ok(Arc::new(Self::new(config, settings)?))
    }

    fn size_for(options: &GenerationOptions) -> String {
        if let (Some(width), Some(height)) = (options.width, options.height) {
            return format!("{}x{}", width, height);
        }
        match options.aspect_ratio.as_deref() {
            Some("16:9") => "1792x1024".to_string(),
            Some("9:16") => "1024x1792".to_string(),
            _ => DEFAULT_SIZE.to_string(),
        }
    }

    fn into_image(
        &self,
        response: ImagesResponse,
        model: &str,
        options: &GenerationOptions,
    ) -> Result<GeneratedImage> {
        let data = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| AppError::GenerationFailed("provider returned no image".to_string()))?;

        let payload = match (data.url, data.b64_json) {
            (Some(url), _) => ImagePayload::Url(url),
            (None, Some(b64)) => ImagePayload::Base64(b64),
            (None, None) => {
                return Err(AppError::GenerationFailed(
                    "provider response carried neither url nor b64_json".to_string(),
                ))
            }
        };

        let mut metadata = Map::new();
        if let Some(revised) = data.revised_prompt {
            metadata.insert("revisedPrompt".to_string(), Value::String(revised));
        }

        Ok(GeneratedImage {
            payload,
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
        let model = options
            .model
            .as_deref()
            .or(self.config.model_id.as_deref())
            .unwrap_or(DEFAULT_MODEL);

        let (quality, style) = if model == DEFAULT_MODEL {
            let quality = if options.style.as_deref() == Some("hd") { "hd" } else { "standard" };
            let style = if options.style.as_deref() == Some("natural") {
                "natural"
            } else {
                "vivid"
            };
            (Some(quality), Some(style))
        } else {
            (None, None)
        };

        let request = ImagesRequest {
            model,
            prompt,
            n: options.sample_count(),
            size: Self::size_for(options),
            response_format: "url",
            quality,
            style,
        };

        let response = self
            .client
            .post(format!("{}/images/generations", self.config.base_url()))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let body: ImagesResponse = read_json(response, nested_error_message).await?;
        self.into_image(body, model, options)
    }

    async fn try_inpaint(
        &self,
        image_url: &str,
        mask_url: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GeneratedImage> {
        let (image, mask) = futures::try_join!(
            download_image(&self.client, image_url, self.timeouts.download),
            download_image(&self.client, mask_url, self.timeouts.download),
        )?;

        let form = Form::new()
            .part("image", png_part(image)?)
            .part("mask", png_part(mask)?)
            .text("model", EDIT_MODEL)
            .text("prompt", prompt.to_string())
            .text("n", "1")
            .text("size", DEFAULT_SIZE)
            .text("response_format", "url");

        let response = self
            .client
            .post(format!("{}/images/edits", self.config.base_url()))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let body: ImagesResponse = read_json(response, nested_error_message).await?;
        self.into_image(body, EDIT_MODEL, options)
    }
}

fn png_part(bytes: Vec<u8>) -> Result<Part> {
    Ok(Part::bytes(bytes).file_name("image.png").mime_str("image/png")?)
}

#[async_trait]
impl ImageProvider for OpenAiProvider {
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
        info!(config_id = self.config.id, "Generating image with OpenAI");
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
        info!(config_id = self.config.id, "Inpainting with OpenAI");
        let result = self.try_inpaint(image_url, mask_url, prompt, options).await;
        GenerationOutcome::from_result(&self.config, result)
    }

    async fn probe(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/models", self.config.base_url()))
            .bearer_auth(&self.config.api_key)
            .timeout(self.timeouts.validation)
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}
