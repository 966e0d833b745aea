//! Google Gemini image generation adapter (`generateContent`)

use async_trait::async_trait;
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
use crate::storage::base64;

pub const KIND: &str = "gemini";

const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";
const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiProvider {
    config: ProviderConfig,
    client: Client,
    timeouts: VendorTimeouts,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<ImageConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    aspect_ratio: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

impl ContentPart {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    fn png(bytes: &[u8]) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: "image/png".to_string(),
                data: base64::encode(bytes),
            }),
        }
    }
}

impl GeminiProvider {
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

    async fn call(
        &self,
        parts: Vec<ContentPart>,
        options: &GenerationOptions,
    ) -> Result<GeneratedImage> {
        let model = self.model(options);
        let request = GenerateContentRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_modalities: vec!["IMAGE"],
                image_config: options.aspect_ratio.clone().map(|aspect_ratio| ImageConfig {
                    aspect_ratio,
                }),
            },
        };

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.config.base_url(),
                model
            ))
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let body: GenerateContentResponse = read_json(response, nested_error_message).await?;
        let candidate = body
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| {
                AppError::GenerationFailed("provider returned no candidates".to_string())
            })?;

        let mut metadata = Map::new();
        if let Some(reason) = candidate.finish_reason {
            metadata.insert("finishReason".to_string(), Value::String(reason));
        }

        let inline = candidate
            .content
            .into_iter()
            .flat_map(|content| content.parts)
            .find_map(|part| part.inline_data)
            .ok_or_else(|| {
                AppError::GenerationFailed("provider response contained no image data".to_string())
            })?;
        metadata.insert("mimeType".to_string(), Value::String(inline.mime_type));

        Ok(GeneratedImage {
            payload: ImagePayload::Base64(inline.data),
            provider_kind: KIND.to_string(),
            config_id: self.config.id,
            model_used: Some(model.to_string()),
            metadata,
            cost_estimate: cost_estimate(&self.config, options),
        })
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

        let instruction = format!(
            "Edit the first image only where the second image (the mask) is white: {}",
            prompt
        );
        let parts = vec![
            ContentPart::text(instruction),
            ContentPart::png(&image),
            ContentPart::png(&mask),
        ];
        self.call(parts, options).await
    }
}

#[async_trait]
impl ImageProvider for GeminiProvider {
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
        info!(config_id = self.config.id, "Generating image with Gemini");
        let mut text = prompt.to_string();
        if let Some(negative) = options.negative_prompt.as_deref().filter(|n| !n.is_empty()) {
            text.push_str(&format!("\nAvoid: {}", negative));
        }
        let result = self.call(vec![ContentPart::text(text)], options).await;
        GenerationOutcome::from_result(&self.config, result)
    }

    async fn inpaint(
        &self,
        image_url: &str,
        mask_url: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> GenerationOutcome {
        info!(config_id = self.config.id, "Inpainting with Gemini");
        let result = self.try_inpaint(image_url, mask_url, prompt, options).await;
        GenerationOutcome::from_result(&self.config, result)
    }

    async fn probe(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/v1beta/models", self.config.base_url()))
            .header(API_KEY_HEADER, &self.config.api_key)
            .timeout(self.timeouts.validation)
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}
