//! Text-to-image generation via the Hugging Face Inference API.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde_json::json;

use crate::config::missing_credential;
use crate::error::AppError;

const IMAGE_MODEL: &str = "stabilityai/stable-diffusion-xl-base-1.0";
const IMAGE_API_URL: &str = "https://router.huggingface.co/hf-inference/models";

// Fixed generation parameters; image synthesis is slow, hence the long timeout.
const GUIDANCE_SCALE: f64 = 7.5;
const NUM_INFERENCE_STEPS: u32 = 30;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Image-generation backend, abstracted so the stream orchestrator can be
/// exercised with a test double.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Generate an image for `prompt` and return it as a base64 string.
    async fn generate(&self, prompt: &str) -> Result<String, AppError>;
}

/// HTTP client for the Hugging Face image endpoint. Holds only immutable
/// configuration; safe for concurrent use.
pub struct ImageClient {
    api_key: Option<String>,
    api_url: String,
    http: reqwest::Client,
}

impl ImageClient {
    pub fn new(api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");

        Self {
            api_key,
            api_url: format!("{IMAGE_API_URL}/{IMAGE_MODEL}"),
            http,
        }
    }

    fn api_key(&self) -> Result<&str, AppError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| missing_credential("HUGGINGFACE_API_KEY"))
    }
}

fn request_body(prompt: &str) -> serde_json::Value {
    json!({
        "inputs": prompt,
        "parameters": {
            "guidance_scale": GUIDANCE_SCALE,
            "num_inference_steps": NUM_INFERENCE_STEPS,
        }
    })
}

#[async_trait]
impl ImageBackend for ImageClient {
    async fn generate(&self, prompt: &str) -> Result<String, AppError> {
        let api_key = self.api_key()?;

        tracing::debug!(prompt_len = prompt.len(), "Requesting image generation");

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&request_body(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::ImageGeneration(detail));
        }

        // Response body is the raw image bytes
        let image_bytes = response.bytes().await?;
        Ok(general_purpose::STANDARD.encode(&image_bytes))
    }
}
