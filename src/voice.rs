//! Speech-to-text transcription via Groq's Whisper endpoint.

use std::time::Duration;

use crate::config::missing_credential;
use crate::error::AppError;

const TRANSCRIPTION_URL: &str = "https://api.groq.com/openai/v1/audio/transcriptions";
const WHISPER_MODEL: &str = "whisper-large-v3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the Groq audio transcription API.
pub struct VoiceClient {
    api_key: Option<String>,
    api_url: String,
    http: reqwest::Client,
}

impl VoiceClient {
    pub fn new(api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");

        Self {
            api_key,
            api_url: TRANSCRIPTION_URL.to_string(),
            http,
        }
    }

    fn api_key(&self) -> Result<&str, AppError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| missing_credential("GROQ_API_KEY"))
    }

    /// Transcribe an audio clip. Returns the recognized text with
    /// surrounding whitespace trimmed.
    pub async fn transcribe(&self, audio: Vec<u8>, filename: String) -> Result<String, AppError> {
        let api_key = self.api_key()?;

        tracing::debug!(bytes = audio.len(), %filename, "Transcribing audio");

        let file_part = reqwest::multipart::Part::bytes(audio).file_name(filename);
        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", WHISPER_MODEL)
            .text("response_format", "text")
            .text("language", "en");

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Transcription(format!(
                "transcription request failed ({status}): {detail}"
            )));
        }

        let text = response.text().await?;
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_credential_fails_before_network() {
        let client = VoiceClient::new(None);
        match client.transcribe(vec![0u8; 16], "clip.webm".into()).await {
            Err(AppError::Config(msg)) => assert!(msg.contains("GROQ_API_KEY")),
            other => panic!("Expected Config error, got {:?}", other.map(|_| ())),
        }
    }
}
