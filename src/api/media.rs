//! Direct media endpoints: standalone image generation and audio
//! transcription. All upload validation happens here; the clients behind
//! these handlers assume well-formed input.

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use ts_rs::TS;

use crate::error::AppError;
use crate::image::ImageBackend;
use crate::AppState;

const MAX_PROMPT_CHARS: usize = 1000;

/// 25 MB audio ceiling, matching the transcription provider's limit.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Body limit for the transcribe route, with headroom for multipart framing.
pub(super) const UPLOAD_BODY_LIMIT: usize = 26 * 1024 * 1024;

const ALLOWED_AUDIO_TYPES: [&str; 9] = [
    "audio/webm",
    "audio/mp3",
    "audio/mpeg",
    "audio/wav",
    "audio/x-wav",
    "audio/m4a",
    "audio/ogg",
    "audio/flac",
    "video/webm",
];

#[derive(Debug, Deserialize, TS)]
#[ts(export)]
pub struct GenerateImageRequest {
    pub prompt: String,
}

fn validate_prompt(prompt: &str) -> Result<(), AppError> {
    if prompt.is_empty() {
        return Err(AppError::Validation("prompt must not be empty".into()));
    }
    if prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(AppError::Validation(format!(
            "prompt must be at most {MAX_PROMPT_CHARS} characters"
        )));
    }
    Ok(())
}

/// `POST /api/v1/image/generate`.
pub async fn generate_image(
    State(state): State<AppState>,
    Json(request): Json<GenerateImageRequest>,
) -> Result<Json<Value>, AppError> {
    validate_prompt(&request.prompt)?;

    let image = state.image.generate(&request.prompt).await?;
    Ok(Json(json!({ "image": image, "prompt": request.prompt })))
}

fn validate_audio(content_type: &str, size: usize) -> Result<(), AppError> {
    if !ALLOWED_AUDIO_TYPES.contains(&content_type) {
        return Err(AppError::Validation(format!(
            "unsupported audio type: {content_type}"
        )));
    }
    if size == 0 {
        return Err(AppError::Validation("audio file is empty".into()));
    }
    if size > MAX_UPLOAD_BYTES {
        return Err(AppError::Validation(
            "audio file exceeds the 25 MB limit".into(),
        ));
    }
    Ok(())
}

/// `POST /api/v1/voice/transcribe` — multipart upload with a `file` field.
pub async fn transcribe(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().unwrap_or("").to_string();
        let filename = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "audio.webm".to_string());
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("failed to read upload: {e}")))?;

        validate_audio(&content_type, data.len())?;

        let text = state.voice.transcribe(data.to_vec(), filename).await?;
        return Ok(Json(json!({ "text": text })));
    }

    Err(AppError::Validation("missing 'file' field".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_bounds() {
        assert!(matches!(validate_prompt(""), Err(AppError::Validation(_))));
        assert!(validate_prompt("a lighthouse").is_ok());
        assert!(validate_prompt(&"x".repeat(1000)).is_ok());
        assert!(matches!(
            validate_prompt(&"x".repeat(1001)),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_audio_type_allow_list() {
        assert!(validate_audio("audio/webm", 1024).is_ok());
        assert!(validate_audio("video/webm", 1024).is_ok());
        assert!(matches!(
            validate_audio("application/pdf", 1024),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_audio_size_bounds() {
        assert!(matches!(
            validate_audio("audio/wav", 0),
            Err(AppError::Validation(_))
        ));
        assert!(validate_audio("audio/wav", MAX_UPLOAD_BYTES).is_ok());
        assert!(matches!(
            validate_audio("audio/wav", MAX_UPLOAD_BYTES + 1),
            Err(AppError::Validation(_))
        ));
    }
}
