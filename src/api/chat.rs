//! Chat endpoints: the SSE stream and its non-streaming counterpart.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use ts_rs::TS;

use crate::chat;
use crate::error::AppError;
use crate::providers::TurnMessage;
use crate::AppState;

#[derive(Debug, Deserialize, TS)]
#[ts(export)]
pub struct ChatRequest {
    pub messages: Vec<TurnMessage>,
    pub model: Option<String>,
    pub conversation_id: Option<i64>,
}

impl ChatRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.messages.is_empty() {
            return Err(AppError::Validation("messages must not be empty".into()));
        }
        Ok(())
    }

    fn model(&self, state: &AppState) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| state.settings.default_model.clone())
    }
}

/// `POST /api/v1/chat/stream` — relay the turn as `text/event-stream`.
///
/// The orchestrator runs in its own task feeding a bounded channel, so each
/// event is flushed to the client before the next provider fragment is
/// pulled. Client disconnect closes the channel and abandons the turn.
pub async fn stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    request.validate()?;

    let model = request.model(&state);
    tracing::info!(%model, messages = request.messages.len(), "Starting chat stream");

    let (tx, rx) = mpsc::channel(1);
    let providers = state.providers.clone();
    let image = state.image.clone();

    tokio::spawn(async move {
        let fragments = providers.stream(request.messages, &model).await;
        chat::stream_turn(fragments, image.as_ref(), tx).await;
    });

    let events = ReceiverStream::new(rx).map(|event| Event::default().json_data(&event));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// `POST /api/v1/chat` — run the turn to completion and return one payload.
pub async fn complete(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Value>, AppError> {
    request.validate()?;

    let model = request.model(&state);
    tracing::info!(%model, messages = request.messages.len(), "Running chat completion");

    let fragments = state.providers.stream(request.messages, &model).await;
    let outcome = chat::complete_turn(fragments, state.image.as_ref()).await?;

    let mut body = json!({
        "message": { "role": "assistant", "content": outcome.content },
        "conversation_id": request.conversation_id,
    });
    if let Some(image) = outcome.image {
        body["image"] = Value::String(image);
    }
    if let Some(prompt) = outcome.image_prompt {
        body["imagePrompt"] = Value::String(prompt);
    }
    Ok(Json(body))
}

#[cfg(test)]
mod tests {
    use crate::db::models::Role;

    use super::*;

    #[test]
    fn test_empty_messages_rejected() {
        let request = ChatRequest {
            messages: vec![],
            model: None,
            conversation_id: None,
        };
        assert!(matches!(request.validate(), Err(AppError::Validation(_))));

        let request = ChatRequest {
            messages: vec![TurnMessage {
                role: Role::User,
                content: "hi".into(),
            }],
            model: None,
            conversation_id: Some(7),
        };
        assert!(request.validate().is_ok());
    }
}
