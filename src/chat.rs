//! Chat turn orchestration.
//!
//! A turn relays provider text fragments to the client, then inspects the
//! accumulated reply for an inline `[GEN_IMG]` directive and, when present,
//! splices a generated image into the same stream. The state machine is
//! explicit so the event ordering rules are enforced in one place: every turn
//! ends with exactly one `done: true` event, and image failure degrades the
//! turn instead of failing it.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use ts_rs::TS;

use crate::directive;
use crate::error::AppError;
use crate::image::ImageBackend;
use crate::providers::FragmentStream;

/// Inline notice shown to the user while the image backend works.
const GENERATING_NOTICE: &str = " 🎨 generating...";

/// One server-sent event on the chat stream.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct StreamEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(rename = "imagePrompt", skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamEvent {
    fn fragment(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            done: false,
            image: None,
            image_prompt: None,
            error: None,
        }
    }

    fn done() -> Self {
        Self {
            content: Some(String::new()),
            done: true,
            image: None,
            image_prompt: None,
            error: None,
        }
    }

    fn done_with_image(image: String, prompt: String) -> Self {
        Self {
            content: Some(String::new()),
            done: true,
            image: Some(image),
            image_prompt: Some(prompt),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            content: None,
            done: true,
            image: None,
            image_prompt: None,
            error: Some(message.into()),
        }
    }
}

/// Result of a non-streaming chat turn.
#[derive(Debug, Serialize)]
pub struct ChatOutcome {
    pub content: String,
    pub image: Option<String>,
    pub image_prompt: Option<String>,
}

/// Phases of one chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    StreamingText,
    CheckingDirective,
    GeneratingImage,
    Done,
}

/// Run one streamed chat turn, sending events into `tx`.
///
/// `fragments` is the adapter's result so that a synchronous failure (missing
/// credential, upstream refusal) still produces a well-formed terminal event
/// on the stream. A closed receiver means the client went away; the turn is
/// abandoned without side effects.
pub async fn stream_turn(
    fragments: Result<FragmentStream, AppError>,
    image_backend: &dyn ImageBackend,
    tx: mpsc::Sender<StreamEvent>,
) {
    let mut stream = match fragments {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "Chat turn failed before streaming");
            let _ = tx.send(StreamEvent::error(e.to_string())).await;
            return;
        }
    };

    let mut state = TurnState::StreamingText;
    let mut accumulated = String::new();
    let mut prompt = String::new();

    while state != TurnState::Done {
        match state {
            TurnState::StreamingText => match stream.next().await {
                Some(Ok(fragment)) => {
                    accumulated.push_str(&fragment);
                    // Await delivery before pulling the next fragment; the
                    // bounded channel is the backpressure mechanism.
                    if tx.send(StreamEvent::fragment(fragment)).await.is_err() {
                        return;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Provider stream failed mid-turn");
                    let _ = tx.send(StreamEvent::error(e.to_string())).await;
                    state = TurnState::Done;
                }
                None => state = TurnState::CheckingDirective,
            },
            TurnState::CheckingDirective => {
                state = match directive::parse(&accumulated) {
                    (_, Some(found)) => {
                        prompt = found;
                        TurnState::GeneratingImage
                    }
                    (_, None) => {
                        let _ = tx.send(StreamEvent::done()).await;
                        TurnState::Done
                    }
                };
            }
            TurnState::GeneratingImage => {
                if tx.send(StreamEvent::fragment(GENERATING_NOTICE)).await.is_err() {
                    return;
                }
                let terminal = match image_backend.generate(&prompt).await {
                    Ok(image) => StreamEvent::done_with_image(image, std::mem::take(&mut prompt)),
                    Err(e) => {
                        tracing::warn!(error = %e, "Image generation failed, continuing turn");
                        let notice = format!(" (image gen failed: {e})");
                        if tx.send(StreamEvent::fragment(notice)).await.is_err() {
                            return;
                        }
                        StreamEvent::done()
                    }
                };
                let _ = tx.send(terminal).await;
                state = TurnState::Done;
            }
            TurnState::Done => unreachable!(),
        }
    }
}

/// Run one chat turn to completion without streaming.
///
/// Provider failure is fatal; image failure yields a text-only outcome.
pub async fn complete_turn(
    fragments: Result<FragmentStream, AppError>,
    image_backend: &dyn ImageBackend,
) -> Result<ChatOutcome, AppError> {
    let mut stream = fragments?;

    let mut content = String::new();
    while let Some(fragment) = stream.next().await {
        content.push_str(&fragment?);
    }

    let (cleaned, prompt) = directive::parse(&content);
    let Some(prompt) = prompt else {
        return Ok(ChatOutcome {
            content,
            image: None,
            image_prompt: None,
        });
    };

    match image_backend.generate(&prompt).await {
        Ok(image) => Ok(ChatOutcome {
            content: cleaned,
            image: Some(image),
            image_prompt: Some(prompt),
        }),
        Err(e) => {
            tracing::warn!(error = %e, "Image generation failed, returning text only");
            Ok(ChatOutcome {
                content: cleaned,
                image: None,
                image_prompt: None,
            })
        }
    }
}
