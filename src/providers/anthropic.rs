use async_trait::async_trait;
use futures_util::{future, StreamExt};
use serde_json::{json, Value};

use crate::config::missing_credential;
use crate::db::models::Role;
use crate::error::AppError;

use super::{sse, FragmentStream, TextProvider, TurnMessage};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Anthropic messages backend. The first system-role message is lifted out of
/// the list into the dedicated `system` request parameter.
pub struct AnthropicProvider {
    api_key: Option<String>,
    base_url: String,
    http: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: ANTHROPIC_BASE_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn api_key(&self) -> Result<&str, AppError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| missing_credential("ANTHROPIC_API_KEY"))
    }
}

/// Split the first system message out of the conversation.
fn split_system(messages: &[TurnMessage]) -> (String, Vec<Value>) {
    let mut system = String::new();
    let mut conversation = Vec::new();

    for msg in messages {
        if msg.role == Role::System {
            if system.is_empty() {
                system = msg.content.clone();
            }
        } else {
            conversation.push(json!({ "role": msg.role.as_str(), "content": msg.content }));
        }
    }

    (system, conversation)
}

/// Extract assistant text from one Anthropic stream event, or surface an
/// in-band error event.
fn parse_event(data: &str) -> Option<Result<String, AppError>> {
    let value: Value = serde_json::from_str(data).ok()?;
    match value.get("type").and_then(|t| t.as_str()).unwrap_or("") {
        "content_block_delta" => value
            .pointer("/delta/text")
            .and_then(|t| t.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| Ok(s.to_string())),
        "error" => {
            let message = value
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown stream error");
            Some(Err(AppError::Provider(format!("Anthropic: {message}"))))
        }
        _ => None,
    }
}

fn is_message_stop(data: &str) -> bool {
    serde_json::from_str::<Value>(data)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(|t| t == "message_stop"))
        .unwrap_or(false)
}

#[async_trait]
impl TextProvider for AnthropicProvider {
    fn family_name(&self) -> &'static str {
        "Anthropic"
    }

    async fn stream(
        &self,
        messages: Vec<TurnMessage>,
        model: &str,
    ) -> Result<FragmentStream, AppError> {
        let api_key = self.api_key()?;

        let (system, conversation) = split_system(&messages);
        let body = json!({
            "model": model,
            "max_tokens": MAX_TOKENS,
            "system": system,
            "messages": conversation,
            "stream": true,
        });

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "Anthropic request failed ({status}): {detail}"
            )));
        }

        let fragments = sse::data_lines(response.bytes_stream())
            .take_while(|item| {
                let stop = matches!(item, Ok(data) if is_message_stop(data));
                future::ready(!stop)
            })
            .filter_map(|item| async move {
                match item {
                    Ok(data) => parse_event(&data),
                    Err(e) => Some(Err(e)),
                }
            });

        Ok(Box::pin(fragments))
    }
}
