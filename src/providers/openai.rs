use async_trait::async_trait;
use futures_util::{future, StreamExt};
use serde_json::{json, Value};

use crate::config::missing_credential;
use crate::error::AppError;

use super::{sse, FragmentStream, TextProvider, TurnMessage};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default text backend (OpenAI). Messages pass through untouched; system
/// messages stay inline in the list.
pub struct OpenAiProvider {
    api_key: Option<String>,
    base_url: String,
    http: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: OPENAI_BASE_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn api_key(&self) -> Result<&str, AppError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| missing_credential("OPENAI_API_KEY"))
    }
}

fn wire_messages(messages: &[TurnMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| json!({ "role": msg.role.as_str(), "content": msg.content }))
        .collect()
}

fn delta_content(data: &str) -> Option<String> {
    let value: Value = serde_json::from_str(data).ok()?;
    value
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[async_trait]
impl TextProvider for OpenAiProvider {
    fn family_name(&self) -> &'static str {
        "OpenAI"
    }

    async fn stream(
        &self,
        messages: Vec<TurnMessage>,
        model: &str,
    ) -> Result<FragmentStream, AppError> {
        let api_key = self.api_key()?;

        let body = json!({
            "model": model,
            "messages": wire_messages(&messages),
            "stream": true,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "OpenAI request failed ({status}): {detail}"
            )));
        }

        let fragments = sse::data_lines(response.bytes_stream())
            .take_while(|item| {
                let stop = matches!(item, Ok(data) if data == "[DONE]");
                future::ready(!stop)
            })
            .filter_map(|item| async move {
                match item {
                    Ok(data) => delta_content(&data).map(Ok),
                    Err(e) => Some(Err(e)),
                }
            });

        Ok(Box::pin(fragments))
    }
}

#[cfg(test)]
mod tests {
    use crate::db::models::Role;

    use super::*;

    #[test]
    fn test_messages_pass_through_including_system() {
        let wire = wire_messages(&[
            TurnMessage {
                role: Role::System,
                content: "You are terse.".into(),
            },
            TurnMessage {
                role: Role::User,
                content: "hello".into(),
            },
        ]);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[0]["content"], "You are terse.");
        assert_eq!(wire[1]["role"], "user");
    }

    #[test]
    fn test_delta_content_extraction() {
        let chunk = r#"{"id":"c1","choices":[{"delta":{"content":"lo"},"finish_reason":null}]}"#;
        assert_eq!(delta_content(chunk), Some("lo".to_string()));
        assert_eq!(delta_content(r#"{"choices":[{"delta":{}}]}"#), None);
    }
}
