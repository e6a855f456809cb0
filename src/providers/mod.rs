pub mod anthropic;
pub mod groq;
pub mod openai;
pub(crate) mod sse;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::config::Settings;
use crate::db::models::Role;
use crate::error::AppError;

/// Persona instruction injected by the fast-inference backend. It documents
/// the exact `[GEN_IMG]` directive syntax the model must emit to request an
/// image; the directive parser depends on the model following it.
pub const SYSTEM_PROMPT: &str = "You are a professional AI assistant. You communicate clearly, concisely, and helpfully with accurate, well-structured responses. When the user asks you to generate, create, make, or draw an image, respond with [GEN_IMG] followed by a detailed prompt for the image. For example, if they say 'draw a cat', respond: 'I would be happy to create that for you. [GEN_IMG] A cute fluffy cat with large expressive eyes sitting in a warm, cozy setting with soft lighting'. Maintain a friendly yet professional tone at all times.";

/// One incremental piece of assistant text, or a mid-stream failure.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, AppError>> + Send>>;

/// A single chat turn message as submitted by the client.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TurnMessage {
    pub role: Role,
    pub content: String,
}

// =============================================================================
// ProviderKind — which text-completion backend serves a model
// =============================================================================

/// Supported text-completion backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Groq,
    Anthropic,
    OpenAi,
}

/// Model families served by the fast-inference (Groq) backend. Matched by
/// literal prefix or substring against the model identifier.
const FAST_FAMILIES: [&str; 4] = ["llama", "mixtral", "gemma", "llama-3"];

impl ProviderKind {
    /// Pure classification of a model identifier. First match wins:
    /// fast-inference families, then the `claude` prefix, then the default
    /// OpenAI backend.
    pub fn classify(model: &str) -> Self {
        if FAST_FAMILIES
            .iter()
            .any(|family| model.starts_with(family) || model.contains(family))
        {
            ProviderKind::Groq
        } else if model.starts_with("claude") {
            ProviderKind::Anthropic
        } else {
            ProviderKind::OpenAi
        }
    }
}

// =============================================================================
// TextProvider trait
// =============================================================================

/// Abstraction over streaming text-completion backends.
///
/// `stream` checks the backend credential before any network I/O
/// (`AppError::Config` when absent), then returns a finite, non-restartable
/// sequence of text fragments in arrival order.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Human-readable backend name for error messages and logs.
    fn family_name(&self) -> &'static str;

    async fn stream(
        &self,
        messages: Vec<TurnMessage>,
        model: &str,
    ) -> Result<FragmentStream, AppError>;
}

// =============================================================================
// Registry
// =============================================================================

/// All configured backends, constructed once at startup from `Settings` and
/// shared immutably across requests.
pub struct ProviderRegistry {
    groq: groq::GroqProvider,
    openai: openai::OpenAiProvider,
    anthropic: anthropic::AnthropicProvider,
}

impl ProviderRegistry {
    pub fn new(settings: &Settings) -> Self {
        Self {
            groq: groq::GroqProvider::new(settings.groq_api_key.clone()),
            openai: openai::OpenAiProvider::new(settings.openai_api_key.clone()),
            anthropic: anthropic::AnthropicProvider::new(settings.anthropic_api_key.clone()),
        }
    }

    fn resolve(&self, kind: ProviderKind) -> &dyn TextProvider {
        match kind {
            ProviderKind::Groq => &self.groq,
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Anthropic => &self.anthropic,
        }
    }

    /// Route a chat completion to the backend serving `model` and stream its
    /// text fragments.
    pub async fn stream(
        &self,
        messages: Vec<TurnMessage>,
        model: &str,
    ) -> Result<FragmentStream, AppError> {
        let kind = ProviderKind::classify(model);
        let provider = self.resolve(kind);
        tracing::debug!(model, backend = provider.family_name(), "Routing chat completion");
        provider.stream(messages, model).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_fast_families_route_to_groq() {
        assert_eq!(ProviderKind::classify("llama-3.3-70b-versatile"), ProviderKind::Groq);
        assert_eq!(ProviderKind::classify("mixtral-8x7b-32768"), ProviderKind::Groq);
        assert_eq!(ProviderKind::classify("gemma2-9b-it"), ProviderKind::Groq);
        // Substring match, not just prefix
        assert_eq!(ProviderKind::classify("meta-llama/llama-4-scout"), ProviderKind::Groq);
    }

    #[test]
    fn test_classify_claude_prefix_routes_to_anthropic() {
        assert_eq!(ProviderKind::classify("claude-sonnet-4-5"), ProviderKind::Anthropic);
        assert_eq!(ProviderKind::classify("claude-3-haiku"), ProviderKind::Anthropic);
    }

    #[test]
    fn test_classify_defaults_to_openai() {
        assert_eq!(ProviderKind::classify("gpt-4-turbo"), ProviderKind::OpenAi);
        assert_eq!(ProviderKind::classify("o3-mini"), ProviderKind::OpenAi);
    }

    #[test]
    fn test_fast_family_check_precedes_claude() {
        // First match wins: a hypothetical id containing a fast-family name
        // routes to Groq even with a claude prefix.
        assert_eq!(ProviderKind::classify("claude-llama-hybrid"), ProviderKind::Groq);
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_network() {
        let registry = ProviderRegistry::new(&crate::config::Settings {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            data_dir: std::env::temp_dir(),
            default_model: "llama-3.3-70b-versatile".into(),
            cors_origins: vec![],
            groq_api_key: None,
            openai_api_key: None,
            anthropic_api_key: None,
            huggingface_api_key: None,
        });

        let messages = vec![TurnMessage {
            role: Role::User,
            content: "hi".into(),
        }];

        for model in ["llama-3.3-70b-versatile", "claude-3-haiku", "gpt-4-turbo"] {
            match registry.stream(messages.clone(), model).await {
                Err(AppError::Config(msg)) => assert!(msg.contains("API_KEY"), "{msg}"),
                other => panic!("Expected Config error for {model}, got {:?}", other.map(|_| ())),
            }
        }
    }
}
