use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::AppError;

/// Process-wide configuration, read once at startup and never mutated.
///
/// Provider credentials are optional: a missing key disables only the
/// dependent feature. The provider clients raise `AppError::Config` naming
/// the missing variable when the feature is actually used.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub default_model: String,
    pub cors_origins: Vec<String>,

    pub groq_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub huggingface_api_key: Option<String>,
}

impl Settings {
    /// Load settings from environment variables. Call `dotenvy::dotenv()`
    /// before this so a local `.env` file is honored.
    pub fn from_env() -> Result<Self, AppError> {
        let bind_addr = env_or("ZENO_BIND_ADDR", "127.0.0.1:8000")
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Config(format!("ZENO_BIND_ADDR is not a valid socket address: {e}")))?;

        let data_dir = PathBuf::from(env_or("ZENO_DATA_DIR", "./data"));

        let default_model = env_or("ZENO_DEFAULT_MODEL", "llama-3.3-70b-versatile");

        let cors_origins = env_or(
            "ZENO_CORS_ORIGINS",
            "http://localhost:3000,http://127.0.0.1:3000",
        )
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

        Ok(Settings {
            bind_addr,
            data_dir,
            default_model,
            cors_origins,
            groq_api_key: optional_env("GROQ_API_KEY"),
            openai_api_key: optional_env("OPENAI_API_KEY"),
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            huggingface_api_key: optional_env("HUGGINGFACE_API_KEY"),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default.to_string(),
    }
}

/// Read an optional credential. Empty values count as absent so a stray
/// `GROQ_API_KEY=` line in a .env file does not enable the feature.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Error helper for provider clients: a consistent, actionable message
/// naming the missing environment variable.
pub fn missing_credential(var: &str) -> AppError {
    AppError::Config(format!("{var} not configured. Add {var} to your .env file."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_names_variable() {
        let err = missing_credential("HUGGINGFACE_API_KEY");
        match err {
            AppError::Config(msg) => {
                assert!(msg.contains("HUGGINGFACE_API_KEY"));
                assert!(msg.contains(".env"));
            }
            other => panic!("Expected Config, got {other:?}"),
        }
    }
}
