//! Environment-driven configuration for the orchestration core
//!
//! The assistant reads its backend selection and credentials from the
//! environment at startup, the same surface the rest of the deployment
//! scripts already manage. Missing credentials for the selected provider are
//! a fatal configuration error; everything else has a workable default.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::conversation::HistoryBudget;
use crate::errors::AssistantError;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are Vox, a highly capable personal assistant. Answer concisely and \
     use the available tools when they help you answer accurately.";

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "qwq:32b";
const DEFAULT_PROMPT_PATH: &str = "systemprompt.txt";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_RETRIES: usize = 5;

/// Backend selection plus the settings that backend needs. Only the selected
/// provider's settings are materialized.
#[derive(Debug, Clone)]
pub enum ProviderSettings {
    OpenAi {
        api_key: String,
        model: String,
        api_base: String,
    },
    Ollama {
        host: String,
        model: String,
    },
}

#[derive(Debug, Clone)]
pub struct VoxConfig {
    pub provider: ProviderSettings,
    pub system_prompt: String,
    pub request_timeout: Duration,
    pub max_retries: usize,
    pub history: HistoryBudget,
}

impl VoxConfig {
    /// Builds a configuration from the process environment.
    ///
    /// `VOX_PROVIDER` selects the backend (`openai` or `ollama`, default
    /// `openai`). OpenAI requires `OPENAI_API_KEY`; Ollama needs nothing
    /// beyond an optionally overridden `OLLAMA_HOST`.
    pub fn from_env() -> Result<Self, AssistantError> {
        let provider_name = env::var("VOX_PROVIDER")
            .unwrap_or_else(|_| "openai".to_string())
            .to_lowercase();

        let provider = match provider_name.as_str() {
            "openai" => {
                let api_key = env::var("OPENAI_API_KEY").map_err(|_| {
                    AssistantError::Config(
                        "OPENAI_API_KEY is required when VOX_PROVIDER=openai".to_string(),
                    )
                })?;
                ProviderSettings::OpenAi {
                    api_key,
                    model: env::var("OPENAI_MODEL")
                        .unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_string()),
                    api_base: env::var("OPENAI_API_BASE")
                        .unwrap_or_else(|_| DEFAULT_OPENAI_API_BASE.to_string()),
                }
            }
            "ollama" => ProviderSettings::Ollama {
                host: env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string()),
                model: env::var("OLLAMA_MODEL")
                    .unwrap_or_else(|_| DEFAULT_OLLAMA_MODEL.to_string()),
            },
            other => {
                return Err(AssistantError::Config(format!(
                    "unsupported provider '{}', expected 'openai' or 'ollama'",
                    other
                )))
            }
        };

        let prompt_path =
            env::var("VOX_SYSTEM_PROMPT").unwrap_or_else(|_| DEFAULT_PROMPT_PATH.to_string());

        let request_timeout = env::var("VOX_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        let max_retries = env::var("VOX_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_RETRIES);

        Ok(Self {
            provider,
            system_prompt: load_system_prompt(&prompt_path),
            request_timeout,
            max_retries,
            history: HistoryBudget::default(),
        })
    }
}

/// Loads the system prompt from a file, falling back to the built-in default
/// when the file is missing, unreadable, or blank.
pub fn load_system_prompt(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(content) => {
            let trimmed = content.trim();
            if trimmed.is_empty() {
                log::warn!(
                    "system prompt file {} is empty, using default",
                    path.display()
                );
                DEFAULT_SYSTEM_PROMPT.to_string()
            } else {
                log::debug!("loaded system prompt from {}", path.display());
                trimmed.to_string()
            }
        }
        Err(e) => {
            log::debug!(
                "system prompt file {} not readable ({}), using default",
                path.display(),
                e
            );
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
    }
}
