//! Provider adapter implementations
//!
//! One module per backend. Each adapter implements the common `ChatProvider`
//! trait while handling that backend's protocol, authentication, and
//! response quirks.

use std::sync::Arc;

use crate::config::{ProviderSettings, VoxConfig};
use crate::errors::AssistantError;
use crate::llm::ChatProvider;

pub mod ollama;
pub mod openai;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Creates the provider adapter selected by the configuration.
pub fn create_provider(config: &VoxConfig) -> Result<Arc<dyn ChatProvider>, AssistantError> {
    match &config.provider {
        ProviderSettings::OpenAi {
            api_key,
            model,
            api_base,
        } => {
            let client = OpenAiProvider::new(api_key.clone(), model.clone())
                .with_api_base(api_base.clone());
            log::info!("using OpenAI provider (model: {})", model);
            Ok(Arc::new(client))
        }
        ProviderSettings::Ollama { host, model } => {
            let client = OllamaProvider::new(host.clone(), model.clone());
            log::info!("using Ollama provider (model: {}, host: {})", model, host);
            Ok(Arc::new(client))
        }
    }
}
