//! Language model provider abstractions.
//!
//! Defines the `ChatProvider` trait the orchestration loop depends on, plus
//! one concrete adapter per supported backend. Adapters own every
//! provider-specific detail: wire format, authentication, timeout handling,
//! and normalization of tool-call payloads into [`crate::core_types`] shapes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core_types::{Message, ProviderResponse};
use crate::errors::AssistantError;

pub mod providers;

pub use providers::create_provider;

/// JSON-Schema-style descriptor for one capability, advertised to the model
/// so it can decide which tools to invoke.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One backend's chat-completion surface.
///
/// Implementations must apply `timeout` as a hard bound on the network call
/// and surface expiry as [`AssistantError::Timeout`], must tolerate an empty
/// `tools` slice by omitting tool-choice directives entirely, and must
/// normalize tool-call arguments to a JSON object where the backend allows a
/// raw string.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        timeout: Duration,
    ) -> Result<ProviderResponse, AssistantError>;
}
