//! Core type definitions for the assistant-LLM communication protocol
//!
//! This module defines the data structures exchanged between the orchestration
//! loop, the provider adapters, and the tool dispatcher. The shapes follow
//! OpenAI's function calling format closely since it is the de facto wire
//! format, but every provider adapter normalizes into these types before
//! anything downstream sees a response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single transcript entry. Messages are never mutated after creation;
/// the conversation state only appends them or prunes transient entries.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub role: Role,
    /// Absent when an assistant message carries only tool-call requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Present only on assistant messages that request tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Correlates a tool result to its originating request. Some backends
    /// never assign ids, in which case correlation falls back to `name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Capability name, present only on tool-role messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant(content: Option<String>, tool_calls: Option<Vec<ToolCall>>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool_result(result: &ToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: Some(result.content.clone()),
            tool_calls: None,
            tool_call_id: result.tool_call_id.clone(),
            name: Some(result.name.clone()),
        }
    }
}

/// A structured request, emitted by the model, to invoke one capability.
///
/// `arguments` is a JSON object after adapter normalization. When a backend
/// returns arguments as a raw string the adapter decodes it; if decoding
/// fails the raw string is preserved here and the dispatcher reports an
/// isolated error for this call instead of executing it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolCall {
    pub id: Option<String>,
    pub name: String,
    pub arguments: Value,
}

/// Exactly one of these is produced per [`ToolCall`], regardless of outcome.
/// `content` is a JSON-serialized value on success or an `{"error": ...}`
/// object on failure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ToolResult {
    pub tool_call_id: Option<String>,
    pub name: String,
    pub content: String,
}

/// A provider response normalized into the provider-agnostic shape the
/// orchestration loop works with.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProviderResponse {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ProviderResponse {
    /// True when the response carries neither usable text nor tool calls.
    /// The loop treats this as a malformed response and retries.
    pub fn is_empty(&self) -> bool {
        let no_content = self
            .content
            .as_deref()
            .map(|c| c.trim().is_empty())
            .unwrap_or(true);
        let no_calls = self
            .tool_calls
            .as_ref()
            .map(|calls| calls.is_empty())
            .unwrap_or(true);
        no_content && no_calls
    }
}
