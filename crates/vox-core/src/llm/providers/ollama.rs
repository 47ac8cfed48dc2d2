//! Ollama native chat adapter.
//!
//! Talks to a local or remote Ollama server over `/api/chat`. Unlike OpenAI,
//! Ollama assigns no per-call ids, so downstream correlation falls back to
//! the capability name, and tool-call arguments usually arrive as a JSON
//! object already (a raw string is tolerated and decoded).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core_types::{Message, ProviderResponse, Role, ToolCall};
use crate::errors::AssistantError;
use crate::llm::{ChatProvider, ToolSchema};

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    host: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(host: String, model: String) -> Self {
        Self {
            client: Client::new(),
            host: host.trim_end_matches('/').to_string(),
            model,
        }
    }

    fn build_request_body(&self, messages: &[Message], tools: &[ToolSchema]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": self.format_messages(messages),
            "stream": false,
        });

        if !tools.is_empty() {
            let formatted: Vec<Value> = tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = formatted.into();
        }

        body
    }

    fn format_messages(&self, messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                };
                let mut message = json!({
                    "role": role,
                    "content": msg.content.clone().unwrap_or_default(),
                });

                if msg.role == Role::Assistant {
                    if let Some(tool_calls) = &msg.tool_calls {
                        if !tool_calls.is_empty() {
                            let formatted: Vec<Value> = tool_calls
                                .iter()
                                .map(|tc| {
                                    json!({
                                        "function": {
                                            "name": tc.name,
                                            "arguments": tc.arguments,
                                        }
                                    })
                                })
                                .collect();
                            message["tool_calls"] = json!(formatted);
                        }
                    }
                }

                message
            })
            .collect()
    }

    fn parse_response(&self, response: Value) -> Result<ProviderResponse, AssistantError> {
        let message = response
            .get("message")
            .ok_or_else(|| AssistantError::Parsing("no message in response".to_string()))?;

        let content = message["content"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        let tool_calls = message["tool_calls"].as_array().map(|calls| {
            calls
                .iter()
                .filter_map(|call| {
                    let function = call["function"].as_object()?;
                    let name = function.get("name")?.as_str()?.to_string();
                    let arguments = match function.get("arguments") {
                        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
                            Ok(value) => value,
                            Err(e) => {
                                log::warn!(
                                    "invalid arguments JSON for tool call '{}': {}",
                                    name,
                                    e
                                );
                                Value::String(raw.clone())
                            }
                        },
                        Some(value) => value.clone(),
                        None => json!({}),
                    };

                    // Ollama supplies no per-call id; correlation downstream
                    // falls back to the capability name.
                    Some(ToolCall {
                        id: None,
                        name,
                        arguments,
                    })
                })
                .collect::<Vec<_>>()
        });

        let tool_calls = tool_calls.filter(|calls: &Vec<ToolCall>| !calls.is_empty());

        Ok(ProviderResponse {
            content,
            tool_calls,
        })
    }
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        timeout: Duration,
    ) -> Result<ProviderResponse, AssistantError> {
        let url = format!("{}/api/chat", self.host);
        let body = self.build_request_body(messages, tools);
        log::debug!("Ollama request to {} ({} messages)", url, messages.len());

        let request = self.client.post(&url).json(&body).send();

        let response = tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| AssistantError::Timeout(timeout.as_secs()))??;

        let status = response.status();
        let response_text = tokio::time::timeout(timeout, response.text())
            .await
            .map_err(|_| AssistantError::Timeout(timeout.as_secs()))??;

        if !status.is_success() {
            return Err(AssistantError::Provider(format!(
                "API request failed with status {}: {}",
                status, response_text
            )));
        }

        let response_json: Value = serde_json::from_str(&response_text)
            .map_err(|e| AssistantError::Parsing(format!("invalid JSON response: {}", e)))?;

        self.parse_response(response_json)
    }
}
