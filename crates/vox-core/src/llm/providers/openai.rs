//! OpenAI chat-completions adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core_types::{Message, ProviderResponse, Role, ToolCall};
use crate::errors::AssistantError;
use crate::llm::{ChatProvider, ToolSchema};

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_base: "https://api.openai.com/v1".to_string(),
            model,
        }
    }

    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn build_request_body(&self, messages: &[Message], tools: &[ToolSchema]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": self.format_messages(messages),
        });

        // An empty tools array with a tool_choice directive is rejected by
        // some OpenAI-compatible servers, so both keys are omitted entirely
        // when no capabilities are registered.
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
            body["tool_choice"] = "auto".into();
        }

        body
    }

    fn format_messages(&self, messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| {
                let mut message = json!({
                    "role": format_role(&msg.role),
                    "content": msg.content.clone(),
                });

                if msg.role == Role::Tool {
                    if let Some(tool_call_id) = &msg.tool_call_id {
                        message["tool_call_id"] = json!(tool_call_id);
                    }
                    if let Some(name) = &msg.name {
                        message["name"] = json!(name);
                    }
                }

                if msg.role == Role::Assistant {
                    if let Some(tool_calls) = &msg.tool_calls {
                        if !tool_calls.is_empty() {
                            let formatted: Vec<Value> = tool_calls
                                .iter()
                                .map(|tc| {
                                    json!({
                                        // The API requires an id when echoing
                                        // assistant tool calls back; synthesize
                                        // one for calls that arrived without.
                                        "id": tc.id.clone().unwrap_or_else(|| {
                                            format!("call_{}", uuid::Uuid::new_v4().simple())
                                        }),
                                        "type": "function",
                                        "function": {
                                            "name": tc.name,
                                            "arguments": tc.arguments.to_string(),
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
        let message = response["choices"]
            .as_array()
            .and_then(|choices| choices.first())
            .map(|choice| &choice["message"])
            .ok_or_else(|| AssistantError::Parsing("no choices in response".to_string()))?;

        let content = message["content"].as_str().map(|s| s.to_string());

        let tool_calls = message["tool_calls"].as_array().map(|calls| {
            calls
                .iter()
                .filter_map(|call| {
                    let function = call["function"].as_object()?;
                    let name = function.get("name")?.as_str()?.to_string();
                    let id = call["id"].as_str().map(|s| s.to_string());
                    let raw_arguments = function
                        .get("arguments")
                        .and_then(|a| a.as_str())
                        .unwrap_or("{}");

                    // A decode failure for one call's arguments must not
                    // abort its siblings; the raw string is preserved and
                    // the dispatcher reports an isolated error for it.
                    let arguments = match serde_json::from_str::<Value>(raw_arguments) {
                        Ok(value) => value,
                        Err(e) => {
                            log::warn!("invalid arguments JSON for tool call '{}': {}", name, e);
                            Value::String(raw_arguments.to_string())
                        }
                    };

                    Some(ToolCall {
                        id,
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

fn format_role(role: &Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        timeout: Duration,
    ) -> Result<ProviderResponse, AssistantError> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_request_body(messages, tools);
        log::debug!("OpenAI request to {} ({} messages)", url, messages.len());

        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send();

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
