//! Tool dispatcher: executes requested tool calls with error isolation.
//!
//! Every requested call produces exactly one result, in request order,
//! regardless of outcome. An unknown name, malformed arguments, a capability
//! error, or even a panic inside a capability all become an `{"error": ...}`
//! payload for that one call; siblings in the batch are unaffected. Sibling
//! calls execute concurrently as independent tasks, with results collected
//! back into request order before they touch the transcript.

use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::{json, Value};

use crate::capability::{Capability, SharedRegistry};
use crate::core_types::{ToolCall, ToolResult};

pub struct ToolDispatcher {
    registry: SharedRegistry,
}

impl ToolDispatcher {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    /// Executes a batch of tool calls and returns one result per call, in
    /// the order the calls were requested.
    pub async fn dispatch(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        // Resolve against the live registry, then release the lock before
        // any capability runs.
        let (resolved, names) = {
            let registry = match self.registry.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let resolved: Vec<Option<Arc<dyn Capability>>> =
                calls.iter().map(|call| registry.get(&call.name)).collect();
            (resolved, registry.names())
        };

        let tasks = calls.iter().cloned().zip(resolved).map(|(call, capability)| {
            let names = names.clone();
            tokio::spawn(async move { run_one(call, capability, &names).await })
        });

        join_all(tasks)
            .await
            .into_iter()
            .zip(calls)
            .map(|(joined, call)| match joined {
                Ok(result) => result,
                // A panicking capability must not take the batch down.
                Err(e) => {
                    log::error!("tool task for '{}' panicked: {}", call.name, e);
                    error_result(call, format!("Execution failed: {}", e))
                }
            })
            .collect()
    }
}

async fn run_one(
    call: ToolCall,
    capability: Option<Arc<dyn Capability>>,
    registered_names: &[String],
) -> ToolResult {
    let Some(capability) = capability else {
        log::warn!("tool call for unregistered function '{}'", call.name);
        return not_registered_result(&call, registered_names);
    };

    if !call.arguments.is_object() {
        // The adapter preserved a payload it could not decode into a map.
        return error_result(
            &call,
            format!("Invalid arguments for '{}': expected a JSON object", call.name),
        );
    }

    log::info!("executing tool call '{}' (id: {:?})", call.name, call.id);
    match capability.invoke(call.arguments.clone()).await {
        Ok(value) => ToolResult {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            content: serialize_result(value),
        },
        Err(e) => {
            log::error!("capability '{}' failed: {}", call.name, e);
            error_result(&call, format!("Execution failed: {}", e))
        }
    }
}

fn serialize_result(value: Value) -> String {
    serde_json::to_string(&value)
        .unwrap_or_else(|_| json!({"result": value.to_string()}).to_string())
}

fn error_result(call: &ToolCall, message: String) -> ToolResult {
    ToolResult {
        tool_call_id: call.id.clone(),
        name: call.name.clone(),
        content: json!({"error": message}).to_string(),
    }
}

fn not_registered_result(call: &ToolCall, registered_names: &[String]) -> ToolResult {
    let mut payload = json!({
        "error": format!("Function '{}' not registered.", call.name)
    });
    let suggestions = near_matches(&call.name, registered_names);
    if !suggestions.is_empty() {
        payload["suggestions"] = json!(suggestions);
    }
    ToolResult {
        tool_call_id: call.id.clone(),
        name: call.name.clone(),
        content: payload.to_string(),
    }
}

/// Usability aid for the model: registered names that contain, or are
/// contained in, the unknown name.
fn near_matches(name: &str, registered_names: &[String]) -> Vec<String> {
    let needle = name.to_lowercase();
    let mut matches: Vec<String> = registered_names
        .iter()
        .filter(|candidate| {
            let candidate = candidate.to_lowercase();
            candidate.contains(&needle) || needle.contains(&candidate)
        })
        .cloned()
        .collect();
    matches.sort();
    matches
}
