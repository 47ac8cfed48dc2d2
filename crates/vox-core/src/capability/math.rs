//! Built-in arithmetic capabilities.
//!
//! Small synchronous capabilities that double as the reference for how a
//! capability module registers itself: expose a `register` function taking
//! the registry, call it once at startup.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::capability::{BlockingCapability, Capability, CapabilityRegistry};
use crate::errors::AssistantError;
use crate::llm::ToolSchema;

fn number_arg(arguments: &Value, key: &str, name: &str) -> Result<f64, AssistantError> {
    arguments
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| AssistantError::Capability {
            name: name.to_string(),
            message: format!("missing or non-numeric argument '{}'", key),
        })
}

fn pair_schema(name: &str, description: &str) -> ToolSchema {
    ToolSchema {
        name: name.to_string(),
        description: description.to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "a": {"type": "number", "description": "The first number"},
                "b": {"type": "number", "description": "The second number"}
            },
            "required": ["a", "b"]
        }),
    }
}

pub fn multiply() -> Arc<dyn Capability> {
    Arc::new(BlockingCapability::new(
        pair_schema("multiply_numbers", "Multiplies two numbers"),
        |arguments| {
            let a = number_arg(&arguments, "a", "multiply_numbers")?;
            let b = number_arg(&arguments, "b", "multiply_numbers")?;
            Ok(json!({"result": a * b}))
        },
    ))
}

pub fn divide() -> Arc<dyn Capability> {
    Arc::new(BlockingCapability::new(
        pair_schema("divide_numbers", "Divides the first number by the second"),
        |arguments| {
            let a = number_arg(&arguments, "a", "divide_numbers")?;
            let b = number_arg(&arguments, "b", "divide_numbers")?;
            if b == 0.0 {
                return Err(AssistantError::Capability {
                    name: "divide_numbers".to_string(),
                    message: "division by zero".to_string(),
                });
            }
            Ok(json!({"result": a / b}))
        },
    ))
}

/// Registers the arithmetic capabilities. Called once at startup from the
/// static registration list.
pub fn register(registry: &mut CapabilityRegistry) {
    registry.register(multiply());
    registry.register(divide());
}
