//! Capability system: the functions the model is allowed to invoke.
//!
//! Capabilities are registered explicitly at startup through plain
//! registration functions rather than discovered by scanning directories.
//! The registry is shared process-wide behind a read-write lock and may grow
//! at runtime, so the orchestration loop re-reads it on every round-trip
//! instead of caching schemas at loop start.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::AssistantError;
use crate::llm::ToolSchema;

pub mod math;

/// A named function exposed to the model, with an argument schema advertised
/// for tool selection. Implementations must be safe to call concurrently.
#[async_trait]
pub trait Capability: Send + Sync {
    fn schema(&self) -> ToolSchema;

    /// Invokes the capability with a JSON object of named arguments. The
    /// returned value is serialized into the tool-result payload.
    async fn invoke(&self, arguments: Value) -> Result<Value, AssistantError>;
}

/// Adapter that runs a synchronous function on the blocking pool.
///
/// Capabilities wrapping blocking I/O (shell commands, sync HTTP clients)
/// must not run on the event loop driving the orchestrator; routing them
/// through `spawn_blocking` is a correctness requirement, not a preference.
pub struct BlockingCapability<F> {
    schema: ToolSchema,
    func: Arc<F>,
}

impl<F> BlockingCapability<F>
where
    F: Fn(Value) -> Result<Value, AssistantError> + Send + Sync + 'static,
{
    pub fn new(schema: ToolSchema, func: F) -> Self {
        Self {
            schema,
            func: Arc::new(func),
        }
    }
}

#[async_trait]
impl<F> Capability for BlockingCapability<F>
where
    F: Fn(Value) -> Result<Value, AssistantError> + Send + Sync + 'static,
{
    fn schema(&self) -> ToolSchema {
        self.schema.clone()
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, AssistantError> {
        let func = Arc::clone(&self.func);
        tokio::task::spawn_blocking(move || func(arguments))
            .await
            .map_err(|e| AssistantError::Capability {
                name: self.schema.name.clone(),
                message: format!("blocking task failed: {}", e),
            })?
    }
}

/// Process-wide mapping from capability name to implementation, plus the
/// parallel schema list advertised to the model.
pub struct CapabilityRegistry {
    entries: HashMap<String, Arc<dyn Capability>>,
}

/// Shared handle to the live registry. Reads are frequent (every round-trip
/// and every dispatch); writes happen only at registration time.
pub type SharedRegistry = Arc<RwLock<CapabilityRegistry>>;

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        let name = capability.schema().name;
        if self.entries.insert(name.clone(), capability).is_some() {
            log::warn!("capability '{}' re-registered, replacing", name);
        } else {
            log::debug!("registered capability '{}'", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.entries.values().map(|c| c.schema()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
