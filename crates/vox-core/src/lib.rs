//! Orchestration core for the Vox personal assistant.
//!
//! This crate drives a single user utterance to a final natural-language
//! answer through zero or more tool round-trips against a language model
//! backend. The surrounding system (speech capture, text-to-speech, the
//! capability loader, the web front-end) lives elsewhere; this crate owns
//! only the conversation state, the provider adapters, the tool dispatcher,
//! and the retry-bounded loop that ties them together.
//!
//! # Architecture Overview
//!
//! - **Conversation state**: an ordered transcript per session with
//!   snapshot/rollback, transient memory context, and a history budget
//! - **Provider adapters**: one `ChatProvider` implementation per backend
//!   (OpenAI, Ollama) normalizing responses into a common shape
//! - **Capability registry**: a live, shared mapping from tool name to
//!   callable, populated through explicit registration functions
//! - **Tool dispatcher**: fan-out execution with per-call error isolation
//! - **Orchestrator**: the bounded retry loop that folds tool results back
//!   into the transcript until the model produces a final answer

pub mod capability;
pub mod config;
pub mod conversation;
pub mod core_types;
pub mod dispatcher;
pub mod errors;
pub mod llm;
pub mod memory;
pub mod orchestrator;

pub use capability::{Capability, CapabilityRegistry, SharedRegistry};
pub use config::{ProviderSettings, VoxConfig};
pub use conversation::{ConversationState, HistoryBudget};
pub use core_types::{Message, ProviderResponse, Role, ToolCall, ToolResult};
pub use dispatcher::ToolDispatcher;
pub use errors::AssistantError;
pub use llm::{create_provider, ChatProvider, ToolSchema};
pub use memory::{MemoryRecall, NullRecall};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
