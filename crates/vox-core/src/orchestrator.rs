//! The retry-bounded orchestration loop.
//!
//! Drives a single user request to a final textual answer through zero or
//! more tool round-trips. Every failure path inside the loop resolves to
//! either a transcript mutation the model can see and react to, or a final
//! user-facing string; nothing propagates to the caller as an error, since
//! the caller is ultimately a human expecting conversational text.

use std::sync::Arc;
use std::time::Duration;

use crate::capability::SharedRegistry;
use crate::config::VoxConfig;
use crate::conversation::{ConversationState, HistoryBudget};
use crate::core_types::Message;
use crate::dispatcher::ToolDispatcher;
use crate::errors::AssistantError;
use crate::llm::ChatProvider;
use crate::memory::{MemoryRecall, NullRecall};

/// Returned when the transcript holds no user message to respond to.
pub const NO_USER_INPUT_REPLY: &str = "I need user input before I can respond.";

/// Returned when the retry budget is exhausted without a final answer.
pub const RETRY_EXHAUSTED_REPLY: &str =
    "I'm sorry, I could not produce a valid response after multiple attempts.";

/// Returned when the retry budget is exhausted and the last attempt timed out.
pub const TIMEOUT_REPLY: &str =
    "I'm sorry, the language model did not respond in time. Please try again.";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum provider round-trips per user request.
    pub max_retries: usize,
    /// Hard bound on each provider network call.
    pub request_timeout: Duration,
    /// Pause between attempts after a provider failure.
    pub retry_pause: Duration,
    pub history: HistoryBudget,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            request_timeout: Duration::from_secs(60),
            retry_pause: Duration::from_millis(500),
            history: HistoryBudget::default(),
        }
    }
}

impl From<&VoxConfig> for OrchestratorConfig {
    fn from(config: &VoxConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            request_timeout: config.request_timeout,
            history: config.history,
            ..Self::default()
        }
    }
}

pub struct Orchestrator {
    provider: Arc<dyn ChatProvider>,
    registry: SharedRegistry,
    memory: Arc<dyn MemoryRecall>,
    dispatcher: ToolDispatcher,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        registry: SharedRegistry,
        config: OrchestratorConfig,
    ) -> Self {
        let dispatcher = ToolDispatcher::new(registry.clone());
        Self {
            provider,
            registry,
            memory: Arc::new(NullRecall),
            dispatcher,
            config,
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryRecall>) -> Self {
        self.memory = memory;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Appends the user's utterance and runs the loop to a final answer.
    /// This is the single operation the front-end calls per request.
    pub async fn process_request(
        &self,
        conversation: &mut ConversationState,
        user_text: &str,
    ) -> String {
        conversation.push_user(user_text);
        self.run(conversation).await
    }

    /// Runs the orchestration loop over the current transcript.
    ///
    /// Transient memory context is stripped on every exit path, so the next
    /// request never replays a broken loop.
    pub async fn run(&self, conversation: &mut ConversationState) -> String {
        conversation.ensure_system_first();

        if !conversation.has_user_message() {
            log::error!("no user message in transcript");
            return NO_USER_INPUT_REPLY.to_string();
        }

        self.augment_with_memory(conversation).await;
        conversation.enforce_budget(&self.config.history);

        let mut last_error: Option<AssistantError> = None;

        for attempt in 1..=self.config.max_retries {
            // Capabilities may be registered between turns, so schemas are
            // re-read from the live registry on every round-trip.
            let schemas = {
                let registry = match self.registry.read() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                registry.schemas()
            };

            let snapshot = conversation.snapshot();
            log::debug!(
                "calling provider '{}', attempt {}/{} ({} tools)",
                self.provider.name(),
                attempt,
                self.config.max_retries,
                schemas.len()
            );

            let response = match self
                .provider
                .send(conversation.messages(), &schemas, self.config.request_timeout)
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    log::error!("provider call failed on attempt {}: {}", attempt, e);
                    conversation.restore(snapshot);
                    last_error = Some(e);
                    if attempt < self.config.max_retries {
                        tokio::time::sleep(self.config.retry_pause).await;
                    }
                    continue;
                }
            };

            if response.is_empty() {
                log::warn!(
                    "provider returned neither content nor tool calls on attempt {}",
                    attempt
                );
                conversation.restore(snapshot);
                continue;
            }

            // Append the assistant turn exactly once per round-trip.
            conversation.push(Message::assistant(
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            if let Some(calls) = response.tool_calls.filter(|c| !c.is_empty()) {
                log::info!("assistant requested {} tool call(s)", calls.len());
                let results = self.dispatcher.dispatch(&calls).await;
                for result in &results {
                    conversation.push_tool_result(result);
                }
                continue;
            }

            // Terminal condition: final text with no tool calls.
            if let Some(text) = response.content {
                conversation.clear_memory_context();
                return text;
            }
        }

        log::error!(
            "no final response after {} attempts",
            self.config.max_retries
        );
        conversation.clear_memory_context();
        match last_error {
            Some(AssistantError::Timeout(_)) => TIMEOUT_REPLY.to_string(),
            _ => RETRY_EXHAUSTED_REPLY.to_string(),
        }
    }

    async fn augment_with_memory(&self, conversation: &mut ConversationState) {
        let Some(query) = conversation.last_user_text().map(str::to_owned) else {
            return;
        };
        match self.memory.retrieve(&query).await {
            Ok(lines) if !lines.is_empty() => {
                log::debug!("retrieved {} memory line(s)", lines.len());
                conversation.insert_memory_context(&lines);
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("memory retrieval failed, continuing without context: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{BlockingCapability, CapabilityRegistry};
    use crate::core_types::{ProviderResponse, Role, ToolCall};
    use crate::llm::ToolSchema;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// Provider that replays a fixed script of outcomes, one per call.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<ProviderResponse, AssistantError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<ProviderResponse, AssistantError>>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send(
            &self,
            _messages: &[Message],
            _tools: &[ToolSchema],
            _timeout: Duration,
        ) -> Result<ProviderResponse, AssistantError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(ProviderResponse::default()))
        }
    }

    struct FixedRecall(Vec<String>);

    #[async_trait]
    impl MemoryRecall for FixedRecall {
        async fn retrieve(&self, _query: &str) -> Result<Vec<String>, AssistantError> {
            Ok(self.0.clone())
        }
    }

    struct FailingRecall;

    #[async_trait]
    impl MemoryRecall for FailingRecall {
        async fn retrieve(&self, _query: &str) -> Result<Vec<String>, AssistantError> {
            Err(AssistantError::Memory("store offline".to_string()))
        }
    }

    fn weather_registry() -> SharedRegistry {
        let mut registry = CapabilityRegistry::new();
        registry.register(Arc::new(BlockingCapability::new(
            ToolSchema {
                name: "get_weather".to_string(),
                description: "Look up current weather".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {"city": {"type": "string"}},
                    "required": ["city"]
                }),
            },
            |args| {
                let city = args["city"].as_str().unwrap_or("unknown").to_string();
                Ok(json!({"city": city, "temp_f": 72, "conditions": "sunny"}))
            },
        )));
        registry.into_shared()
    }

    fn text_response(text: &str) -> Result<ProviderResponse, AssistantError> {
        Ok(ProviderResponse {
            content: Some(text.to_string()),
            tool_calls: None,
        })
    }

    fn tool_response(calls: Vec<ToolCall>) -> Result<ProviderResponse, AssistantError> {
        Ok(ProviderResponse {
            content: None,
            tool_calls: Some(calls),
        })
    }

    fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            retry_pause: Duration::from_millis(1),
            ..OrchestratorConfig::default()
        }
    }

    fn orchestrator(provider: Arc<ScriptedProvider>, registry: SharedRegistry) -> Orchestrator {
        Orchestrator::new(provider, registry, fast_config())
    }

    #[tokio::test]
    async fn test_tool_round_trip_to_final_answer() {
        init_logging();
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![ToolCall {
                id: Some("call_1".to_string()),
                name: "get_weather".to_string(),
                arguments: json!({"city": "Boston"}),
            }]),
            text_response("It's 72F and sunny in Boston."),
        ]));
        let orchestrator = orchestrator(provider.clone(), weather_registry());
        let mut conversation = ConversationState::new("You are Vox.");

        let answer = orchestrator
            .process_request(&mut conversation, "what's the weather in Boston")
            .await;

        assert_eq!(answer, "It's 72F and sunny in Boston.");
        assert_eq!(provider.call_count(), 2);

        let roles: Vec<Role> = conversation.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::System,
                Role::User,
                Role::Assistant,
                Role::Tool,
                Role::Assistant
            ]
        );
        let tool_msg = &conversation.messages()[3];
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool_msg.content.as_deref().unwrap().contains("sunny"));
    }

    #[tokio::test]
    async fn test_provider_failure_rolls_back_then_succeeds() {
        init_logging();
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(AssistantError::Timeout(60)),
            text_response("Hello!"),
        ]));
        let orchestrator = orchestrator(provider.clone(), weather_registry());
        let mut conversation = ConversationState::new("You are Vox.");

        let answer = orchestrator.process_request(&mut conversation, "hello").await;

        assert_eq!(answer, "Hello!");
        assert_eq!(provider.call_count(), 2);
        // No duplicate or stray turns from the failed attempt.
        let user_turns = conversation
            .messages()
            .iter()
            .filter(|m| m.role == Role::User)
            .count();
        assert_eq!(user_turns, 1);
        assert_eq!(conversation.len(), 3);
    }

    #[tokio::test]
    async fn test_unregistered_tool_reported_and_loop_continues() {
        init_logging();
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![ToolCall {
                id: Some("call_1".to_string()),
                name: "delete_everything".to_string(),
                arguments: json!({}),
            }]),
            text_response("Sorry, I can't do that."),
        ]));
        let orchestrator = orchestrator(provider.clone(), weather_registry());
        let mut conversation = ConversationState::new("You are Vox.");

        let answer = orchestrator
            .process_request(&mut conversation, "wipe the disk")
            .await;

        assert_eq!(answer, "Sorry, I can't do that.");
        let tool_msg = conversation
            .messages()
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        let payload: serde_json::Value =
            serde_json::from_str(tool_msg.content.as_deref().unwrap()).unwrap();
        assert_eq!(
            payload["error"],
            "Function 'delete_everything' not registered."
        );
    }

    #[tokio::test]
    async fn test_empty_responses_exhaust_retry_budget() {
        init_logging();
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let orchestrator = orchestrator(provider.clone(), weather_registry());
        let mut conversation = ConversationState::new("You are Vox.");

        let answer = orchestrator.process_request(&mut conversation, "hello").await;

        assert_eq!(answer, RETRY_EXHAUSTED_REPLY);
        assert_eq!(provider.call_count(), 5);
        // Empty rounds were rolled back: only system and user remain.
        assert_eq!(conversation.len(), 2);
    }

    #[tokio::test]
    async fn test_always_tool_calls_terminates_at_budget() {
        init_logging();
        let make_call = || {
            tool_response(vec![ToolCall {
                id: None,
                name: "get_weather".to_string(),
                arguments: json!({"city": "Boston"}),
            }])
        };
        let provider = Arc::new(ScriptedProvider::new(vec![
            make_call(),
            make_call(),
            make_call(),
            make_call(),
            make_call(),
        ]));
        let orchestrator = orchestrator(provider.clone(), weather_registry());
        let mut conversation = ConversationState::new("You are Vox.");

        let answer = orchestrator.process_request(&mut conversation, "weather").await;

        assert_eq!(answer, RETRY_EXHAUSTED_REPLY);
        assert_eq!(provider.call_count(), 5);
    }

    #[tokio::test]
    async fn test_timeout_exhaustion_returns_timeout_reply() {
        init_logging();
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(AssistantError::Timeout(60)),
            Err(AssistantError::Timeout(60)),
            Err(AssistantError::Timeout(60)),
            Err(AssistantError::Timeout(60)),
            Err(AssistantError::Timeout(60)),
        ]));
        let orchestrator = orchestrator(provider.clone(), weather_registry());
        let mut conversation = ConversationState::new("You are Vox.");

        let answer = orchestrator.process_request(&mut conversation, "hello").await;
        assert_eq!(answer, TIMEOUT_REPLY);
        assert_eq!(conversation.len(), 2);
    }

    #[tokio::test]
    async fn test_no_user_input_short_circuits() {
        init_logging();
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("unused")]));
        let orchestrator = orchestrator(provider.clone(), weather_registry());
        let mut conversation = ConversationState::new("You are Vox.");

        let answer = orchestrator.run(&mut conversation).await;
        assert_eq!(answer, NO_USER_INPUT_REPLY);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_memory_context_inserted_and_cleaned_on_success() {
        init_logging();
        let provider = Arc::new(ScriptedProvider::new(vec![text_response(
            "Your dog is named Rex.",
        )]));
        let orchestrator = orchestrator(provider.clone(), weather_registry())
            .with_memory(Arc::new(FixedRecall(vec![
                "User's dog is named Rex".to_string()
            ])));
        let mut conversation = ConversationState::new("You are Vox.");

        let answer = orchestrator
            .process_request(&mut conversation, "what's my dog's name?")
            .await;

        assert_eq!(answer, "Your dog is named Rex.");
        // No transient context survives a terminal return.
        assert!(conversation
            .messages()
            .iter()
            .all(|m| !m
                .content
                .as_deref()
                .unwrap_or_default()
                .contains("Relevant context from memory")));
    }

    #[tokio::test]
    async fn test_memory_context_cleaned_on_failure_path() {
        init_logging();
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let orchestrator = orchestrator(provider, weather_registry()).with_memory(Arc::new(
            FixedRecall(vec!["User's dog is named Rex".to_string()]),
        ));
        let mut conversation = ConversationState::new("You are Vox.");

        let answer = orchestrator
            .process_request(&mut conversation, "what's my dog's name?")
            .await;

        assert_eq!(answer, RETRY_EXHAUSTED_REPLY);
        assert!(conversation
            .messages()
            .iter()
            .all(|m| m.role != Role::System
                || !m.content.as_deref().unwrap_or_default().contains("Rex")));
    }

    #[tokio::test]
    async fn test_memory_failure_treated_as_no_memory() {
        init_logging();
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("Hi!")]));
        let orchestrator =
            orchestrator(provider, weather_registry()).with_memory(Arc::new(FailingRecall));
        let mut conversation = ConversationState::new("You are Vox.");

        let answer = orchestrator.process_request(&mut conversation, "hello").await;
        assert_eq!(answer, "Hi!");
        assert_eq!(conversation.len(), 3);
    }

    #[tokio::test]
    async fn test_system_first_invariant_repaired_on_entry() {
        init_logging();
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("Hello!")]));
        let orchestrator = orchestrator(provider, weather_registry());
        let mut conversation = ConversationState::new("You are Vox.");
        // Simulate a corrupted transcript with the system prompt missing.
        conversation.restore(vec![Message::user("hello")]);

        let answer = orchestrator.run(&mut conversation).await;
        assert_eq!(answer, "Hello!");
        assert_eq!(conversation.messages()[0].role, Role::System);
    }

    #[tokio::test]
    async fn test_capabilities_registered_mid_session_are_visible() {
        init_logging();
        let registry = CapabilityRegistry::new().into_shared();
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![ToolCall {
                id: None,
                name: "late_tool".to_string(),
                arguments: json!({}),
            }]),
            text_response("Done."),
        ]));
        let orchestrator = orchestrator(provider, registry.clone());

        {
            let mut guard = registry.write().unwrap();
            guard.register(Arc::new(BlockingCapability::new(
                ToolSchema {
                    name: "late_tool".to_string(),
                    description: "registered after startup".to_string(),
                    parameters: json!({"type": "object"}),
                },
                |_| Ok(json!({"ok": true})),
            )));
        }

        let mut conversation = ConversationState::new("You are Vox.");
        let answer = orchestrator.process_request(&mut conversation, "go").await;
        assert_eq!(answer, "Done.");

        let tool_msg = conversation
            .messages()
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert_eq!(tool_msg.content.as_deref(), Some("{\"ok\":true}"));
    }

    #[tokio::test]
    async fn test_batch_isolation_one_result_per_call() {
        init_logging();
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![
                ToolCall {
                    id: Some("call_1".to_string()),
                    name: "get_weather".to_string(),
                    arguments: json!({"city": "Boston"}),
                },
                ToolCall {
                    id: Some("call_2".to_string()),
                    name: "not_a_tool".to_string(),
                    arguments: json!({}),
                },
                ToolCall {
                    id: Some("call_3".to_string()),
                    name: "get_weather".to_string(),
                    arguments: json!({"city": "Paris"}),
                },
            ]),
            text_response("Mixed results."),
        ]));
        let orchestrator = orchestrator(provider, weather_registry());
        let mut conversation = ConversationState::new("You are Vox.");

        let answer = orchestrator.process_request(&mut conversation, "go").await;
        assert_eq!(answer, "Mixed results.");

        let tool_msgs: Vec<&Message> = conversation
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        assert_eq!(tool_msgs.len(), 3);
        assert_eq!(tool_msgs[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool_msgs[1].tool_call_id.as_deref(), Some("call_2"));
        assert_eq!(tool_msgs[2].tool_call_id.as_deref(), Some("call_3"));
        assert!(tool_msgs[1].content.as_deref().unwrap().contains("error"));
        assert!(tool_msgs[2].content.as_deref().unwrap().contains("Paris"));
    }
}
