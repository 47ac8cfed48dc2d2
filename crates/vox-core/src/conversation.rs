//! Per-session conversation state with snapshot and budget management.
//!
//! The transcript is the single source of truth the orchestration loop works
//! against. Three invariants live here: the first message is always the
//! system prompt (repaired on entry if violated), a snapshot taken before a
//! provider call can always undo a half-applied round-trip, and transient
//! memory-context messages never survive past a terminal return.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

use crate::core_types::{Message, Role, ToolCall, ToolResult};

/// Marker prefix identifying the transient memory-context system message so
/// it can be stripped on every exit path.
const MEMORY_CONTEXT_PREFIX: &str = "Relevant context from memory:";

/// Per-message token overhead for role and framing, matching the estimate
/// the original deployment tuned its budget around.
const MESSAGE_OVERHEAD_TOKENS: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct HistoryBudget {
    pub max_tokens: usize,
    pub max_messages: usize,
}

impl Default for HistoryBudget {
    fn default() -> Self {
        Self {
            max_tokens: 1800,
            max_messages: 20,
        }
    }
}

fn encoder() -> Option<&'static CoreBPE> {
    static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();
    ENCODER
        .get_or_init(|| match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                log::warn!("failed to load cl100k tokenizer, estimating by length: {e}");
                None
            }
        })
        .as_ref()
}

/// Estimates the token count of a string, falling back to a bytes/4
/// heuristic when the tokenizer is unavailable.
pub fn estimate_tokens(text: &str) -> usize {
    match encoder() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => text.len() / 4,
    }
}

fn message_tokens(msg: &Message) -> usize {
    let content_tokens = msg.content.as_deref().map(estimate_tokens).unwrap_or(0);
    let call_tokens = msg
        .tool_calls
        .as_ref()
        .map(|calls| {
            calls
                .iter()
                .map(|c| estimate_tokens(&c.name) + estimate_tokens(&c.arguments.to_string()))
                .sum()
        })
        .unwrap_or(0);
    content_tokens + call_tokens + MESSAGE_OVERHEAD_TOKENS
}

/// Ordered transcript of one session. Owned by the caller and passed into
/// the orchestrator explicitly, so concurrent sessions never share state.
#[derive(Debug, Clone)]
pub struct ConversationState {
    messages: Vec<Message>,
    system_prompt: String,
}

impl ConversationState {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        Self {
            messages: vec![Message::system(system_prompt.clone())],
            system_prompt,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    pub fn push_assistant(&mut self, content: Option<String>, tool_calls: Option<Vec<ToolCall>>) {
        self.messages.push(Message::assistant(content, tool_calls));
    }

    pub fn push_tool_result(&mut self, result: &ToolResult) {
        self.messages.push(Message::tool_result(result));
    }

    /// Repairs the system-first invariant, returning true when a repair was
    /// needed. The existing messages are preserved; a missing system prompt
    /// is inserted in front rather than wiping pending user input.
    pub fn ensure_system_first(&mut self) -> bool {
        match self.messages.first() {
            Some(first) if first.role == Role::System => false,
            _ => {
                log::warn!("transcript missing leading system prompt, repairing");
                self.messages
                    .insert(0, Message::system(self.system_prompt.clone()));
                true
            }
        }
    }

    pub fn has_user_message(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::User)
    }

    /// Text of the most recent user turn, used as the memory-retrieval query.
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .and_then(|m| m.content.as_deref())
    }

    /// Shallow copy of the message list, taken before every provider call so
    /// a failed round-trip can be rolled back without corrupting history.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn restore(&mut self, snapshot: Vec<Message>) {
        self.messages = snapshot;
    }

    /// Inserts retrieved memory as a transient system message directly after
    /// the permanent system prompt. Stripped by [`clear_memory_context`].
    ///
    /// [`clear_memory_context`]: ConversationState::clear_memory_context
    pub fn insert_memory_context(&mut self, lines: &[String]) {
        if lines.is_empty() {
            return;
        }
        let content = format!("{}\n{}", MEMORY_CONTEXT_PREFIX, lines.join("\n"));
        let index = if self.messages.is_empty() { 0 } else { 1 };
        self.messages.insert(index, Message::system(content));
        log::debug!("inserted memory context ({} lines)", lines.len());
    }

    /// Removes every transient memory-context message. Called on all exit
    /// paths of the orchestration loop.
    pub fn clear_memory_context(&mut self) {
        self.messages.retain(|m| {
            !(m.role == Role::System
                && m.content
                    .as_deref()
                    .map(|c| c.starts_with(MEMORY_CONTEXT_PREFIX))
                    .unwrap_or(false))
        });
    }

    /// Trims the transcript to the token and message budgets, keeping the
    /// leading system prompt and preferring the most recent messages. Tool
    /// results orphaned at the cut point are dropped as well, since backends
    /// reject a tool message with no preceding tool-call request.
    pub fn enforce_budget(&mut self, budget: &HistoryBudget) {
        if self.messages.len() <= 1 {
            return;
        }

        let system = self.messages[0].clone();
        let mut kept_tokens = message_tokens(&system);
        let mut kept: Vec<Message> = Vec::new();

        for msg in self.messages[1..].iter().rev() {
            let tokens = message_tokens(msg);
            if kept.len() + 1 >= budget.max_messages || kept_tokens + tokens > budget.max_tokens {
                break;
            }
            kept.push(msg.clone());
            kept_tokens += tokens;
        }
        kept.reverse();

        while kept.first().map(|m| m.role == Role::Tool).unwrap_or(false) {
            kept.remove(0);
        }

        let removed = self.messages.len() - 1 - kept.len();
        if removed > 0 {
            log::debug!(
                "trimmed {} messages from history (~{} tokens kept)",
                removed,
                kept_tokens
            );
            let mut messages = vec![system];
            messages.extend(kept);
            self.messages = messages;
        }
    }

    /// Discards everything but a fresh system prompt.
    pub fn reset(&mut self) {
        self.messages = vec![Message::system(self.system_prompt.clone())];
    }
}
