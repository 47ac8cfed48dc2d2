//! Error types for failure handling across the orchestration core
//!
//! Failures are categorized by where they occur so the loop can apply the
//! right policy: configuration errors are fatal at startup, provider errors
//! are transient and retried with rollback, and capability errors are folded
//! into the transcript as tool-result payloads the model can react to.
//! Nothing below the orchestrator's public surface escapes as a panic or an
//! unhandled error; the caller always receives conversational text.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum AssistantError {
    #[error("provider request failed: {0}")]
    Provider(String),
    #[error("provider request timed out after {0} seconds")]
    Timeout(u64),
    #[error("could not connect to provider: {0}")]
    Connection(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("failed to parse provider response: {0}")]
    Parsing(String),
    #[error("capability '{name}' failed: {message}")]
    Capability { name: String, message: String },
    #[error("memory retrieval failed: {0}")]
    Memory(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for AssistantError {
    fn from(err: std::io::Error) -> Self {
        AssistantError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for AssistantError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            AssistantError::Connection(err.to_string())
        } else {
            AssistantError::Provider(err.to_string())
        }
    }
}
