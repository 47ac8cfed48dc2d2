//! Seam to the long-term memory collaborator.
//!
//! The orchestration loop queries memory with the latest user utterance and
//! folds any results into the transcript as transient context. Retrieval is
//! a pure query from the loop's point of view; failures are downgraded to
//! "no memory found" rather than propagated.

use async_trait::async_trait;

use crate::errors::AssistantError;

#[async_trait]
pub trait MemoryRecall: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<String>, AssistantError>;
}

/// No-op recall for deployments without a memory store.
pub struct NullRecall;

#[async_trait]
impl MemoryRecall for NullRecall {
    async fn retrieve(&self, _query: &str) -> Result<Vec<String>, AssistantError> {
        Ok(Vec::new())
    }
}
