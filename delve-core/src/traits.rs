//! Contracts of the external services the research pipeline consumes

use crate::error::DelveResult;
use crate::types::*;
use async_trait::async_trait;

/// Chat-completion service
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Return the text of the first completion choice
    async fn complete(&self, request: ChatRequest) -> DelveResult<String>;
}

/// Reasoning-oriented completion service
#[async_trait]
pub trait ReasoningCompletion: Send + Sync {
    /// Return the text of the first completion choice
    async fn reason(
        &self,
        messages: Vec<ChatMessage>,
        effort: ReasoningEffort,
    ) -> DelveResult<String>;
}

/// Agent-run service: threads, messages and runs
#[async_trait]
pub trait AgentRuns: Send + Sync {
    /// Create a conversation thread and return its id
    async fn create_thread(&self) -> DelveResult<String>;

    /// Post a user message to a thread
    async fn post_message(&self, thread_id: &str, content: &str) -> DelveResult<()>;

    /// Start a run of `agent_id` on the thread and wait until it reaches a terminal status
    async fn run_to_completion(&self, thread_id: &str, agent_id: &str) -> DelveResult<AgentRun>;

    /// Fetch the last message the agent posted to the thread
    async fn last_response(&self, thread_id: &str) -> DelveResult<AgentResponse>;
}
