//! Core data type definitions shared by the service contracts

use serde::{Deserialize, Serialize};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Named JSON schema the completion must conform to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSchema {
    /// Schema name, also used to label validation failures
    pub name: String,
    /// The JSON schema document
    pub schema: serde_json::Value,
    /// Whether the service must follow the schema exactly
    pub strict: bool,
}

/// A single chat-completion request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// When set, the reply is constrained to this schema
    pub response_schema: Option<ResponseSchema>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
            response_schema: None,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn schema(mut self, schema: ResponseSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }

    /// Name of the requested schema, if any
    pub fn schema_name(&self) -> Option<&str> {
        self.response_schema.as_ref().map(|s| s.name.as_str())
    }
}

/// Effort setting for reasoning-model calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    #[default]
    Medium,
    High,
}

impl std::fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReasoningEffort::Low => write!(f, "low"),
            ReasoningEffort::Medium => write!(f, "medium"),
            ReasoningEffort::High => write!(f, "high"),
        }
    }
}

/// Status of an agent run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Expired,
    Incomplete,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Whether the run can no longer change status
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Expired => "expired",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Final state of an agent run
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRun {
    pub id: String,
    pub status: RunStatus,
    /// Error message reported by the service for failed runs
    pub last_error: Option<String>,
}

/// A URL citation attached to an agent response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlCitation {
    /// Inline anchor text inside the response, e.g. `【3:0†source】`
    pub text: String,
    pub title: String,
    pub url: String,
}

/// The last message an agent posted to a thread
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentResponse {
    /// Text content parts, in order
    pub text_parts: Vec<String>,
    pub citations: Vec<UrlCitation>,
}
