//! Configuration management
//!
//! Values come from (lowest to highest precedence) built-in defaults, a TOML
//! file, and environment variables.

use crate::error::{DelveError, DelveResult, ErrorContext};
use crate::logging::LoggingConfig;
use crate::types::ReasoningEffort;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DelveConfig {
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub research: ResearchSettings,
    pub logging: LoggingConfig,
}

/// Azure OpenAI deployment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub api_version: String,
    /// Deployment used for question generation and distillation
    pub chat_model: String,
    /// Deployment used for report synthesis
    pub reasoning_model: String,
    pub temperature: f32,
    pub question_max_tokens: u32,
    pub distill_max_tokens: u32,
    pub report_max_completion_tokens: u32,
    pub reasoning_effort: ReasoningEffort,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_version: "2025-04-01-preview".to_string(),
            chat_model: "gpt-4.1".to_string(),
            reasoning_model: "o4-mini".to_string(),
            temperature: 0.0,
            question_max_tokens: 800,
            distill_max_tokens: 2000,
            report_max_completion_tokens: 15000,
            reasoning_effort: ReasoningEffort::Medium,
            timeout_seconds: 300,
        }
    }
}

/// Agent service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Project endpoint of the agent service
    pub project_endpoint: Option<String>,
    /// Bearer token for the agent service
    pub access_token: Option<String>,
    /// Agent used when a request does not name one
    pub default_agent_id: Option<String>,
    pub api_version: String,
    /// Delay between run status polls
    pub poll_interval_ms: u64,
    pub timeout_seconds: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            project_endpoint: None,
            access_token: None,
            default_agent_id: None,
            api_version: "v1".to_string(),
            poll_interval_ms: 1000,
            timeout_seconds: 300,
        }
    }
}

/// Recursion and prompt defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchSettings {
    pub breadth: usize,
    pub depth: usize,
    /// In-flight agent calls for the cooperative controller
    pub concurrency_limit: usize,
    /// Live branches for the streaming session
    pub streaming_concurrency_limit: usize,
    pub max_learnings: usize,
    pub max_follow_ups: usize,
    /// System prompt for the final report
    pub report_instructions: String,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            breadth: 3,
            depth: 4,
            concurrency_limit: 2,
            streaming_concurrency_limit: 5,
            max_learnings: 3,
            max_follow_ups: 3,
            report_instructions: "You are an expert research analyst. Write a thorough, \
                well-structured long-form report in Markdown answering the original research \
                question using only the provided learnings. Keep the source citations of the \
                learnings inline."
                .to_string(),
        }
    }
}

impl DelveConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> DelveResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DelveError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> DelveResult<Self> {
        toml::from_str(content).map_err(|e| DelveError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> DelveResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| DelveError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| DelveError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Overlay values from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary lookup; empty values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("AOAI_ENDPOINT") {
            self.llm.endpoint = Some(v);
        }
        if let Some(v) = get("AOAI_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = get("AOAI_API_VERSION") {
            self.llm.api_version = v;
        }
        if let Some(v) = get("AOAI_GPT_MODEL") {
            self.llm.chat_model = v;
        }
        if let Some(v) = get("AOAI_REASONING_MODEL") {
            self.llm.reasoning_model = v;
        }
        if let Some(v) = get("PROJECT_ENDPOINT") {
            self.agent.project_endpoint = Some(v);
        }
        if let Some(v) = get("PROJECT_TOKEN") {
            self.agent.access_token = Some(v);
        }
        if let Some(v) = get("AGENT_ID") {
            self.agent.default_agent_id = Some(v);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> DelveResult<()> {
        let research = &self.research;
        let checks = [
            (research.breadth == 0, "research.breadth", "Breadth must be at least 1"),
            (research.depth == 0, "research.depth", "Depth must be at least 1"),
            (
                research.concurrency_limit == 0,
                "research.concurrency_limit",
                "Concurrency limit must be at least 1",
            ),
            (
                research.streaming_concurrency_limit == 0,
                "research.streaming_concurrency_limit",
                "Streaming concurrency limit must be at least 1",
            ),
            (
                research.max_follow_ups == 0,
                "research.max_follow_ups",
                "At least one follow-up question must be allowed",
            ),
            (
                self.agent.poll_interval_ms == 0,
                "agent.poll_interval_ms",
                "Poll interval must be greater than 0",
            ),
        ];

        for (failed, field, message) in checks {
            if failed {
                return Err(DelveError::Config {
                    message: message.to_string(),
                    source: None,
                    context: ErrorContext::new("config")
                        .with_operation("validate")
                        .with_metadata("field", field)
                        .with_suggestion(&format!("Set {} to a positive value", field)),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides_skip_empty_values() {
        let env: HashMap<&str, &str> = [
            ("AOAI_ENDPOINT", "https://example.openai.azure.com"),
            ("AOAI_GPT_MODEL", "gpt-4.1-mini"),
            ("AGENT_ID", "   "),
        ]
        .into_iter()
        .collect();

        let mut config = DelveConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(
            config.llm.endpoint.as_deref(),
            Some("https://example.openai.azure.com")
        );
        assert_eq!(config.llm.chat_model, "gpt-4.1-mini");
        assert_eq!(config.llm.reasoning_model, "o4-mini");
        assert!(config.agent.default_agent_id.is_none());
    }

    #[test]
    fn test_validate_rejects_zero_breadth() {
        let mut config = DelveConfig::default();
        config.research.breadth = 0;

        match config.validate() {
            Err(DelveError::Config { context, .. }) => {
                assert_eq!(context.metadata.get("field").unwrap(), "research.breadth");
            }
            other => panic!("Expected config error, got {:?}", other),
        }
    }
}
