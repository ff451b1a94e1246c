//! Unified error handling system
//!
//! Structured error types with context, recovery suggestions, and proper error chaining.
//! Nothing in the pipeline retries: every variant fails the call (or branch) it came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type DelveResult<T> = Result<T, DelveError>;

/// Error context providing additional information for debugging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: std::collections::HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: std::collections::HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Main error type for the research pipeline
#[derive(Error, Debug)]
pub enum DelveError {
    /// Structured model output did not match the declared schema
    #[error("Schema validation error ({schema}): {message}")]
    SchemaValidation {
        schema: String,
        message: String,
        #[source]
        source: Option<serde_json::Error>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    /// A chat, reasoning or agent service call failed
    #[error("External service error ({service}): {message}")]
    ExternalService {
        service: String,
        message: String,
        status: Option<u16>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    /// An agent run ended in a status other than `completed`
    #[error("Agent run {run_id} did not complete (status: {status})")]
    RunIncomplete {
        run_id: String,
        status: String,
        last_error: Option<String>,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

impl DelveError {
    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            DelveError::SchemaValidation { context, .. } => Some(context),
            DelveError::Config { context, .. } => Some(context),
            DelveError::ExternalService { context, .. } => Some(context),
            DelveError::RunIncomplete { context, .. } => Some(context),
            DelveError::Internal { context, .. } => Some(context),
            DelveError::Io(_) | DelveError::Serialization(_) => None,
        }
    }

    /// Short machine-friendly name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            DelveError::SchemaValidation { .. } => "schema_validation",
            DelveError::Config { .. } => "config",
            DelveError::ExternalService { .. } => "external_service",
            DelveError::RunIncomplete { .. } => "run_incomplete",
            DelveError::Io(_) => "io",
            DelveError::Serialization(_) => "serialization",
            DelveError::Internal { .. } => "internal",
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        let error_id = self.context().map(|c| c.error_id.as_str());
        match self {
            DelveError::Internal { .. } => {
                error!(error_id = ?error_id, error = %self, "Internal error occurred");
            }
            DelveError::Config { .. } => {
                error!(error_id = ?error_id, error = %self, "Configuration error");
            }
            DelveError::SchemaValidation { .. } | DelveError::RunIncomplete { .. } => {
                warn!(error_id = ?error_id, error = %self, "Research branch aborted");
            }
            DelveError::ExternalService { status, .. } => {
                warn!(
                    error_id = ?error_id,
                    status = ?status,
                    error = %self,
                    "External service call failed"
                );
            }
            _ => {
                error!(error_id = ?error_id, error = %self, "Error occurred");
            }
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::DelveError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file")
                .with_suggestion("Check the AOAI_* / PROJECT_* / AGENT_ID environment variables"),
        }
    };
}

#[macro_export]
macro_rules! schema_error {
    ($schema:expr, $source:expr, $component:expr) => {
        $crate::DelveError::SchemaValidation {
            schema: $schema.to_string(),
            message: format!("{}", $source),
            source: Some($source),
            context: $crate::ErrorContext::new($component)
                .with_operation("parse_structured_output"),
        }
    };
}

#[macro_export]
macro_rules! external_service_error {
    ($service:expr, $msg:expr, $component:expr) => {
        $crate::DelveError::ExternalService {
            service: $service.to_string(),
            message: $msg.to_string(),
            status: None,
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($service:expr, $msg:expr, $component:expr, $source:expr) => {
        $crate::DelveError::ExternalService {
            service: $service.to_string(),
            message: $msg.to_string(),
            status: None,
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component),
        }
    };
}
