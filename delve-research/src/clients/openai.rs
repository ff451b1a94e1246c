//! Azure OpenAI chat-completion client
//!
//! Serves both the chat deployment (question generation, distillation) and the
//! reasoning deployment (report synthesis) of one Azure OpenAI resource.

use super::{create_http_client, join_url, read_json, request_error, HttpClientConfig};
use delve_core::logging::performance::measure_async;
use delve_core::{
    async_trait, config_error, external_service_error, ChatCompletion, ChatMessage, ChatRequest,
    DelveError, DelveResult, ErrorContext, LlmConfig, ReasoningCompletion, ReasoningEffort,
    ResponseSchema,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const SERVICE: &str = "azure_openai";

/// Azure OpenAI client for chat and reasoning deployments
pub struct AzureOpenAiClient {
    client: reqwest::Client,
    endpoint: String,
    api_version: String,
    chat_model: String,
    reasoning_model: String,
    report_max_completion_tokens: u32,
}

/// Request body of `/chat/completions`
#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<ReasoningEffort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseFormat<'a> {
    JsonSchema { json_schema: &'a ResponseSchema },
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
    refusal: Option<String>,
}

impl AzureOpenAiClient {
    /// Create a client from the LLM section of the configuration
    pub fn new(config: &LlmConfig) -> DelveResult<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| {
                config_error!("Azure OpenAI endpoint is not configured", "openai_client")
            })?;
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| {
                config_error!("Azure OpenAI API key is not configured", "openai_client")
            })?;

        let http_config = HttpClientConfig::default()
            .with_timeout(config.timeout_seconds)
            .with_header("api-key", api_key);
        let client = create_http_client(&http_config)?;

        info!(
            "Created Azure OpenAI client for {} (chat: {}, reasoning: {})",
            endpoint, config.chat_model, config.reasoning_model
        );

        Ok(Self {
            client,
            endpoint,
            api_version: config.api_version.clone(),
            chat_model: config.chat_model.clone(),
            reasoning_model: config.reasoning_model.clone(),
            report_max_completion_tokens: config.report_max_completion_tokens,
        })
    }

    fn completions_url(&self, deployment: &str) -> String {
        join_url(
            &self.endpoint,
            &format!(
                "openai/deployments/{}/chat/completions?api-version={}",
                deployment, self.api_version
            ),
        )
    }

    async fn post_completion(
        &self,
        deployment: &str,
        body: &CompletionBody<'_>,
        operation: &str,
    ) -> DelveResult<String> {
        debug!(
            deployment = deployment,
            messages = body.messages.len(),
            "Requesting chat completion"
        );

        let response = self
            .client
            .post(self.completions_url(deployment))
            .json(body)
            .send()
            .await
            .map_err(|e| request_error(SERVICE, operation, e))?;

        let completion: CompletionResponse = read_json(response, SERVICE, operation).await?;
        first_choice_text(completion, operation)
    }
}

fn first_choice_text(completion: CompletionResponse, operation: &str) -> DelveResult<String> {
    let message = completion
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| {
            external_service_error!(SERVICE, "Completion returned no choices", SERVICE)
        })?;

    match (message.content, message.refusal) {
        (Some(content), _) => Ok(content),
        (None, refusal) => Err(DelveError::ExternalService {
            service: SERVICE.to_string(),
            message: match refusal {
                Some(reason) => format!("Model refused the request: {}", reason),
                None => "Completion has no text content".to_string(),
            },
            status: None,
            source: None,
            context: ErrorContext::new(SERVICE).with_operation(operation),
        }),
    }
}

#[async_trait]
impl ChatCompletion for AzureOpenAiClient {
    async fn complete(&self, request: ChatRequest) -> DelveResult<String> {
        let body = CompletionBody {
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            max_completion_tokens: None,
            reasoning_effort: None,
            response_format: request
                .response_schema
                .as_ref()
                .map(|json_schema| ResponseFormat::JsonSchema { json_schema }),
        };

        measure_async(
            "chat_completion",
            self.post_completion(&self.chat_model, &body, "chat_completion"),
        )
        .await
    }
}

#[async_trait]
impl ReasoningCompletion for AzureOpenAiClient {
    async fn reason(
        &self,
        messages: Vec<ChatMessage>,
        effort: ReasoningEffort,
    ) -> DelveResult<String> {
        let body = CompletionBody {
            messages: &messages,
            temperature: None,
            max_tokens: None,
            max_completion_tokens: Some(self.report_max_completion_tokens),
            reasoning_effort: Some(effort),
            response_format: None,
        };

        measure_async(
            "reasoning_completion",
            self.post_completion(&self.reasoning_model, &body, "reasoning_completion"),
        )
        .await
    }
}
