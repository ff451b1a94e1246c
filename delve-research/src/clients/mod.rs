//! HTTP clients for the external services
//!
//! - [`AzureOpenAiClient`]: chat and reasoning completions against an Azure OpenAI resource
//! - [`AgentServiceClient`]: thread / message / run calls against the agent service

use delve_core::{DelveError, DelveResult, ErrorContext};
use std::collections::HashMap;

pub mod agents;
pub mod openai;

pub use agents::AgentServiceClient;
pub use openai::AzureOpenAiClient;

/// Configuration shared by the HTTP clients
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
    /// Additional headers sent with every request
    pub headers: HashMap<String, String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 300,
            user_agent: format!("delve/{}", env!("CARGO_PKG_VERSION")),
            headers: HashMap::new(),
        }
    }
}

impl HttpClientConfig {
    /// Set additional header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

fn client_config_error(
    message: String,
    source: impl std::error::Error + Send + Sync + 'static,
) -> DelveError {
    DelveError::Config {
        message,
        source: Some(Box::new(source)),
        context: ErrorContext::new("http_client").with_operation("create_client"),
    }
}

/// Build an HTTP client with common configuration
pub(crate) fn create_http_client(config: &HttpClientConfig) -> DelveResult<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();

    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_str(&config.user_agent)
            .map_err(|e| client_config_error(format!("Invalid user agent: {}", e), e))?,
    );

    for (key, value) in &config.headers {
        let header_name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| client_config_error(format!("Invalid header name '{}': {}", key, e), e))?;
        // Header values may be secrets; keep them out of the message
        let header_value = reqwest::header::HeaderValue::from_str(value)
            .map_err(|e| client_config_error(format!("Invalid header value for '{}'", key), e))?;
        headers.insert(header_name, header_value);
    }

    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_seconds))
        .default_headers(headers)
        .build()
        .map_err(|e| client_config_error(format!("Failed to create HTTP client: {}", e), e))
}

/// Map a transport failure to an external service error
pub(crate) fn request_error(service: &str, operation: &str, error: reqwest::Error) -> DelveError {
    DelveError::ExternalService {
        service: service.to_string(),
        message: format!("Request failed: {}", error),
        status: error.status().map(|s| s.as_u16()),
        source: Some(Box::new(error)),
        context: ErrorContext::new(service)
            .with_operation(operation)
            .with_suggestion("Check network connectivity and the service endpoint"),
    }
}

/// Turn a non-success HTTP response into an external service error
pub(crate) async fn handle_response_error(
    response: reqwest::Response,
    service: &str,
    operation: &str,
) -> DelveError {
    let status = response.status();
    let url = response.url().clone();

    let error_body = response.text().await.unwrap_or_default();

    DelveError::ExternalService {
        service: service.to_string(),
        message: format!(
            "HTTP {} error for {}: {}",
            status.as_u16(),
            url.path(),
            if error_body.is_empty() {
                status.canonical_reason().unwrap_or("Unknown error")
            } else {
                &error_body
            }
        ),
        status: Some(status.as_u16()),
        source: None,
        context: ErrorContext::new(service)
            .with_operation(operation)
            .with_suggestion(match status.as_u16() {
                401 => "Check your API key or access token",
                403 => "Check the permissions of the credential",
                404 => "Check the endpoint, deployment name or agent id",
                429 => "The service is rate limiting requests; lower the concurrency limit",
                _ => "Check network connectivity and service status",
            }),
    }
}

/// Decode a JSON response body, mapping failures to an external service error
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    service: &str,
    operation: &str,
) -> DelveResult<T> {
    if !response.status().is_success() {
        return Err(handle_response_error(response, service, operation).await);
    }

    response
        .json::<T>()
        .await
        .map_err(|e| DelveError::ExternalService {
            service: service.to_string(),
            message: format!("Unexpected response body: {}", e),
            status: None,
            source: Some(Box::new(e)),
            context: ErrorContext::new(service).with_operation(operation),
        })
}

/// Join a base URL and a path without doubling slashes
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://example.com/api/", "/threads"),
            "https://example.com/api/threads"
        );
        assert_eq!(join_url("https://example.com", "runs"), "https://example.com/runs");
    }

    #[test]
    fn test_create_http_client_rejects_bad_header() {
        let config = HttpClientConfig::default().with_header("bad header", "value");
        assert!(matches!(
            create_http_client(&config),
            Err(DelveError::Config { .. })
        ));
    }
}
