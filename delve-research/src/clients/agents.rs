//! Agent service client
//!
//! Talks to the thread / message / run REST surface of an agent project
//! endpoint. A research agent is run on a fresh thread per sub-question.

use super::{create_http_client, join_url, read_json, request_error, HttpClientConfig};
use delve_core::logging::performance::measure_async;
use delve_core::{
    async_trait, config_error, external_service_error, AgentConfig, AgentResponse, AgentRun,
    AgentRuns, DelveError, DelveResult, RunStatus, UrlCitation,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

const SERVICE: &str = "agent_service";

/// Client for the agent service of one project
pub struct AgentServiceClient {
    client: reqwest::Client,
    endpoint: String,
    api_version: String,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Debug, Serialize)]
struct CreateMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    id: String,
    status: RunStatus,
    #[serde(default)]
    last_error: Option<RunError>,
}

#[derive(Debug, Deserialize)]
struct RunError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<MessageObject>,
}

#[derive(Debug, Deserialize)]
struct MessageObject {
    role: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TextContent {
    value: String,
    #[serde(default)]
    annotations: Vec<Annotation>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Annotation {
    UrlCitation {
        text: String,
        url_citation: UrlCitationDetails,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct UrlCitationDetails {
    url: String,
    #[serde(default)]
    title: Option<String>,
}

impl AgentServiceClient {
    /// Create a client from the agent section of the configuration
    pub fn new(config: &AgentConfig) -> DelveResult<Self> {
        let endpoint = config
            .project_endpoint
            .clone()
            .ok_or_else(|| {
                config_error!("Agent project endpoint is not configured", "agent_client")
            })?;
        let token = config
            .access_token
            .clone()
            .ok_or_else(|| {
                config_error!("Agent service access token is not configured", "agent_client")
            })?;

        let http_config = HttpClientConfig::default()
            .with_timeout(config.timeout_seconds)
            .with_header("Authorization", format!("Bearer {}", token));
        let client = create_http_client(&http_config)?;

        info!("Created agent service client for {}", endpoint);

        Ok(Self {
            client,
            endpoint,
            api_version: config.api_version.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    fn url(&self, path: &str) -> String {
        let separator = if path.contains('?') { '&' } else { '?' };
        format!(
            "{}{}api-version={}",
            join_url(&self.endpoint, path),
            separator,
            self.api_version
        )
    }

    async fn post<B: Serialize + ?Sized, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        operation: &str,
    ) -> DelveResult<T> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| request_error(SERVICE, operation, e))?;
        read_json(response, SERVICE, operation).await
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        operation: &str,
    ) -> DelveResult<T> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| request_error(SERVICE, operation, e))?;
        read_json(response, SERVICE, operation).await
    }

    async fn poll_run(&self, thread_id: &str, mut run: RunObject) -> DelveResult<RunObject> {
        while !run.status.is_terminal() {
            tokio::time::sleep(self.poll_interval).await;
            run = self
                .get(&format!("threads/{}/runs/{}", thread_id, run.id), "get_run")
                .await?;
            debug!(run_id = %run.id, status = %run.status, "Polled agent run");
        }
        Ok(run)
    }
}

fn into_agent_response(messages: MessageList) -> DelveResult<AgentResponse> {
    let message = messages
        .data
        .into_iter()
        .find(|m| m.role == "assistant" || m.role == "agent")
        .ok_or_else(|| {
            external_service_error!(SERVICE, "Thread has no agent message", SERVICE)
        })?;

    let mut response = AgentResponse::default();
    for part in message.content {
        if let ContentPart::Text { text } = part {
            for annotation in text.annotations {
                if let Annotation::UrlCitation { text, url_citation } = annotation {
                    response.citations.push(UrlCitation {
                        title: url_citation
                            .title
                            .unwrap_or_else(|| url_citation.url.clone()),
                        url: url_citation.url,
                        text,
                    });
                }
            }
            response.text_parts.push(text.value);
        }
    }

    Ok(response)
}

#[async_trait]
impl AgentRuns for AgentServiceClient {
    async fn create_thread(&self) -> DelveResult<String> {
        let thread: ThreadObject = self.post("threads", &json!({}), "create_thread").await?;
        debug!(thread_id = %thread.id, "Created agent thread");
        Ok(thread.id)
    }

    async fn post_message(&self, thread_id: &str, content: &str) -> DelveResult<()> {
        let body = CreateMessage {
            role: "user",
            content,
        };
        let _: serde_json::Value = self
            .post(&format!("threads/{}/messages", thread_id), &body, "post_message")
            .await?;
        Ok(())
    }

    async fn run_to_completion(&self, thread_id: &str, agent_id: &str) -> DelveResult<AgentRun> {
        measure_async("agent_run", async {
            let run: RunObject = self
                .post(
                    &format!("threads/{}/runs", thread_id),
                    &json!({ "assistant_id": agent_id }),
                    "create_run",
                )
                .await?;
            let run = self.poll_run(thread_id, run).await?;

            Ok::<_, DelveError>(AgentRun {
                id: run.id,
                status: run.status,
                last_error: run.last_error.map(|e| match (e.code, e.message) {
                    (Some(code), Some(message)) => format!("{}: {}", code, message),
                    (code, message) => message.or(code).unwrap_or_default(),
                }),
            })
        })
        .await
    }

    async fn last_response(&self, thread_id: &str) -> DelveResult<AgentResponse> {
        let messages: MessageList = self
            .get(
                &format!("threads/{}/messages?order=desc&limit=20", thread_id),
                "list_messages",
            )
            .await?;
        into_agent_response(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_last_agent_message() {
        let messages: MessageList = serde_json::from_value(json!({
            "data": [
                {
                    "role": "assistant",
                    "content": [
                        {
                            "type": "text",
                            "text": {
                                "value": "Rust is memory safe [1].",
                                "annotations": [
                                    {
                                        "type": "url_citation",
                                        "text": "[1]",
                                        "url_citation": {"url": "http://x", "title": "Src"}
                                    },
                                    {"type": "file_citation", "text": "[2]"}
                                ]
                            }
                        },
                        {"type": "image_file", "image_file": {"file_id": "f"}}
                    ]
                },
                {"role": "user", "content": [{"type": "text", "text": {"value": "Q"}}]}
            ]
        }))
        .unwrap();

        let response = into_agent_response(messages).unwrap();
        assert_eq!(response.text_parts, vec!["Rust is memory safe [1].".to_string()]);
        assert_eq!(
            response.citations,
            vec![UrlCitation {
                text: "[1]".to_string(),
                title: "Src".to_string(),
                url: "http://x".to_string(),
            }]
        );
    }

    #[test]
    fn test_thread_without_agent_message() {
        let messages: MessageList = serde_json::from_value(json!({
            "data": [{"role": "user", "content": []}]
        }))
        .unwrap();

        assert!(matches!(
            into_agent_response(messages),
            Err(DelveError::ExternalService { .. })
        ));
    }

    #[test]
    fn test_unknown_run_status() {
        let run: RunObject =
            serde_json::from_value(json!({"id": "run_1", "status": "something_new"})).unwrap();
        assert_eq!(run.status, RunStatus::Unknown);
        assert!(run.status.is_terminal());
    }
}
