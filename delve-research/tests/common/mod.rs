//! Mock services shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use delve_core::{
    external_service_error, AgentResponse, AgentRun, AgentRuns, ChatCompletion, ChatMessage,
    ChatRequest, DelveConfig, DelveResult, ReasoningCompletion, ReasoningEffort, RunStatus,
};
use delve_research::ResearchServices;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type ChatHandler = dyn Fn(&ChatRequest) -> DelveResult<String> + Send + Sync;
type AgentHandler = dyn Fn(&str) -> (RunStatus, AgentResponse) + Send + Sync;

/// Chat service answering through a test-supplied handler
pub struct MockChat {
    handler: Box<ChatHandler>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockChat {
    pub fn new(
        handler: impl Fn(&ChatRequest) -> DelveResult<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Questions come from `questions_for(topic)`, distillations from `distil_for(query)`
    pub fn scripted(
        questions_for: impl Fn(&str) -> Vec<String> + Send + Sync + 'static,
        distil_for: impl Fn(&str) -> (Vec<String>, Vec<String>) + Send + Sync + 'static,
    ) -> Self {
        Self::new(move |request| match request.schema_name() {
            Some("queries") => Ok(queries_json(&questions_for(&topic_of(request)))),
            Some("processing") => {
                let (learnings, follow_ups) = distil_for(&query_of(request));
                Ok(processing_json(&learnings, &follow_ups))
            }
            other => panic!("Unexpected schema {:?}", other),
        })
    }

    pub fn requests(&self, schema: &str) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.schema_name() == Some(schema))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ChatCompletion for MockChat {
    async fn complete(&self, request: ChatRequest) -> DelveResult<String> {
        self.requests.lock().unwrap().push(request.clone());
        (self.handler)(&request)
    }
}

/// Reasoning service returning a fixed report, or failing every call
pub struct MockReasoning {
    fail: bool,
    calls: Mutex<Vec<(Vec<ChatMessage>, ReasoningEffort)>>,
}

impl MockReasoning {
    pub fn new() -> Self {
        Self {
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<(Vec<ChatMessage>, ReasoningEffort)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningCompletion for MockReasoning {
    async fn reason(
        &self,
        messages: Vec<ChatMessage>,
        effort: ReasoningEffort,
    ) -> DelveResult<String> {
        self.calls.lock().unwrap().push((messages, effort));
        if self.fail {
            return Err(external_service_error!(
                "azure_openai",
                "reasoning deployment unavailable",
                "mock_reasoning"
            ));
        }
        Ok("REPORT".to_string())
    }
}

/// Agent service answering each question through a test-supplied handler
pub struct MockAgents {
    handler: Box<AgentHandler>,
    delay: Duration,
    next_thread: AtomicUsize,
    messages: Mutex<HashMap<String, String>>,
    responses: Mutex<HashMap<String, AgentResponse>>,
    runs: Mutex<Vec<(String, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockAgents {
    pub fn new(
        handler: impl Fn(&str) -> (RunStatus, AgentResponse) + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            delay: Duration::from_millis(0),
            next_thread: AtomicUsize::new(0),
            messages: Mutex::new(HashMap::new()),
            responses: Mutex::new(HashMap::new()),
            runs: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Agent that completes every run with one cited answer per question
    pub fn answering() -> Self {
        Self::new(|question| (RunStatus::Completed, cited_answer(question)))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Questions the agent was run on, in run order
    pub fn questions(&self) -> Vec<String> {
        self.runs.lock().unwrap().iter().map(|(q, _)| q.clone()).collect()
    }

    pub fn agent_ids(&self) -> Vec<String> {
        self.runs.lock().unwrap().iter().map(|(_, a)| a.clone()).collect()
    }

    pub fn posted_messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().values().cloned().collect()
    }

    pub fn threads_created(&self) -> usize {
        self.next_thread.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentRuns for MockAgents {
    async fn create_thread(&self) -> DelveResult<String> {
        let id = self.next_thread.fetch_add(1, Ordering::SeqCst);
        Ok(format!("thread-{}", id))
    }

    async fn post_message(&self, thread_id: &str, content: &str) -> DelveResult<()> {
        self.messages
            .lock()
            .unwrap()
            .insert(thread_id.to_string(), content.to_string());
        Ok(())
    }

    async fn run_to_completion(&self, thread_id: &str, agent_id: &str) -> DelveResult<AgentRun> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let content = self
            .messages
            .lock()
            .unwrap()
            .get(thread_id)
            .cloned()
            .unwrap_or_default();
        let question = content
            .split_once("\nQuestion: ")
            .map(|(_, q)| q.to_string())
            .unwrap_or_default();

        let (status, response) = (self.handler)(&question);
        self.runs
            .lock()
            .unwrap()
            .push((question, agent_id.to_string()));
        self.responses
            .lock()
            .unwrap()
            .insert(thread_id.to_string(), response);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(AgentRun {
            id: format!("run-{}", thread_id),
            status,
            last_error: None,
        })
    }

    async fn last_response(&self, thread_id: &str) -> DelveResult<AgentResponse> {
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(thread_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// A one-sentence answer citing a URL derived from the question
pub fn cited_answer(question: &str) -> AgentResponse {
    AgentResponse {
        text_parts: vec![format!("Answer to {} [1].", question)],
        citations: vec![delve_core::UrlCitation {
            text: "[1]".to_string(),
            title: "Src".to_string(),
            url: format!("http://source/{}", question.replace(' ', "-")),
        }],
    }
}

/// Topic of a question generation request, without prior learnings
pub fn topic_of(request: &ChatRequest) -> String {
    let prompt = &request.messages[1].content;
    let topic = prompt
        .split_once("## TOPIC/QUESTION: ")
        .map(|(_, t)| t)
        .unwrap_or_default();
    topic
        .split("\n\nHere are previous learnings")
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Requested question count of a question generation request
pub fn max_count_of(request: &ChatRequest) -> usize {
    request.messages[1]
        .content
        .strip_prefix("Generate at most ")
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
        .unwrap_or_default()
}

/// Sub-question a distillation request is about
pub fn query_of(request: &ChatRequest) -> String {
    request.messages[0]
        .content
        .split_once("following question: ")
        .map(|(_, q)| q.to_string())
        .unwrap_or_default()
}

pub fn queries_json(queries: &[String]) -> String {
    let queries: Vec<_> = queries
        .iter()
        .map(|q| json!({"query": q, "research_goal": null}))
        .collect();
    json!({ "queries": queries }).to_string()
}

pub fn processing_json(learnings: &[String], follow_ups: &[String]) -> String {
    json!({"learnings": learnings, "follow_up_questions": follow_ups}).to_string()
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn test_config() -> DelveConfig {
    let mut config = DelveConfig::default();
    config.agent.default_agent_id = Some("agent-default".to_string());
    config
}

pub fn services(
    chat: &Arc<MockChat>,
    reasoning: &Arc<MockReasoning>,
    agents: &Arc<MockAgents>,
) -> ResearchServices {
    ResearchServices::new(chat.clone(), reasoning.clone(), agents.clone())
}
