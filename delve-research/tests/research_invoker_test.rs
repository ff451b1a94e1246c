//! Tests for dispatching sub-questions to the research agent

mod common;

use common::*;
use delve_core::{AgentResponse, DelveError, RunStatus, UrlCitation};
use delve_research::{ResearchInvoker, SubQuestion};
use std::sync::Arc;

#[tokio::test]
async fn test_citation_anchor_becomes_markdown_link() {
    let agents = Arc::new(MockAgents::new(|_| {
        (
            RunStatus::Completed,
            AgentResponse {
                text_parts: vec!["Sodium cells are cheaper [1].".to_string()],
                citations: vec![UrlCitation {
                    text: "[1]".to_string(),
                    title: "Src".to_string(),
                    url: "http://x".to_string(),
                }],
            },
        )
    }));
    let invoker = ResearchInvoker::new(agents.clone(), Some("agent-default".to_string()));

    let findings = invoker
        .invoke(&SubQuestion::new("Why sodium?"), "Batteries", None)
        .await
        .unwrap();

    assert_eq!(findings.text, "Sodium cells are cheaper [Src](http://x).");
    assert!(!findings.text.contains("[1]"));
    assert_eq!(findings.sources, strings(&["http://x"]));
    assert_eq!(
        agents.posted_messages(),
        strings(&["Topic: Batteries\nQuestion: Why sodium?"])
    );
}

#[tokio::test]
async fn test_explicit_agent_id_overrides_default() {
    let agents = Arc::new(MockAgents::answering());
    let invoker = ResearchInvoker::new(agents.clone(), Some("agent-default".to_string()));

    invoker
        .invoke(&SubQuestion::new("q1"), "t", Some("agent-explicit"))
        .await
        .unwrap();
    invoker
        .invoke(&SubQuestion::new("q2"), "t", None)
        .await
        .unwrap();

    assert_eq!(
        agents.agent_ids(),
        strings(&["agent-explicit", "agent-default"])
    );
}

#[tokio::test]
async fn test_missing_agent_id_is_config_error() {
    let agents = Arc::new(MockAgents::answering());
    let invoker = ResearchInvoker::new(agents.clone(), None);

    let result = invoker.invoke(&SubQuestion::new("q"), "t", None).await;

    assert!(matches!(result, Err(DelveError::Config { .. })));
    assert_eq!(agents.threads_created(), 0);
}

#[tokio::test]
async fn test_failed_run_is_run_incomplete() {
    let agents = Arc::new(MockAgents::new(|_| (RunStatus::Failed, Default::default())));
    let invoker = ResearchInvoker::new(agents, Some("agent-default".to_string()));

    let result = invoker.invoke(&SubQuestion::new("q"), "t", None).await;

    match result {
        Err(DelveError::RunIncomplete { status, run_id, .. }) => {
            assert_eq!(status, "failed");
            assert_eq!(run_id, "run-thread-0");
        }
        other => panic!("Expected RunIncomplete error, got {:?}", other),
    }
}
