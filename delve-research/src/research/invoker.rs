//! Dispatch of one sub-question to the external research agent

use super::state::dedup_preserving_order;
use super::types::{Findings, SubQuestion};
use delve_core::{
    config_error, AgentResponse, AgentRuns, DelveError, DelveResult, ErrorContext, RunStatus,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Runs the research agent on a fresh thread per sub-question
pub struct ResearchInvoker {
    agents: Arc<dyn AgentRuns>,
    default_agent_id: Option<String>,
}

impl ResearchInvoker {
    pub fn new(agents: Arc<dyn AgentRuns>, default_agent_id: Option<String>) -> Self {
        Self {
            agents,
            default_agent_id,
        }
    }

    fn resolve_agent_id<'a>(&'a self, agent_id: Option<&'a str>) -> DelveResult<&'a str> {
        agent_id
            .filter(|id| !id.is_empty())
            .or(self.default_agent_id.as_deref().filter(|id| !id.is_empty()))
            .ok_or_else(|| {
                config_error!("No research agent id given and no default configured", "invoker")
            })
    }

    /// Ask the agent `sub_question` in the context of the original topic
    #[instrument(skip_all, fields(query = %sub_question.query))]
    pub async fn invoke(
        &self,
        sub_question: &SubQuestion,
        original_topic: &str,
        agent_id: Option<&str>,
    ) -> DelveResult<Findings> {
        let agent_id = self.resolve_agent_id(agent_id)?;

        let thread_id = self.agents.create_thread().await?;
        let content = format!(
            "Topic: {}\nQuestion: {}",
            original_topic, sub_question.query
        );
        self.agents.post_message(&thread_id, &content).await?;

        let run = self.agents.run_to_completion(&thread_id, agent_id).await?;
        if run.status != RunStatus::Completed {
            return Err(DelveError::RunIncomplete {
                context: ErrorContext::new("invoker")
                    .with_operation("run_agent")
                    .with_metadata("thread_id", &thread_id)
                    .with_metadata("agent_id", agent_id),
                run_id: run.id,
                status: run.status.to_string(),
                last_error: run.last_error,
            });
        }
        debug!(run_id = %run.id, "Agent run completed");

        let response = self.agents.last_response(&thread_id).await?;
        let findings = rewrite_citations(response);
        info!(
            "Agent returned {} chars with {} sources",
            findings.text.len(),
            findings.sources.len()
        );
        Ok(findings)
    }
}

/// Join the text parts and replace citation anchors with Markdown links
pub fn rewrite_citations(response: AgentResponse) -> Findings {
    let mut text = response.text_parts.concat();
    let mut sources = Vec::with_capacity(response.citations.len());

    for citation in response.citations {
        if !citation.text.is_empty() {
            let link = format!("[{}]({})", citation.title, citation.url);
            text = text.replace(&citation.text, &link);
        }
        sources.push(citation.url);
    }
    dedup_preserving_order(&mut sources);

    Findings { text, sources }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_core::UrlCitation;

    fn citation(text: &str, title: &str, url: &str) -> UrlCitation {
        UrlCitation {
            text: text.to_string(),
            title: title.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn test_rewrite_replaces_anchor_with_link() {
        let findings = rewrite_citations(AgentResponse {
            text_parts: vec!["Rust is fast [1].".to_string(), " And safe [2].".to_string()],
            citations: vec![
                citation("[1]", "Src", "http://x"),
                citation("[2]", "Other", "http://y"),
                citation("[3]", "Src", "http://x"),
            ],
        });

        assert_eq!(
            findings.text,
            "Rust is fast [Src](http://x). And safe [Other](http://y)."
        );
        assert_eq!(findings.sources, vec!["http://x", "http://y"]);
    }

    #[test]
    fn test_rewrite_without_citations() {
        let findings = rewrite_citations(AgentResponse {
            text_parts: vec!["plain".to_string()],
            citations: Vec::new(),
        });
        assert_eq!(findings.text, "plain");
        assert!(findings.sources.is_empty());
    }
}
