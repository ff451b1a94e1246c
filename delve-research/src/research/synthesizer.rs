//! Final report synthesis

use delve_core::{ChatMessage, DelveResult, ReasoningCompletion, ReasoningEffort};
use std::sync::Arc;
use tracing::info;

/// Writes the long-form report from the accumulated learnings
pub struct ReportSynthesizer {
    reasoning: Arc<dyn ReasoningCompletion>,
    effort: ReasoningEffort,
}

impl ReportSynthesizer {
    pub fn new(reasoning: Arc<dyn ReasoningCompletion>) -> Self {
        Self {
            reasoning,
            effort: ReasoningEffort::default(),
        }
    }

    pub fn with_effort(mut self, effort: ReasoningEffort) -> Self {
        self.effort = effort;
        self
    }

    pub async fn synthesize(
        &self,
        topic: &str,
        learnings: &[String],
        sources: &[String],
        report_instructions: &str,
    ) -> DelveResult<String> {
        info!(
            "Synthesizing report from {} learnings and {} sources",
            learnings.len(),
            sources.len()
        );

        let messages = vec![
            ChatMessage::system(report_instructions),
            ChatMessage::user(Self::build_prompt(topic, learnings)),
        ];
        self.reasoning.reason(messages, self.effort).await
    }

    fn build_prompt(topic: &str, learnings: &[String]) -> String {
        let block = learnings
            .iter()
            .map(|learning| format!("<l>{}</l>", learning))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "## Original Research Question/Topic: {}\n\n## Research learnings: {}",
            topic, block
        )
    }
}
