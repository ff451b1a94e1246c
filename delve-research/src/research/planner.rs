//! Sub-question generation

use super::types::SubQuestion;
use delve_core::{
    schema_error, ChatCompletion, ChatMessage, ChatRequest, DelveResult, ResponseSchema,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

pub const QUERIES_SCHEMA: &str = "queries";

const SYSTEM_PROMPT: &str = "You generate research inquiries based on a research topic or \
    question. You should generate unique questions that are relevant to the topic and can be \
    asked of a subject matter expert.";

#[derive(Debug, Deserialize)]
struct QueryList {
    queries: Vec<SubQuestion>,
}

/// Breaks a topic into at most `max_count` unique sub-questions
pub struct QuestionGenerator {
    chat: Arc<dyn ChatCompletion>,
    temperature: f32,
    max_tokens: u32,
}

impl QuestionGenerator {
    pub fn new(chat: Arc<dyn ChatCompletion>) -> Self {
        Self {
            chat,
            temperature: 0.0,
            max_tokens: 800,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Generate sub-questions for `topic`, using earlier learnings as context
    pub async fn generate_questions(
        &self,
        topic: &str,
        max_count: usize,
        prior_learnings: &[String],
    ) -> DelveResult<Vec<SubQuestion>> {
        let max_count = max_count.max(1);
        info!("Generating up to {} questions", max_count);

        let request = ChatRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(Self::build_prompt(topic, max_count, prior_learnings)),
        ])
        .temperature(self.temperature)
        .max_tokens(self.max_tokens)
        .schema(Self::response_schema());

        let raw = self.chat.complete(request).await?;
        let questions = Self::parse_questions(&raw, max_count)?;

        for question in &questions {
            debug!("  - {}", question.query);
        }
        Ok(questions)
    }

    fn build_prompt(topic: &str, max_count: usize, prior_learnings: &[String]) -> String {
        let mut prompt = format!(
            "Generate at most {} UNIQUE questions about the research topic or question \
             presented here. These questions should be framed as though they were being asked \
             of a subject matter expert in the area.\n## TOPIC/QUESTION: {}",
            max_count, topic
        );
        if !prior_learnings.is_empty() {
            prompt.push_str("\n\nHere are previous learnings:\n");
            prompt.push_str(&prior_learnings.join("\n"));
        }
        prompt
    }

    fn response_schema() -> ResponseSchema {
        ResponseSchema {
            name: QUERIES_SCHEMA.to_string(),
            schema: json!({
                "type": "object",
                "properties": {
                    "queries": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "query": {"type": "string"},
                                "research_goal": {"type": ["string", "null"]}
                            },
                            "required": ["query", "research_goal"],
                            "additionalProperties": false
                        }
                    }
                },
                "required": ["queries"],
                "additionalProperties": false
            }),
            strict: true,
        }
    }

    /// Parse the structured reply, drop repeated queries, then truncate
    fn parse_questions(raw: &str, max_count: usize) -> DelveResult<Vec<SubQuestion>> {
        let parsed: QueryList = serde_json::from_str(raw)
            .map_err(|e| schema_error!(QUERIES_SCHEMA, e, "question_generator"))?;

        let mut seen = HashSet::new();
        let mut questions: Vec<SubQuestion> = parsed
            .queries
            .into_iter()
            .filter(|q| seen.insert(q.query.clone()))
            .collect();
        questions.truncate(max_count);
        Ok(questions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_core::DelveError;

    #[test]
    fn test_parse_dedupes_then_truncates() {
        let raw = r#"{"queries": [
            {"query": "a", "research_goal": "goal a"},
            {"query": "a", "research_goal": null},
            {"query": "b", "research_goal": null},
            {"query": "c", "research_goal": null}
        ]}"#;

        let questions = QuestionGenerator::parse_questions(raw, 2).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].query, "a");
        assert_eq!(questions[0].research_goal.as_deref(), Some("goal a"));
        assert_eq!(questions[1].query, "b");
    }

    #[test]
    fn test_parse_rejects_malformed_reply() {
        let result = QuestionGenerator::parse_questions(r#"{"questions": []}"#, 3);
        match result {
            Err(DelveError::SchemaValidation { schema, .. }) => assert_eq!(schema, "queries"),
            other => panic!("Expected SchemaValidation error, got {:?}", other),
        }
    }

    #[test]
    fn test_prompt_includes_previous_learnings() {
        let prompt =
            QuestionGenerator::build_prompt("topic", 3, &["known fact".to_string()]);
        assert!(prompt.contains("## TOPIC/QUESTION: topic"));
        assert!(prompt.contains("previous learnings:\nknown fact"));

        let bare = QuestionGenerator::build_prompt("topic", 3, &[]);
        assert!(!bare.contains("previous learnings"));
    }
}
