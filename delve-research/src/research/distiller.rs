//! Distillation of agent findings into learnings and follow-up questions

use super::types::{DistillationResult, Findings, SubQuestion};
use delve_core::{
    schema_error, ChatCompletion, ChatMessage, ChatRequest, DelveResult, ResponseSchema,
};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

pub const PROCESSING_SCHEMA: &str = "processing";

pub struct Distiller {
    chat: Arc<dyn ChatCompletion>,
    temperature: f32,
    max_tokens: u32,
}

impl Distiller {
    pub fn new(chat: Arc<dyn ChatCompletion>) -> Self {
        Self {
            chat,
            temperature: 0.0,
            max_tokens: 2000,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Turn the findings for `sub_question` into bounded learnings and follow-ups
    pub async fn distil(
        &self,
        sub_question: &SubQuestion,
        findings: &Findings,
        max_learnings: usize,
        max_follow_ups: usize,
    ) -> DelveResult<DistillationResult> {
        let system = format!(
            "You review output from a researcher on a given topic and distill succinct \
             learnings. Provide no more than {} **very detailed** learnings containing the most \
             relevant information obtained. EACH LEARNING SHOULD CONTAIN A SOURCE CITATION and \
             must retain the citation format of the research, usually a website title with its \
             URL as a Markdown link. Also provide up to {} follow-up questions that would deepen \
             the research. Your learnings should be relevant to the following question: {}",
            max_learnings, max_follow_ups, sub_question.query
        );

        let request = ChatRequest::new(vec![
            ChatMessage::system(system),
            ChatMessage::user(findings.text.clone()),
        ])
        .temperature(self.temperature)
        .max_tokens(self.max_tokens)
        .schema(Self::response_schema(max_follow_ups));

        let raw = self.chat.complete(request).await?;
        let result = Self::parse(&raw, max_learnings, max_follow_ups)?;

        debug!(
            query = %sub_question.query,
            learnings = result.learnings.len(),
            follow_ups = result.follow_up_questions.len(),
            "Distilled findings"
        );
        Ok(result)
    }

    fn response_schema(max_follow_ups: usize) -> ResponseSchema {
        ResponseSchema {
            name: PROCESSING_SCHEMA.to_string(),
            schema: json!({
                "type": "object",
                "properties": {
                    "learnings": {
                        "type": "array",
                        "items": {"type": "string"}
                    },
                    "follow_up_questions": {
                        "type": "array",
                        "items": {"type": "string"},
                        "maxItems": max_follow_ups
                    }
                },
                "required": ["learnings", "follow_up_questions"],
                "additionalProperties": false
            }),
            strict: true,
        }
    }

    fn parse(
        raw: &str,
        max_learnings: usize,
        max_follow_ups: usize,
    ) -> DelveResult<DistillationResult> {
        let mut result: DistillationResult = serde_json::from_str(raw)
            .map_err(|e| schema_error!(PROCESSING_SCHEMA, e, "distiller"))?;
        result.learnings.truncate(max_learnings);
        result.follow_up_questions.truncate(max_follow_ups);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_core::DelveError;

    #[test]
    fn test_parse_truncates_both_lists() {
        let raw = r#"{
            "learnings": ["l1", "l2", "l3", "l4"],
            "follow_up_questions": ["f1", "f2", "f3"]
        }"#;
        let result = Distiller::parse(raw, 3, 2).unwrap();
        assert_eq!(result.learnings, vec!["l1", "l2", "l3"]);
        assert_eq!(result.follow_up_questions, vec!["f1", "f2"]);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(
            Distiller::parse("Here are some learnings", 3, 3),
            Err(DelveError::SchemaValidation { .. })
        ));
    }

    #[test]
    fn test_schema_bounds_follow_ups() {
        let schema = Distiller::response_schema(4);
        assert_eq!(schema.name, "processing");
        assert_eq!(
            schema.schema["properties"]["follow_up_questions"]["maxItems"],
            4
        );
    }
}
