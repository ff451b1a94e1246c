//! Progress events emitted by a streaming research session

use serde::{Deserialize, Serialize};

/// Text chunk that terminates every streaming session
pub const DONE_SENTINEL: &str = "<<DONE>>";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResearchEvent {
    GeneratingQueries,
    TopicAnnounced { query: String },
    Findings { query: String, learnings: Vec<String> },
    BranchFailed { query: String, error: String },
    ResearchComplete { learnings: Vec<String>, sources: Vec<String> },
    Report { text: String },
    Failed { error: String },
    Done,
}

impl ResearchEvent {
    pub fn is_done(&self) -> bool {
        matches!(self, ResearchEvent::Done)
    }

    /// Render the event as one text chunk for a client
    pub fn render(&self) -> String {
        match self {
            ResearchEvent::GeneratingQueries => {
                "Generating initial research inquiries...\n\n".to_string()
            }
            ResearchEvent::TopicAnnounced { query } => format!("Research Topic: {}\n", query),
            ResearchEvent::Findings { query, learnings } => {
                let mut chunk = format!("Learnings for {}:\n", query);
                for learning in learnings {
                    chunk.push_str(&format!("  • {}\n", learning));
                }
                chunk.push('\n');
                chunk
            }
            ResearchEvent::BranchFailed { query, error } => {
                format!("Research on \"{}\" failed: {}\n\n", query, error)
            }
            ResearchEvent::ResearchComplete { learnings, sources } => format!(
                "Research complete: {} learnings from {} sources. Writing report...\n\n",
                learnings.len(),
                sources.len()
            ),
            ResearchEvent::Report { text } => text.clone(),
            ResearchEvent::Failed { error } => format!("Research failed: {}\n", error),
            ResearchEvent::Done => DONE_SENTINEL.to_string(),
        }
    }
}
