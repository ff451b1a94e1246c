//! Types for the deep research system

use serde::{Deserialize, Serialize};

/// A question generated for one recursion node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuestion {
    /// The question text sent to the research agent
    pub query: String,
    /// What answering the question is meant to achieve
    #[serde(default)]
    pub research_goal: Option<String>,
}

impl SubQuestion {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            research_goal: None,
        }
    }

    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.research_goal = Some(goal.into());
        self
    }
}

/// Raw output of the research agent for one sub-question
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Findings {
    /// Agent text with citation anchors rewritten to Markdown links
    pub text: String,
    /// Cited URLs, first occurrence order
    pub sources: Vec<String>,
}

/// Learnings and follow-up questions distilled from one set of findings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistillationResult {
    #[serde(default)]
    pub learnings: Vec<String>,
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
}

/// One node of the recursion: a topic with the budget left below it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchNode {
    pub topic: String,
    /// Levels left, including this one
    pub depth: usize,
    /// Sub-questions to generate at this level
    pub breadth: usize,
}

impl ResearchNode {
    pub fn root(topic: impl Into<String>, breadth: usize, depth: usize) -> Self {
        Self {
            topic: topic.into(),
            depth,
            breadth,
        }
    }

    /// Whether branches of this node may recurse further
    pub fn can_recurse(&self) -> bool {
        self.depth > 1
    }

    /// Breadth used one level further down
    pub fn child_breadth(&self) -> usize {
        (self.breadth / 2).max(1)
    }

    /// Child node seeded by the follow-ups of one sub-question
    pub fn child(&self, parent: &SubQuestion, follow_ups: &[String]) -> Self {
        let mut topic = String::new();
        if let Some(goal) = &parent.research_goal {
            topic.push_str(&format!("Goal: {}\n", goal));
        }
        topic.push_str(&follow_ups.join("\n"));

        Self {
            topic,
            depth: self.depth - 1,
            breadth: self.child_breadth(),
        }
    }
}

/// Input of a research run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub topic: String,
    #[serde(default = "default_breadth")]
    pub breadth: usize,
    #[serde(default = "default_depth")]
    pub depth: usize,
    /// System prompt for the final report
    pub report_instructions: String,
    /// Agent to research with; the configured default when absent
    #[serde(default)]
    pub agent_id: Option<String>,
}

fn default_breadth() -> usize {
    3
}

fn default_depth() -> usize {
    4
}

impl ResearchRequest {
    pub fn new(topic: impl Into<String>, report_instructions: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            breadth: default_breadth(),
            depth: default_depth(),
            report_instructions: report_instructions.into(),
            agent_id: None,
        }
    }

    pub fn breadth(mut self, breadth: usize) -> Self {
        self.breadth = breadth;
        self
    }

    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Root node of the recursion; zero breadth or depth is raised to 1
    pub fn root_node(&self) -> ResearchNode {
        ResearchNode::root(self.topic.clone(), self.breadth.max(1), self.depth.max(1))
    }
}

/// A branch that terminated with an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchFailure {
    pub query: String,
    pub error: String,
}

/// Result of a non-streaming research run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOutcome {
    pub topic: String,
    pub report: String,
    pub learnings: Vec<String>,
    pub sources: Vec<String>,
    pub failures: Vec<BranchFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_breadth_halves_with_floor_of_one() {
        let node = ResearchNode::root("topic", 5, 3);
        assert_eq!(node.child_breadth(), 2);
        assert_eq!(ResearchNode::root("t", 1, 3).child_breadth(), 1);
        assert_eq!(ResearchNode::root("t", 3, 3).child_breadth(), 1);
    }

    #[test]
    fn test_child_topic_joins_goal_and_follow_ups() {
        let node = ResearchNode::root("topic", 4, 2);
        let parent = SubQuestion::new("q").with_goal("understand costs");
        let child = node.child(&parent, &["a?".to_string(), "b?".to_string()]);

        assert_eq!(child.topic, "Goal: understand costs\na?\nb?");
        assert_eq!(child.depth, 1);
        assert_eq!(child.breadth, 2);
        assert!(!child.can_recurse());
    }

    #[test]
    fn test_child_topic_without_goal() {
        let node = ResearchNode::root("topic", 2, 3);
        let child = node.child(&SubQuestion::new("q"), &["only?".to_string()]);
        assert_eq!(child.topic, "only?");
    }

    #[test]
    fn test_request_defaults_from_json() {
        let request: ResearchRequest = serde_json::from_str(
            r#"{"topic": "solid-state batteries", "report_instructions": "Write a report"}"#,
        )
        .unwrap();
        assert_eq!(request.breadth, 3);
        assert_eq!(request.depth, 4);
        assert!(request.agent_id.is_none());
    }

    #[test]
    fn test_root_node_clamps_zero_budget() {
        let request = ResearchRequest::new("t", "r").breadth(0).depth(0);
        let node = request.root_node();
        assert_eq!(node.breadth, 1);
        assert_eq!(node.depth, 1);
    }
}
