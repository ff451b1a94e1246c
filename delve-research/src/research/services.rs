//! External service bundle and the assembled research pipeline

use super::{
    distiller::Distiller, invoker::ResearchInvoker, planner::QuestionGenerator,
    synthesizer::ReportSynthesizer,
};
use crate::clients::{AgentServiceClient, AzureOpenAiClient};
use delve_core::{AgentRuns, ChatCompletion, DelveConfig, DelveResult, ReasoningCompletion};
use std::sync::Arc;

/// The three collaborators every research run talks to
#[derive(Clone)]
pub struct ResearchServices {
    pub chat: Arc<dyn ChatCompletion>,
    pub reasoning: Arc<dyn ReasoningCompletion>,
    pub agents: Arc<dyn AgentRuns>,
}

impl ResearchServices {
    pub fn new(
        chat: Arc<dyn ChatCompletion>,
        reasoning: Arc<dyn ReasoningCompletion>,
        agents: Arc<dyn AgentRuns>,
    ) -> Self {
        Self {
            chat,
            reasoning,
            agents,
        }
    }

    /// Build the HTTP-backed services described by the configuration
    pub fn from_config(config: &DelveConfig) -> DelveResult<Self> {
        let openai = Arc::new(AzureOpenAiClient::new(&config.llm)?);
        let agents = Arc::new(AgentServiceClient::new(&config.agent)?);
        Ok(Self {
            chat: openai.clone(),
            reasoning: openai,
            agents,
        })
    }
}

/// Components shared by both recursion drivers
pub(crate) struct Pipeline {
    pub generator: QuestionGenerator,
    pub invoker: ResearchInvoker,
    pub distiller: Distiller,
    pub synthesizer: ReportSynthesizer,
    pub max_learnings: usize,
    pub max_follow_ups: usize,
}

impl Pipeline {
    pub fn new(services: ResearchServices, config: &DelveConfig) -> Self {
        let llm = &config.llm;
        Self {
            generator: QuestionGenerator::new(services.chat.clone())
                .with_sampling(llm.temperature, llm.question_max_tokens),
            invoker: ResearchInvoker::new(services.agents, config.agent.default_agent_id.clone()),
            distiller: Distiller::new(services.chat)
                .with_sampling(llm.temperature, llm.distill_max_tokens),
            synthesizer: ReportSynthesizer::new(services.reasoning)
                .with_effort(llm.reasoning_effort),
            max_learnings: config.research.max_learnings,
            max_follow_ups: config.research.max_follow_ups,
        }
    }
}
