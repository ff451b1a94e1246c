//! Cooperative recursion controller
//!
//! Branches of one level are futures joined in the caller's task. A single
//! semaphore shared by the whole call tree bounds the number of research agent
//! calls in flight, and every branch writes into the same [`StateHandle`].

use super::services::{Pipeline, ResearchServices};
use super::state::StateHandle;
use super::types::{BranchFailure, ResearchNode, ResearchOutcome, ResearchRequest, SubQuestion};
use delve_core::{
    log_operation_start, log_operation_success, DelveConfig, DelveError, DelveResult,
    ErrorContext, ResearchSettings,
};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, info_span, warn, Instrument};

/// Per-run values every branch needs
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Root topic, sent to the agent with every sub-question
    pub original_topic: String,
    pub agent_id: Option<String>,
}

/// Deep research engine running the whole recursion in one task
pub struct ResearchEngine {
    pipeline: Pipeline,
    settings: ResearchSettings,
}

impl ResearchEngine {
    pub fn new(services: ResearchServices, config: &DelveConfig) -> Self {
        Self {
            pipeline: Pipeline::new(services, config),
            settings: config.research.clone(),
        }
    }

    /// Research the request topic and synthesize the final report
    pub async fn run(&self, request: ResearchRequest) -> DelveResult<ResearchOutcome> {
        log_operation_start!(
            "research_run",
            breadth = request.breadth,
            depth = request.depth
        );

        let state = StateHandle::new();
        let limiter = Arc::new(Semaphore::new(self.settings.concurrency_limit.max(1)));
        let ctx = RunContext {
            original_topic: request.topic.clone(),
            agent_id: request.agent_id.clone(),
        };

        self.research(request.root_node(), &ctx, &state, &limiter).await?;

        let state = state.snapshot().await;
        let report = self
            .pipeline
            .synthesizer
            .synthesize(
                &request.topic,
                &state.learnings,
                &state.sources,
                &request.report_instructions,
            )
            .await?;

        log_operation_success!(
            "research_run",
            learnings = state.learnings.len(),
            sources = state.sources.len(),
            failures = state.failures.len()
        );

        Ok(ResearchOutcome {
            topic: request.topic,
            report,
            learnings: state.learnings,
            sources: state.sources,
            failures: state.failures,
        })
    }

    /// Research one node and everything below it into `state`
    ///
    /// Fails only when question generation for `node` fails; branch failures
    /// are recorded on the state and do not stop sibling branches.
    pub fn research<'a>(
        &'a self,
        node: ResearchNode,
        ctx: &'a RunContext,
        state: &'a StateHandle,
        limiter: &'a Arc<Semaphore>,
    ) -> BoxFuture<'a, DelveResult<()>> {
        let span = info_span!("research_level", depth = node.depth, breadth = node.breadth);
        async move {
            let prior = state.learnings().await;
            let questions = self
                .pipeline
                .generator
                .generate_questions(&node.topic, node.breadth, &prior)
                .await?;
            info!("Researching {} sub-questions", questions.len());

            let branches = questions.into_iter().map(|question| {
                let node = &node;
                async move {
                    let query = question.query.clone();
                    if let Err(error) = self.branch(node, question, ctx, state, limiter).await {
                        error.log();
                        warn!(query = %query, "Research branch failed");
                        state
                            .record_failure(BranchFailure {
                                query,
                                error: error.to_string(),
                            })
                            .await;
                    }
                }
            });
            join_all(branches).await;

            state.dedup().await;
            Ok(())
        }
        .instrument(span)
        .boxed()
    }

    async fn branch(
        &self,
        node: &ResearchNode,
        question: SubQuestion,
        ctx: &RunContext,
        state: &StateHandle,
        limiter: &Arc<Semaphore>,
    ) -> DelveResult<()> {
        let findings = {
            let _permit = limiter.acquire().await.map_err(|e| DelveError::Internal {
                message: format!("Research limiter closed: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("research_engine").with_operation("acquire_permit"),
            })?;
            self.pipeline
                .invoker
                .invoke(&question, &ctx.original_topic, ctx.agent_id.as_deref())
                .await?
        };

        let distilled = self
            .pipeline
            .distiller
            .distil(
                &question,
                &findings,
                self.pipeline.max_learnings,
                self.pipeline.max_follow_ups,
            )
            .await?;

        let follow_ups = distilled.follow_up_questions;
        state.record(distilled.learnings, findings.sources).await;

        if node.can_recurse() && !follow_ups.is_empty() {
            let child = node.child(&question, &follow_ups);
            self.research(child, ctx, state, limiter).await?;
        }
        Ok(())
    }
}
