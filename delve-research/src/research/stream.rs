//! Worker-per-branch streaming research session
//!
//! A single driver task owns all spawning. Each branch runs as its own task
//! holding one semaphore permit, acquired by the driver before the spawn. A
//! branch hands its follow-up branches back to the driver instead of spawning
//! them, so the number of live branch tasks never exceeds the limit.
//!
//! Progress is reported as [`ResearchEvent`]s on one FIFO channel, read by the
//! consumer through a [`ResearchStream`] that always ends with
//! [`ResearchEvent::Done`].

use super::events::ResearchEvent;
use super::services::{Pipeline, ResearchServices};
use super::state::StateHandle;
use super::types::{BranchFailure, ResearchNode, ResearchRequest, SubQuestion};
use delve_core::{
    log_operation_error, log_operation_success, DelveConfig, DelveError, DelveResult,
    ErrorContext,
};
use futures::{FutureExt, Stream};
use std::collections::{HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};

/// Starts streaming research sessions
pub struct StreamingSession {
    pipeline: Arc<Pipeline>,
    concurrency_limit: usize,
}

/// A sub-question waiting to run, with the budget left at its level
#[derive(Debug, Clone)]
struct Branch {
    question: SubQuestion,
    depth: usize,
    breadth: usize,
}

/// Everything one session shares between the driver and its branch tasks
struct Session {
    pipeline: Arc<Pipeline>,
    request: ResearchRequest,
    state: StateHandle,
    visited: Mutex<HashSet<String>>,
    events: mpsc::UnboundedSender<ResearchEvent>,
}

impl Session {
    /// Queue an event; a dropped consumer makes this a no-op
    fn emit(&self, event: ResearchEvent) {
        let _ = self.events.send(event);
    }

    async fn fail_branch(&self, query: String, error: String) {
        self.emit(ResearchEvent::BranchFailed {
            query: query.clone(),
            error: error.clone(),
        });
        self.state
            .record_failure(BranchFailure { query, error })
            .await;
    }

    /// Mark `query` as dispatched, returning false if it already was
    async fn claim(&self, query: &str) -> bool {
        self.visited.lock().await.insert(query.to_string())
    }
}

impl StreamingSession {
    pub fn new(services: ResearchServices, config: &DelveConfig) -> Self {
        Self {
            pipeline: Arc::new(Pipeline::new(services, config)),
            concurrency_limit: config.research.streaming_concurrency_limit.max(1),
        }
    }

    /// Start a session on the current Tokio runtime and return its event stream
    ///
    /// Panics when called outside a runtime; use [`StreamingSession::start_on`]
    /// to drive the session on an explicit runtime instead.
    pub fn start(&self, request: ResearchRequest) -> ResearchStream {
        self.start_on(&Handle::current(), request)
    }

    /// Start a session whose driver runs on `runtime`
    pub fn start_on(&self, runtime: &Handle, request: ResearchRequest) -> ResearchStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session {
            pipeline: self.pipeline.clone(),
            request,
            state: StateHandle::new(),
            visited: Mutex::new(HashSet::new()),
            events: tx,
        });
        let limiter = Arc::new(Semaphore::new(self.concurrency_limit));

        let span = info_span!("research_stream", topic = %session.request.topic);
        runtime.spawn(drive(session, limiter).instrument(span));

        ResearchStream::new(rx)
    }
}

async fn drive(session: Arc<Session>, limiter: Arc<Semaphore>) {
    session.emit(ResearchEvent::GeneratingQueries);

    match run_branches(&session, limiter).await {
        Ok(()) => {
            session.state.dedup().await;
            let state = session.state.snapshot().await;
            session.emit(ResearchEvent::ResearchComplete {
                learnings: state.learnings.clone(),
                sources: state.sources.clone(),
            });

            let report = session
                .pipeline
                .synthesizer
                .synthesize(
                    &session.request.topic,
                    &state.learnings,
                    &state.sources,
                    &session.request.report_instructions,
                )
                .await;
            match report {
                Ok(text) => {
                    log_operation_success!(
                        "research_stream",
                        learnings = state.learnings.len(),
                        failures = state.failures.len()
                    );
                    session.emit(ResearchEvent::Report { text });
                }
                Err(error) => {
                    log_operation_error!("research_stream", error);
                    session.emit(ResearchEvent::Failed {
                        error: error.to_string(),
                    });
                }
            }
        }
        Err(error) => {
            log_operation_error!("research_stream", error);
            session.emit(ResearchEvent::Failed {
                error: error.to_string(),
            });
        }
    }

    session.emit(ResearchEvent::Done);
}

/// Generate the root questions and run every branch until none are left
async fn run_branches(session: &Arc<Session>, limiter: Arc<Semaphore>) -> DelveResult<()> {
    let root = session.request.root_node();
    let questions = session
        .pipeline
        .generator
        .generate_questions(&root.topic, root.breadth, &[])
        .await?;

    let mut queue: VecDeque<Branch> = questions
        .into_iter()
        .map(|question| Branch {
            question,
            depth: root.depth,
            breadth: root.breadth,
        })
        .collect();
    let mut tasks = JoinSet::new();

    loop {
        while let Some(branch) = queue.pop_front() {
            if !session.claim(&branch.question.query).await {
                debug!(query = %branch.question.query, "Skipping already researched topic");
                continue;
            }

            let permit = limiter
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| DelveError::Internal {
                    message: format!("Research limiter closed: {}", e),
                    source: Some(Box::new(e)),
                    context: ErrorContext::new("streaming_session")
                        .with_operation("acquire_permit"),
                })?;
            tasks.spawn(run_branch(session.clone(), branch, permit).in_current_span());
        }

        match tasks.join_next().await {
            Some(Ok(children)) => queue.extend(children),
            Some(Err(error)) => warn!("Research branch task did not finish: {}", error),
            None => break,
        }
    }

    Ok(())
}

/// Run one branch, reporting its outcome and returning its child branches
async fn run_branch(
    session: Arc<Session>,
    branch: Branch,
    _permit: OwnedSemaphorePermit,
) -> Vec<Branch> {
    let query = branch.question.query.clone();
    session.emit(ResearchEvent::TopicAnnounced {
        query: query.clone(),
    });

    match AssertUnwindSafe(research_branch(&session, &branch))
        .catch_unwind()
        .await
    {
        Ok(Ok(children)) => children,
        Ok(Err(error)) => {
            error.log();
            session.fail_branch(query, error.to_string()).await;
            Vec::new()
        }
        Err(_) => {
            warn!(query = %query, "Research branch panicked");
            session
                .fail_branch(query, "research branch panicked".to_string())
                .await;
            Vec::new()
        }
    }
}

async fn research_branch(session: &Session, branch: &Branch) -> DelveResult<Vec<Branch>> {
    let pipeline = &session.pipeline;
    let findings = pipeline
        .invoker
        .invoke(
            &branch.question,
            &session.request.topic,
            session.request.agent_id.as_deref(),
        )
        .await?;
    let distilled = pipeline
        .distiller
        .distil(
            &branch.question,
            &findings,
            pipeline.max_learnings,
            pipeline.max_follow_ups,
        )
        .await?;

    session.emit(ResearchEvent::Findings {
        query: branch.question.query.clone(),
        learnings: distilled.learnings.clone(),
    });
    session
        .state
        .record(distilled.learnings, findings.sources)
        .await;

    let node = ResearchNode::root(branch.question.query.clone(), branch.breadth, branch.depth);
    if !node.can_recurse() {
        return Ok(Vec::new());
    }

    let child_breadth = node.child_breadth();
    let children: Vec<Branch> = distilled
        .follow_up_questions
        .into_iter()
        .take(child_breadth)
        .map(|follow_up| Branch {
            question: SubQuestion::new(follow_up),
            depth: node.depth - 1,
            breadth: child_breadth,
        })
        .collect();
    info!(
        query = %branch.question.query,
        children = children.len(),
        "Branch finished"
    );
    Ok(children)
}

/// Finite stream of the events of one session, always ending with `Done`
pub struct ResearchStream {
    events: mpsc::UnboundedReceiver<ResearchEvent>,
    finished: bool,
}

impl ResearchStream {
    fn new(events: mpsc::UnboundedReceiver<ResearchEvent>) -> Self {
        Self {
            events,
            finished: false,
        }
    }

    /// The session as rendered text chunks, the last one being the sentinel
    pub fn chunks(self) -> impl Stream<Item = String> + Send + 'static {
        futures::StreamExt::map(self, |event| event.render())
    }
}

impl Stream for ResearchStream {
    type Item = ResearchEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match self.events.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_done() {
                    self.finished = true;
                }
                Poll::Ready(Some(event))
            }
            // Producer went away without finishing the session
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(Some(ResearchEvent::Done))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_stream_ends_after_done() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ResearchEvent::GeneratingQueries).unwrap();
        tx.send(ResearchEvent::Done).unwrap();
        tx.send(ResearchEvent::GeneratingQueries).unwrap();

        let events: Vec<_> = ResearchStream::new(rx).collect().await;
        assert_eq!(
            events,
            vec![ResearchEvent::GeneratingQueries, ResearchEvent::Done]
        );
    }

    #[tokio::test]
    async fn test_stream_yields_done_when_producer_drops() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ResearchEvent::GeneratingQueries).unwrap();
        drop(tx);

        let chunks: Vec<String> = ResearchStream::new(rx).chunks().collect().await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks.last().map(String::as_str), Some("<<DONE>>"));
    }
}
