//! Per-session research accumulator

use super::types::BranchFailure;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Learnings, sources and failures gathered by one research session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResearchState {
    pub learnings: Vec<String>,
    pub sources: Vec<String>,
    pub failures: Vec<BranchFailure>,
}

impl ResearchState {
    /// Remove repeated learnings and sources, keeping first occurrences in order
    pub fn dedup(&mut self) {
        dedup_preserving_order(&mut self.learnings);
        dedup_preserving_order(&mut self.sources);
    }
}

/// Remove repeated strings, keeping the first occurrence of each
pub fn dedup_preserving_order(items: &mut Vec<String>) {
    let mut seen = HashSet::with_capacity(items.len());
    items.retain(|item| seen.insert(item.clone()));
}

/// Shared handle to a [`ResearchState`]; every mutation happens under the lock
#[derive(Debug, Clone, Default)]
pub struct StateHandle {
    inner: Arc<Mutex<ResearchState>>,
}

impl StateHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the learnings and sources of one branch
    pub async fn record(&self, learnings: Vec<String>, sources: Vec<String>) {
        let mut state = self.inner.lock().await;
        state.learnings.extend(learnings);
        state.sources.extend(sources);
    }

    pub async fn record_failure(&self, failure: BranchFailure) {
        self.inner.lock().await.failures.push(failure);
    }

    /// Current learnings, used as prior context for question generation
    pub async fn learnings(&self) -> Vec<String> {
        self.inner.lock().await.learnings.clone()
    }

    pub async fn dedup(&self) {
        self.inner.lock().await.dedup();
    }

    pub async fn snapshot(&self) -> ResearchState {
        self.inner.lock().await.clone()
    }
}
