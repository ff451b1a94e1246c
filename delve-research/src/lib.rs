//! Delve Research - recursive deep-research engine
//!
//! Given a topic, the engine generates sub-questions, dispatches each to an
//! external research agent, distills the agent's findings into learnings and
//! follow-up questions, recurses on the follow-ups up to a bounded depth, and
//! finally synthesizes every learning into a long-form report.
//!
//! ## Architecture
//!
//! - **Clients** ([`clients`]): HTTP adapters for the chat, reasoning and agent services
//! - **Research** ([`research`]): question generation, invocation, distillation,
//!   synthesis, and the two recursion drivers:
//!   - [`ResearchEngine`]: cooperative controller returning a [`ResearchOutcome`]
//!   - [`StreamingSession`]: worker-per-branch driver emitting [`ResearchEvent`]s

pub mod clients;
pub mod research;

pub use clients::{AgentServiceClient, AzureOpenAiClient};
pub use research::{
    BranchFailure, DistillationResult, Distiller, Findings, QuestionGenerator, ReportSynthesizer,
    ResearchEngine, ResearchEvent, ResearchInvoker, ResearchNode, ResearchOutcome,
    ResearchRequest, ResearchServices, ResearchState, ResearchStream, RunContext, StateHandle,
    StreamingSession, SubQuestion, DONE_SENTINEL,
};
