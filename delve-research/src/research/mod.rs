//! Recursive deep research
//!
//! A topic is broken into sub-questions, each sub-question is answered by an
//! external research agent, and the answers are distilled into learnings and
//! follow-up questions. Follow-ups seed the next level until the depth budget
//! is spent, and the deduplicated learnings are written up as one report.

pub mod distiller;
pub mod engine;
pub mod events;
pub mod invoker;
pub mod planner;
pub mod services;
pub mod state;
pub mod stream;
pub mod synthesizer;
pub mod types;

pub use distiller::Distiller;
pub use engine::{ResearchEngine, RunContext};
pub use events::{ResearchEvent, DONE_SENTINEL};
pub use invoker::ResearchInvoker;
pub use planner::QuestionGenerator;
pub use services::ResearchServices;
pub use state::{ResearchState, StateHandle};
pub use stream::{ResearchStream, StreamingSession};
pub use synthesizer::ReportSynthesizer;
pub use types::*;
