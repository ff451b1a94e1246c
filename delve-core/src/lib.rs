//! Delve Core - shared infrastructure for the research pipeline
//!
//! Errors, logging, configuration and the contracts of the external services
//! (chat completion, reasoning completion, agent runs) the pipeline talks to.

pub mod config;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use traits::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tokio;
pub use tracing;
