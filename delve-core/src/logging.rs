//! Logging setup
//!
//! Logs go to stderr (or a file) so that stdout stays free for report output.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// The `[logging]` section of the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
    /// Append to this file instead of writing to stderr
    pub file: Option<PathBuf>,
    /// Emit an event with busy/idle time whenever a span closes
    pub span_timings: bool,
    /// Add source file, line and thread id to every event
    pub verbose_metadata: bool,
    /// Extra `EnvFilter` directives such as `reqwest=warn`
    pub directives: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            file: None,
            span_timings: false,
            verbose_metadata: false,
            directives: vec!["hyper=warn".to_string(), "reqwest=warn".to_string()],
        }
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `config.level` when set. Fails if the log
/// file cannot be opened or a subscriber is already installed.
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    for directive in &config.directives {
        filter = filter.add_directive(directive.parse()?);
    }

    let writer = match &config.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let span_events = if config.span_timings {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let base = fmt::layer()
        .with_writer(writer)
        .with_span_events(span_events)
        .with_file(config.verbose_metadata)
        .with_line_number(config.verbose_metadata)
        .with_thread_ids(config.verbose_metadata);

    let layer = match config.format {
        LogFormat::Json => base.json().boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()?;
    Ok(())
}

/// Timing of external calls
pub mod performance {
    use std::future::Future;
    use std::time::Instant;
    use tracing::{debug_span, Instrument};

    /// Run `future` inside a `call` span and log how long it took
    pub async fn measure_async<F: Future>(operation: &str, future: F) -> F::Output {
        let started = Instant::now();
        let output = future
            .instrument(debug_span!("call", operation = operation))
            .await;
        tracing::debug!(
            operation = operation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Call finished"
        );
        output
    }
}

/// Log the start of a top-level operation with optional extra fields
#[macro_export]
macro_rules! log_operation_start {
    ($operation:expr $(, $($field:tt)*)?) => {
        $crate::tracing::info!(operation = $operation, $($($field)*,)? "Operation started")
    };
}

#[macro_export]
macro_rules! log_operation_success {
    ($operation:expr $(, $($field:tt)*)?) => {
        $crate::tracing::info!(operation = $operation, $($($field)*,)? "Operation finished")
    };
}

#[macro_export]
macro_rules! log_operation_error {
    ($operation:expr, $error:expr $(, $($field:tt)*)?) => {
        $crate::tracing::error!(
            operation = $operation,
            error = %$error,
            $($($field)*,)?
            "Operation failed"
        )
    };
}
