//! Delve CLI - command-line interface for the deep-research engine
//!
//! `delve run` researches a topic and prints the final report, `delve stream`
//! prints progress chunks as the research unfolds.

use clap::{Args, Parser, Subcommand};
use delve_core::{
    init_logging, log_operation_error, log_operation_start, log_operation_success, DelveConfig,
    DelveError, DelveResult, ErrorContext,
};
use delve_research::{
    ResearchEngine, ResearchEvent, ResearchRequest, ResearchServices, StreamingSession,
};
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "delve")]
#[command(about = "Recursive deep research backed by a web-grounded research agent")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a topic and print the final report
    Run(ResearchArgs),

    /// Research a topic, printing progress as it arrives
    Stream(ResearchArgs),

    /// Manage configuration
    Config {
        /// Write a default configuration file
        #[arg(long)]
        init: bool,

        /// Show the effective configuration
        #[arg(long)]
        show: bool,

        /// Validate the effective configuration
        #[arg(long)]
        validate: bool,
    },
}

#[derive(Args)]
struct ResearchArgs {
    /// Research topic or question
    topic: String,

    /// Sub-questions generated at the top level
    #[arg(short, long)]
    breadth: Option<usize>,

    /// Levels of follow-up research
    #[arg(short, long)]
    depth: Option<usize>,

    /// System prompt for the final report
    #[arg(long, conflicts_with = "instructions_file")]
    instructions: Option<String>,

    /// Read the report system prompt from a file
    #[arg(long)]
    instructions_file: Option<PathBuf>,

    /// Research agent to use instead of the configured default
    #[arg(long)]
    agent_id: Option<String>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> DelveResult<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_ref()).await?;
    config.apply_env_overrides();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    init_logging(&config.logging).map_err(|e| DelveError::Config {
        message: format!("Failed to initialize logging: {}", e),
        source: Some(e),
        context: ErrorContext::new("cli")
            .with_operation("init_logging")
            .with_suggestion("Check the [logging] section of the configuration"),
    })?;

    info!("Starting delve v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run(args) => handle_run(args, &config).await,
        Commands::Stream(args) => handle_stream(args, &config).await,
        Commands::Config {
            init,
            show,
            validate,
        } => handle_config(init, show, validate, &config).await,
    }
}

async fn load_config(config_path: Option<&PathBuf>) -> DelveResult<DelveConfig> {
    if let Some(path) = config_path {
        info!("Loading configuration from {:?}", path);
        return DelveConfig::from_file(path);
    }

    let default_paths = [
        dirs::config_dir().map(|d| d.join("delve").join("config.toml")),
        dirs::home_dir().map(|d| d.join(".delve").join("config.toml")),
        Some(PathBuf::from("delve.toml")),
    ];

    for path in default_paths.iter().flatten() {
        if path.exists() {
            info!("Loading configuration from {:?}", path);
            return DelveConfig::from_file(path);
        }
    }

    info!("No configuration file found, using defaults");
    Ok(DelveConfig::default())
}

async fn build_request(args: ResearchArgs, config: &DelveConfig) -> DelveResult<ResearchRequest> {
    let report_instructions = match (args.instructions, args.instructions_file) {
        (Some(text), _) => text,
        (None, Some(path)) => tokio::fs::read_to_string(&path).await?,
        (None, None) => config.research.report_instructions.clone(),
    };

    let mut request = ResearchRequest::new(args.topic, report_instructions)
        .breadth(args.breadth.unwrap_or(config.research.breadth))
        .depth(args.depth.unwrap_or(config.research.depth));
    request.agent_id = args.agent_id;

    if request.breadth == 0 || request.depth == 0 {
        return Err(DelveError::Config {
            message: "Breadth and depth must be at least 1".to_string(),
            source: None,
            context: ErrorContext::new("cli").with_operation("build_request"),
        });
    }
    Ok(request)
}

async fn handle_run(args: ResearchArgs, config: &DelveConfig) -> DelveResult<()> {
    config.validate()?;
    let json = args.json;
    let request = build_request(args, config).await?;

    log_operation_start!("run", topic = %request.topic);
    let engine = ResearchEngine::new(ResearchServices::from_config(config)?, config);

    let outcome = match engine.run(request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            log_operation_error!("run", e);
            return Err(e);
        }
    };
    log_operation_success!("run", learnings = outcome.learnings.len());

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.report);
    }

    for failure in &outcome.failures {
        warn!(query = %failure.query, "Branch failed: {}", failure.error);
    }
    Ok(())
}

async fn handle_stream(args: ResearchArgs, config: &DelveConfig) -> DelveResult<()> {
    config.validate()?;
    let json = args.json;
    let request = build_request(args, config).await?;

    log_operation_start!("stream", topic = %request.topic);
    let session = StreamingSession::new(ResearchServices::from_config(config)?, config);
    let mut events = session.start(request);

    let mut stdout = std::io::stdout();
    let mut failure = None;
    while let Some(event) = events.next().await {
        if let ResearchEvent::Failed { error } = &event {
            failure = Some(error.clone());
        }

        if json {
            writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
        } else if !event.is_done() {
            write!(stdout, "{}", event.render())?;
        }
        stdout.flush()?;
    }
    if !json {
        writeln!(stdout)?;
    }

    match failure {
        Some(message) => Err(DelveError::Internal {
            message: format!("Research session failed: {}", message),
            source: None,
            context: ErrorContext::new("cli").with_operation("stream"),
        }),
        None => {
            log_operation_success!("stream");
            Ok(())
        }
    }
}

async fn handle_config(
    init: bool,
    show: bool,
    validate: bool,
    config: &DelveConfig,
) -> DelveResult<()> {
    if init {
        let config_path = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|d| d.join(".config")))
            .map(|d| d.join("delve").join("config.toml"))
            .ok_or_else(|| DelveError::Config {
                message: "Could not determine a configuration directory".to_string(),
                source: None,
                context: ErrorContext::new("cli")
                    .with_operation("config_init")
                    .with_suggestion("Pass --config or create ./delve.toml by hand"),
            })?;
        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        DelveConfig::default().save_to_file(&config_path)?;
        println!("Configuration initialized at: {:?}", config_path);
    }

    if show {
        let mut shown = config.clone();
        if shown.llm.api_key.is_some() {
            shown.llm.api_key = Some("***".to_string());
        }
        if shown.agent.access_token.is_some() {
            shown.agent.access_token = Some("***".to_string());
        }
        let text = toml::to_string_pretty(&shown).map_err(|e| DelveError::Internal {
            message: format!("Failed to render configuration: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("cli").with_operation("config_show"),
        })?;
        println!("{}", text);
    }

    if validate {
        match config.validate() {
            Ok(()) => println!("Configuration is valid"),
            Err(e) => {
                println!("Configuration validation failed: {}", e);
                return Err(e);
            }
        }
    }

    Ok(())
}
