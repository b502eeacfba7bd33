//! Arena CLI - submit and watch multi-model Arabic evaluations
//!
//! Thin terminal front end over `arena-core`. The session controller owns
//! every transport decision; this binary only parses arguments, prints
//! snapshots and maps Ctrl-C to a reset.
//!
//! # Usage
//!
//! ```bash
//! # Run an evaluation, streaming if the backend allows it
//! arena run "اشرح مفهوم الحوسبة السحابية" --model gpt-4o --model jais-30b-chat
//!
//! # Force polling and print the raw result
//! arena run "..." --model a --model b --no-stream --json
//!
//! # Inspect the backend
//! arena get 3f2c...
//! arena list --dialect gulf --status completed
//! arena models
//! arena health
//!
//! # Verbose logging
//! RUST_LOG=arena_core=debug arena run ...
//! ```

mod render;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_stream::StreamExt;
use tracing::{debug, info};

use arena_core::{
    default_config_path, load_unvalidated_config_from_path, ArenaConfig, ConfigOverrides, Dialect,
    EvalCategory, EvalStatus, EvaluationApi, EvaluationRequest, HttpEvaluationApi, ListQuery,
    SessionController, SessionStatus,
};

use render::ProgressTracker;

/// Arena - compare LLM answers to Arabic prompts
#[derive(Parser, Debug)]
#[command(name = "arena")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long, env = "ARENA_CONFIG", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// REST base URL, e.g. http://localhost:8000
    #[arg(long, value_name = "URL", global = true)]
    api_url: Option<String>,

    /// Socket base URL, e.g. ws://localhost:8000
    #[arg(long, value_name = "URL", global = true)]
    ws_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "ARENA_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit an evaluation and wait for its result
    Run(RunArgs),
    /// Show one stored evaluation
    Get {
        /// Evaluation id
        id: String,
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },
    /// List past evaluations
    List {
        /// 1-based page
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Rows per page
        #[arg(long, default_value_t = 20)]
        page_size: u32,
        /// Only this dialect
        #[arg(long)]
        dialect: Option<Dialect>,
        /// Only this status
        #[arg(long)]
        status: Option<EvalStatus>,
    },
    /// List models the backend can evaluate
    Models,
    /// Probe backend health
    Health,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Prompt text
    prompt: String,

    /// Dialect the answers should use
    #[arg(short = 'd', long, default_value = "msa")]
    dialect: Dialect,

    /// Evaluation category
    #[arg(short = 'k', long, default_value = "reasoning")]
    category: EvalCategory,

    /// Model id; repeat for each model (2 to 6)
    #[arg(short = 'm', long = "model", value_name = "ID", required = true)]
    models: Vec<String>,

    /// Output token budget per model
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Reference answer for the judge
    #[arg(long)]
    reference: Option<String>,

    /// Skip the socket and poll the REST API
    #[arg(long)]
    no_stream: bool,

    /// Milliseconds between status checks
    #[arg(long, value_name = "MS")]
    poll_interval_ms: Option<u64>,

    /// Status checks before giving up
    #[arg(long, value_name = "N")]
    max_polls: Option<u32>,

    /// Print the finished evaluation as JSON
    #[arg(long)]
    json: bool,
}

/// Initialize logging on stderr so stdout stays clean for results
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("arena={level},arena_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

async fn resolve_config(cli: &Cli, run: Option<&RunArgs>) -> Result<ArenaConfig> {
    let path = cli.config.clone().or_else(default_config_path);
    // Validated once below, after the command-line overrides
    let mut config = load_unvalidated_config_from_path(path)
        .await
        .context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(url) = &cli.api_url {
        overrides = overrides.with_api_base_url(url.clone());
    }
    if let Some(url) = &cli.ws_url {
        overrides = overrides.with_ws_base_url(url.clone());
    }
    if let Some(run) = run {
        if run.no_stream {
            overrides = overrides.with_streaming_enabled(false);
        }
        if let Some(ms) = run.poll_interval_ms {
            overrides = overrides.with_poll_interval_ms(ms);
        }
        if let Some(attempts) = run.max_polls {
            overrides = overrides.with_max_poll_attempts(attempts);
        }
    }
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    debug!(
        source = %config.source(),
        api = %config.api_base_url,
        streaming = config.streaming_enabled,
        "Configuration resolved"
    );
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match &cli.command {
        Command::Run(args) => {
            let config = resolve_config(&cli, Some(args)).await?;
            run_evaluation(&config, args).await
        }
        Command::Get { id, json } => {
            let api = http_api(&resolve_config(&cli, None).await?)?;
            let evaluation = api
                .fetch_evaluation(id)
                .await
                .with_context(|| format!("Failed to fetch evaluation {id}"))?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&evaluation)?);
            } else {
                print!("{}", render::evaluation_report(&evaluation));
            }
            Ok(())
        }
        Command::List {
            page,
            page_size,
            dialect,
            status,
        } => {
            let api = http_api(&resolve_config(&cli, None).await?)?;
            let query = ListQuery {
                page: *page,
                page_size: *page_size,
                dialect: *dialect,
                status: *status,
            };
            let listing = api
                .list_evaluations(&query)
                .await
                .context("Failed to list evaluations")?;
            print!("{}", render::history_table(&listing));
            Ok(())
        }
        Command::Models => {
            let api = http_api(&resolve_config(&cli, None).await?)?;
            let models = api.list_models().await.context("Failed to list models")?;
            print!("{}", render::models_table(&models));
            Ok(())
        }
        Command::Health => {
            let api = http_api(&resolve_config(&cli, None).await?)?;
            let health = api.health().await.context("Health check failed")?;
            println!("{}", render::health_line(&health));
            Ok(())
        }
    }
}

fn http_api(config: &ArenaConfig) -> Result<HttpEvaluationApi> {
    HttpEvaluationApi::from_config(config).context("Failed to build HTTP client")
}

async fn run_evaluation(config: &ArenaConfig, args: &RunArgs) -> Result<()> {
    let mut request = EvaluationRequest::new(
        args.prompt.clone(),
        args.dialect,
        args.category,
        args.models.iter().cloned(),
    );
    if let Some(max_tokens) = args.max_tokens {
        request = request.with_max_tokens(max_tokens);
    }
    if let Some(reference) = &args.reference {
        request = request.with_reference_answer(reference.clone());
    }
    request.validate().context("Invalid evaluation request")?;

    let controller = SessionController::from_config(config).context("Failed to start session")?;
    info!(
        models = request.models.len(),
        dialect = %request.dialect,
        streaming = controller.streaming_available(),
        "Submitting evaluation"
    );

    let progress = tokio::spawn(print_progress(controller.clone()));

    let session = tokio::select! {
        result = controller.submit(request) => result?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            controller.reset().await?;
            progress.abort();
            anyhow::bail!("Evaluation cancelled");
        }
    };
    progress.abort();

    match session.status() {
        SessionStatus::Completed => {
            let evaluation = session
                .evaluation()
                .context("Completed session carries no evaluation")?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(evaluation)?);
            } else {
                print!("{}", render::evaluation_report(evaluation));
            }
            Ok(())
        }
        SessionStatus::Failed => {
            anyhow::bail!(
                "Evaluation failed: {}",
                session.error().unwrap_or("unknown error")
            )
        }
        other => anyhow::bail!("Evaluation ended unexpectedly in state {other}"),
    }
}

async fn print_progress(controller: SessionController) {
    let mut tracker = ProgressTracker::default();
    let mut updates = controller.updates();
    while let Some(session) = updates.next().await {
        for line in tracker.observe(&session) {
            eprintln!("{line}");
        }
    }
}
