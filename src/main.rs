use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gsearch::config::{self, AppConfig, ConfigError};
use gsearch::grounding::{DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE, ExecutorError};
use gsearch::{
    AdmissionController, Citation, GeminiClientBuilder, GroundedQueryExecutorBuilder,
    GroundedResult, QueryError, SearchService, SessionId, SessionRegistry,
};
use time::OffsetDateTime;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// gsearch - answers grounded in live web search
#[derive(Parser)]
#[command(name = "gsearch")]
#[command(about = "Ask a question and get an answer grounded in live web search")]
#[command(version)]
struct Cli {
    /// Print debug logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Calls allowed per session within the rate window (overrides GSEARCH_MAX_CALLS)
    #[arg(long, global = true, value_name = "N")]
    max_calls: Option<u32>,

    /// Length of the sliding rate window in seconds (overrides GSEARCH_WINDOW_SECS)
    #[arg(long, global = true, value_name = "SECS")]
    window_secs: Option<u64>,

    /// Model name (overrides GEMINI_MODEL)
    #[arg(long, global = true, value_name = "MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Ask a single question
    Ask(AskCommand),
    /// Ask questions interactively, one per line
    Chat(ChatCommand),
}

/// Options shaping each model request
#[derive(Args, Clone)]
struct RequestArgs {
    /// Model temperature (0.0 to 1.0)
    #[arg(long = "temp", value_name = "TEMP", default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f64,

    /// Disable Google Search grounding
    #[arg(long)]
    no_grounding: bool,

    /// System instruction sent with every query
    #[arg(long, value_name = "PROMPT")]
    system_prompt: Option<String>,
}

/// Ask a single question
#[derive(Parser)]
struct AskCommand {
    /// The question to send to the model
    #[arg(value_name = "QUERY")]
    query: String,

    #[command(flatten)]
    request: RequestArgs,
}

/// Interactive question loop
#[derive(Parser)]
struct ChatCommand {
    /// Session identifier used for rate limiting; generated if omitted
    #[arg(long, value_name = "ID")]
    session: Option<String>,

    #[command(flatten)]
    request: RequestArgs,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli) {
        // Determine exit code based on error type
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

/// Installs the stderr log subscriber. `--verbose` wins over `RUST_LOG`.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("gsearch=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let loaded = config::load_dotenv_files();
    let mut app_config = AppConfig::from_env().context("Failed to load configuration")?;

    if let Some(max_calls) = cli.max_calls {
        app_config.max_calls_per_window = max_calls;
    }
    if let Some(window_secs) = cli.window_secs {
        app_config.window_secs = window_secs;
    }
    if let Some(model) = &cli.model {
        app_config.model = model.clone();
    }
    debug!(config = ?app_config, dotenv_files = ?loaded, "Configuration loaded");

    match &cli.command {
        Commands::Ask(cmd) => handle_ask(&app_config, cmd),
        Commands::Chat(cmd) => handle_chat(&app_config, cmd),
    }
}

/// Determines if an error is a user error (vs internal error).
///
/// User errors are ones the user can fix by changing input, configuration or
/// waiting: bad queries, rate limiting, credentials and settings.
fn is_user_error(error: &anyhow::Error) -> bool {
    if let Some(query_error) = error.downcast_ref::<QueryError>() {
        return matches!(
            query_error,
            QueryError::InvalidQuery(_)
                | QueryError::RateLimited { .. }
                | QueryError::AuthError(_)
                | QueryError::ConfigurationError(_)
        );
    }
    error.downcast_ref::<ConfigError>().is_some() || error.downcast_ref::<ExecutorError>().is_some()
}

/// Builds the search service from configuration and request options.
fn build_service(app_config: &AppConfig, request: &RequestArgs) -> Result<SearchService> {
    let policy = app_config.policy()?;

    let mut client_builder = GeminiClientBuilder::new()
        .base_url(&app_config.base_url)
        .model(&app_config.model)
        .timeout(app_config.timeout());
    if let Some(api_key) = &app_config.api_key {
        client_builder = client_builder.api_key(api_key);
    }
    let client = client_builder
        .build()
        .context("Failed to create Gemini client")?;

    let executor = GroundedQueryExecutorBuilder::new()
        .client(Arc::new(client))
        .temperature(request.temperature)
        .grounding(!request.no_grounding)
        .system_prompt(
            request
                .system_prompt
                .as_deref()
                .unwrap_or(DEFAULT_SYSTEM_PROMPT),
        )
        .build()?;

    let registry = SessionRegistry::new(AdmissionController::new(policy));
    Ok(SearchService::new(registry, executor))
}

/// Handles the ask command: one admission check and one query.
fn handle_ask(app_config: &AppConfig, cmd: &AskCommand) -> Result<()> {
    let service = build_service(app_config, &cmd.request)?;
    let session = process_session_id();

    let result = service.search(&session, &cmd.query)?;

    let mut out = io::stdout().lock();
    writeln!(out, "--- AI Search Results ---")?;
    writeln!(out, "{}", render_result(&result))?;
    Ok(())
}

/// Handles the chat command: one session for the whole loop.
fn handle_chat(app_config: &AppConfig, cmd: &ChatCommand) -> Result<()> {
    let service = build_service(app_config, &cmd.request)?;
    let session = cmd
        .session
        .as_deref()
        .map(SessionId::from)
        .unwrap_or_else(process_session_id);

    chat_loop(
        &service,
        &session,
        io::stdin().lock(),
        &mut io::stdout().lock(),
        &mut io::stderr().lock(),
    )
}

/// Reads queries line by line until EOF, `exit` or `quit`.
///
/// Query failures are reported on `err` and the loop continues; retrying is
/// left to the user.
fn chat_loop<R, W, E>(
    service: &SearchService,
    session: &SessionId,
    input: R,
    out: &mut W,
    err: &mut E,
) -> Result<()>
where
    R: BufRead,
    W: Write,
    E: Write,
{
    write!(out, "> ")?;
    out.flush()?;

    for line in input.lines() {
        let line = line.context("Failed to read input")?;
        match line.trim() {
            "" => {}
            "exit" | "quit" => break,
            query => match service.search(session, query) {
                Ok(result) => writeln!(out, "{}\n", render_result(&result))?,
                Err(e) => {
                    writeln!(err, "Error: {e}")?;
                    if e.is_retryable() && !matches!(e, QueryError::RateLimited { .. }) {
                        writeln!(err, "This may be temporary; ask again to retry.")?;
                    }
                }
            },
        }
        write!(out, "> ")?;
        out.flush()?;
    }

    writeln!(out)?;
    Ok(())
}

/// Session identifier for a single process invocation.
fn process_session_id() -> SessionId {
    SessionId::new(format!(
        "cli-{}-{}",
        std::process::id(),
        OffsetDateTime::now_utc().unix_timestamp()
    ))
}

/// Formats an answer followed by its sources section.
fn render_result(result: &GroundedResult) -> String {
    format!("{}{}", result.answer_text(), format_sources(result.citations()))
}

/// Formats citations as a "Sources" section, or an empty string if there are none.
fn format_sources(citations: &[Citation]) -> String {
    if citations.is_empty() {
        return String::new();
    }

    let lines: Vec<String> = citations
        .iter()
        .map(|citation| {
            let domain = citation
                .domain()
                .unwrap_or_else(|| citation.source_url().to_string());
            format!("- {}\n  (Source: {})", citation.source_title(), domain)
        })
        .collect();

    format!("\n\n--- Sources ---\n{}", lines.join("\n"))
}
