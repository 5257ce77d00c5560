//! CLI binary for the reqflow requirements pipeline.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use reqflow_agent::{ConversationAgent, InMemoryStore, ToolDriver};
use reqflow_llm::{Capabilities, LlmClient};
use reqflow_pipeline::{
    handle_line, Orchestrator, PipelineInput, ReqflowConfig, SessionRegistry, ToolRegistry,
};
use reqflow_server::{AppState, SqliteStore};
use reqflow_types::PipelineResult;

#[derive(Parser)]
#[command(name = "reqflow", version, about = "Requirements analysis pipeline and chat assistant")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON rule file replacing the baseline dictionaries
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    /// Never call the LLM, even when GEMINI_API_KEY is set
    #[arg(long, global = true)]
    no_llm: bool,

    /// Upper bound for a single LLM call, in seconds
    #[arg(long, global = true)]
    llm_timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline over a requirements document
    Run {
        /// Input file (reads stdin when omitted)
        input: Option<PathBuf>,

        /// Project id recorded in the result
        #[arg(short, long, default_value = "default")]
        project: String,

        /// What to print
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract and analyze stories without building requirements
    Analyze {
        /// Input file (reads stdin when omitted)
        input: Option<PathBuf>,
    },

    /// Interactive chat with the requirements assistant
    Chat,

    /// Start the HTTP and WebSocket server
    Serve {
        #[arg(long, default_value = "127.0.0.1:8000")]
        addr: SocketAddr,

        /// SQLite database URL for conversations
        #[arg(long, default_value = "sqlite:reqflow.db")]
        database: String,
    },

    /// Answer newline-delimited `{id, method, params}` requests on stdin
    Rpc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Markdown,
    Csv,
    Mermaid,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing; RUST_LOG wins over the flag. Logs go to stderr so
    // stdout stays clean for reports and rpc replies.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = build_config(&cli);
    let llm = if cli.no_llm {
        None
    } else {
        match LlmClient::from_env() {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::info!("LLM disabled: {}", e);
                None
            }
        }
    };
    let capabilities = match &llm {
        Some(client) => Capabilities::from_client(client.clone()),
        None => Capabilities::none(),
    };
    let orchestrator = Orchestrator::new(config, capabilities)?;

    match cli.command {
        Commands::Run {
            input,
            project,
            format,
            output,
        } => {
            cmd_run(&orchestrator, input.as_deref(), project, format, output.as_deref()).await?;
        }
        Commands::Analyze { input } => {
            cmd_analyze(&orchestrator, input.as_deref()).await?;
        }
        Commands::Chat => {
            cmd_chat(orchestrator, llm).await?;
        }
        Commands::Serve { addr, database } => {
            cmd_serve(orchestrator, llm, addr, &database).await?;
        }
        Commands::Rpc => {
            cmd_rpc(&orchestrator).await?;
        }
    }

    Ok(())
}

fn build_config(cli: &Cli) -> ReqflowConfig {
    let mut config = ReqflowConfig::from_env();
    if let Some(rules) = &cli.rules {
        config.rules_path = Some(rules.clone());
    }
    if let Some(secs) = cli.llm_timeout {
        config.llm_timeout = Duration::from_secs(secs);
    }
    if cli.no_llm {
        config.use_llm_suggestions = false;
    }
    config
}

async fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(p) => tokio::fs::read_to_string(p)
            .await
            .with_context(|| format!("reading {}", p.display())),
        None => {
            let mut text = String::new();
            tokio::io::stdin().read_to_string(&mut text).await?;
            Ok(text)
        }
    }
}

fn render(result: &PipelineResult, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Markdown => result.report.markdown.clone(),
        OutputFormat::Csv => result.report.csv.clone(),
        OutputFormat::Mermaid => result.report.mermaid.clone(),
        OutputFormat::Json => serde_json::to_string_pretty(result)?,
    })
}

async fn cmd_run(
    orchestrator: &Orchestrator,
    input: Option<&Path>,
    project: String,
    format: OutputFormat,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let text = read_input(input).await?;
    let result = orchestrator
        .run_pipeline(PipelineInput::from_text(text, project))
        .await
        .map_err(|failure| anyhow::anyhow!(failure.describe()))?;

    for problem in &result.validation {
        eprintln!("[WARN] {}", problem);
    }

    let rendered = render(&result, format)?;
    match output {
        Some(path) => {
            tokio::fs::write(path, rendered).await?;
            eprintln!(
                "{} requirements written to {}",
                result.prioritized.len(),
                path.display()
            );
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

async fn cmd_analyze(orchestrator: &Orchestrator, input: Option<&Path>) -> anyhow::Result<()> {
    let text = read_input(input).await?;
    let (chunks, stories) = orchestrator.collect(&text);
    let report = orchestrator.analyze(&stories).await?;

    println!("Chunks: {}", chunks.len());
    println!("Stories: {}", report.summary.total_stories);
    println!("Issues: {}", report.summary.total_issues);
    for issue in &report.analysis.issues {
        println!(
            "  [{}] {}",
            issue.severity.as_str().to_uppercase(),
            issue.description
        );
    }
    for suggestion in &report.analysis.suggestions {
        println!("  -> {}", suggestion.description);
    }
    Ok(())
}

async fn cmd_chat(orchestrator: Orchestrator, llm: Option<Arc<LlmClient>>) -> anyhow::Result<()> {
    let sessions = SessionRegistry::new();
    let (session_id, artifacts) = sessions.create();
    let max_rounds = orchestrator.config().max_tool_iterations;
    let llm_timeout = orchestrator.config().llm_timeout;

    let mut agent = ConversationAgent::new(
        session_id,
        orchestrator,
        Arc::new(InMemoryStore::new()),
        artifacts,
    );
    if let Some(client) = llm {
        agent = agent.with_driver(
            ToolDriver::new(client, ToolRegistry::with_defaults(), max_rounds)
                .with_request_timeout(llm_timeout),
        );
    }

    println!("Requirements Assistant. Type /help for commands, Ctrl-D to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        println!("{}\n", agent.handle_message(&line).await);
    }
    Ok(())
}

async fn cmd_serve(
    orchestrator: Orchestrator,
    llm: Option<Arc<LlmClient>>,
    addr: SocketAddr,
    database: &str,
) -> anyhow::Result<()> {
    let store = SqliteStore::connect(database).await?;
    tracing::info!(database, "Conversation store ready");

    let mut state = AppState::new(orchestrator, Arc::new(store));
    if let Some(client) = llm {
        state = state.with_llm(client);
    }
    reqflow_server::serve(addr, state).await
}

async fn cmd_rpc(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(orchestrator, &line).await;
        println!("{}", serde_json::to_string(&response)?);
    }
    Ok(())
}
