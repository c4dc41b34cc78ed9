//! `familiar` — a persistent embodied companion agent.

mod mcp_cmd;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use familiar_agent::EmbodiedAgent;
use familiar_config::locale::tr;
use familiar_config::{AgentConfig, Paths};
use familiar_desires::{DesireSystem, Desires};
use familiar_llm::create_backend;
use familiar_memory::ObservationStore;
use familiar_runtime::{input_channel, spawn_stdin_reader, ChatLog, ConsoleUi, Scheduler};
use familiar_tools::ToolRegistry;

#[derive(Debug, Parser)]
#[command(name = "familiar", version, about = "An embodied AI companion that lives alongside you")]
struct Cli {
    /// Verbose logging and the /desires debug command.
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Manage MCP server entries in the config file.
    Mcp {
        #[command(subcommand)]
        command: mcp_cmd::McpCommands,
    },
}

fn setup_logging(paths: &Paths, debug: bool) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    // File only: the terminal belongs to the conversation.
    std::fs::create_dir_all(&paths.cache_dir)?;
    let file = tracing_appender::rolling::never(&paths.cache_dir, "app.log");
    let (writer, guard) = tracing_appender::non_blocking(file);
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(writer)
        .with_ansi(false)
        .init();
    let debug_mode = debug;
    tracing::info!(debug_mode, "logging initialized");
    Ok(guard)
}

fn banner(config: &AgentConfig) -> String {
    let subtitle = tr(config.lang, "banner_subtitle");
    let commands = tr(config.lang, "repl_commands");
    format!(
        "╔══════════════════════════════════════╗\n\
         ║          Familiar AI  v{:<14}║\n\
         ╚══════════════════════════════════════╝\n\
         \x20 {subtitle}\n\
         \x20 {commands}\n",
        env!("CARGO_PKG_VERSION"),
    )
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let paths = Paths::resolve();

    if let Some(Commands::Mcp { command }) = cli.command {
        return mcp_cmd::run(&paths.mcp_config, command);
    }

    let config = AgentConfig::from_env();
    if !config.has_credentials() {
        eprintln!("Error: API_KEY not set.");
        eprintln!("  Set PLATFORM=anthropic|openai|gemini|kimi|cli and API_KEY=<your key>.");
        std::process::exit(1);
    }

    let _log_guard = setup_logging(&paths, cli.debug)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_agent(config, paths, cli.debug))
}

async fn run_agent(config: AgentConfig, paths: Paths, debug: bool) -> Result<()> {
    let memory = ObservationStore::new(&paths.memory_db);
    let desires = Desires::new(DesireSystem::new(&paths.desires_file));
    let backend = create_backend(&config);
    let registry = Arc::new(ToolRegistry::from_config(&config, &paths, memory.clone()));
    let agent = EmbodiedAgent::new(
        config.clone(),
        paths.clone(),
        backend,
        registry,
        memory,
        desires.clone(),
    );

    println!("{}", banner(&config));

    let (tx, rx) = input_channel();
    let reader = spawn_stdin_reader(tx);

    let ui = Arc::new(ConsoleUi::new(config.lang));
    let chat_log = ChatLog::open(&paths.chat_log);
    let mut scheduler = Scheduler::new(
        agent,
        desires,
        config.lang,
        config.companion_name.clone(),
        debug,
        ui,
        chat_log,
        rx,
    );
    let result = scheduler.run().await;

    reader.abort();
    result
}
