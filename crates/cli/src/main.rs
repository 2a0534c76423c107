//! agentgw CLI — the main entry point.
//!
//! Commands:
//! - `serve`    — Start the daemon (gateway + scheduler + webhooks)
//! - `chat`     — Interactive streaming chat with a skill
//! - `run`      — One-shot run, prints the result
//! - `route`    — Ask the planner which skill fits a message
//! - `ingest`   — Add text or a file to the knowledge base
//! - `skills`   — List loaded skills
//! - `sessions` — List recent sessions
//! - `status`   — Show service status

use clap::{Parser, Subcommand};

mod commands;

/// Exit code for startup failures (bad config, port in use).
const EXIT_STARTUP: i32 = 1;
/// Exit code when the startup probe cannot reach the provider.
const EXIT_PROVIDER_UNREACHABLE: i32 = 2;

#[derive(Parser)]
#[command(name = "agentgw", about = "agentgw — local agent-orchestration daemon", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the settings file
    #[arg(long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon
    Serve {
        /// Override the bind host
        #[arg(long)]
        host: Option<String>,

        /// Override the bind port
        #[arg(short, long)]
        port: Option<u16>,

        /// Disable the cron scheduler
        #[arg(long)]
        no_scheduler: bool,

        /// Probe the LLM provider before serving
        #[arg(long)]
        probe: bool,
    },

    /// Chat with a skill, streaming output
    Chat {
        /// Skill to chat with
        #[arg(short, long)]
        skill: String,

        /// Resume an existing session
        #[arg(long)]
        session: Option<String>,
    },

    /// Run a single message to completion
    Run {
        #[arg(short, long)]
        skill: String,

        #[arg(short, long)]
        message: String,

        #[arg(long)]
        session: Option<String>,
    },

    /// Route a message to the best skill
    Route {
        #[arg(short, long)]
        message: String,
    },

    /// Ingest text into the knowledge base
    Ingest {
        /// Read content from a file
        #[arg(short, long)]
        file: Option<String>,

        /// Inline text (alternative to --file)
        #[arg(short, long)]
        text: Option<String>,

        /// Source identifier
        #[arg(short, long)]
        source: Option<String>,

        /// Comma-separated skill names allowed to retrieve this content
        #[arg(long)]
        skills: Option<String>,

        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,

        /// Target collection
        #[arg(long, default_value = "default")]
        collection: String,
    },

    /// List loaded skills
    Skills,

    /// List recent sessions
    Sessions {
        #[arg(long)]
        skill: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show service status
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match commands::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(EXIT_STARTUP);
        }
    };

    let result = match cli.command {
        Commands::Serve {
            host,
            port,
            no_scheduler,
            probe,
        } => commands::serve::run(config, host, port, no_scheduler, probe).await,
        Commands::Chat { skill, session } => commands::chat::run(config, skill, session).await,
        Commands::Run {
            skill,
            message,
            session,
        } => commands::run::run(config, skill, message, session).await,
        Commands::Route { message } => commands::route::run(config, message).await,
        Commands::Ingest {
            file,
            text,
            source,
            skills,
            tags,
            collection,
        } => commands::ingest::run(config, file, text, source, skills, tags, collection).await,
        Commands::Skills => commands::skills::run(config).await,
        Commands::Sessions { skill, limit } => commands::sessions::run(config, skill, limit).await,
        Commands::Status => commands::status::run(config).await,
    };

    match result {
        Ok(()) => {}
        Err(commands::CliError::ProviderUnreachable(e)) => {
            eprintln!("Provider unreachable: {e}");
            std::process::exit(EXIT_PROVIDER_UNREACHABLE);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(EXIT_STARTUP);
        }
    }
}
