//! Hearth CLI: the main entry point.
//!
//! Commands:
//! - `chat`:      Interactive chat or single-message mode
//! - `tools`:     List, enable or disable tools
//! - `run-tool`:  Execute one tool and print its result
//! - `jobs`:      Show registered workers and jobs
//! - `status`:    Show the effective configuration

use clap::{Parser, Subcommand};
use hearth_config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(name = "hearth", about = "Hearth, a personal assistant backend", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Conversation to continue
        #[arg(long, default_value = "cli")]
        conversation: String,

        /// User the messages belong to
        #[arg(long, env = "HEARTH_USER", default_value = "local")]
        user: String,
    },

    /// Manage tools
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },

    /// Execute a tool directly
    RunTool {
        /// Tool name
        name: String,

        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,

        /// User the call runs as
        #[arg(long, env = "HEARTH_USER", default_value = "local")]
        user: String,
    },

    /// Show workers and jobs
    Jobs,

    /// Show system status
    Status,
}

#[derive(Subcommand)]
enum ToolsAction {
    /// List every tool with its state
    List,
    /// Enable a tool
    Enable { name: String },
    /// Disable a tool
    Disable { name: String },
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    match cli.command {
        Commands::Chat {
            message,
            conversation,
            user,
        } => commands::chat::run(&config, message, conversation, user).await?,
        Commands::Tools { action } => match action {
            ToolsAction::List => commands::tools::list(&config).await?,
            ToolsAction::Enable { name } => {
                commands::tools::set_enabled(&config, &name, true).await?
            }
            ToolsAction::Disable { name } => {
                commands::tools::set_enabled(&config, &name, false).await?
            }
        },
        Commands::RunTool { name, args, user } => {
            commands::run_tool::run(&config, &name, &args, &user).await?
        }
        Commands::Jobs => commands::jobs::run(&config).await?,
        Commands::Status => commands::status::run(&config).await?,
    }

    Ok(())
}
