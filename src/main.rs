use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::time::Duration;
use yieldfetch::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for yieldfetch::AppCommand {
    fn from(cmd: Commands) -> yieldfetch::AppCommand {
        match cmd {
            Commands::Fetch { protocol } => yieldfetch::AppCommand::Fetch { protocol },
            Commands::Batch { protocols, json } => {
                yieldfetch::AppCommand::Batch { protocols, json }
            }
            Commands::Watch {
                protocols,
                interval,
                rounds,
            } => yieldfetch::AppCommand::Watch {
                protocols,
                interval: Duration::from_secs(interval),
                rounds,
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Fetch the yield of a single protocol
    Fetch {
        /// Protocol id, e.g. lido or aave-v3
        protocol: String,
    },
    /// Fetch several protocols at once
    Batch {
        /// Comma-separated protocol ids (default: all)
        #[arg(short, long)]
        protocols: Option<String>,

        /// Print the batch response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Repeatedly fetch protocols and report cache and fallback metrics
    Watch {
        /// Comma-separated protocol ids (default: all)
        #[arg(short, long)]
        protocols: Option<String>,

        /// Seconds between rounds
        #[arg(short, long, default_value_t = 60)]
        interval: u64,

        /// Stop after this many rounds
        #[arg(short, long)]
        rounds: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => yieldfetch::cli::setup::setup_at_path(path),
            None => yieldfetch::cli::setup::setup(),
        },
        Some(cmd) => yieldfetch::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
