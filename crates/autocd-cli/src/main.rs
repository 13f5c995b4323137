//! autocd CLI tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "autocd")]
#[command(about = "autocd webhook runner CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a server configuration file
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "config.kdl")]
        path: PathBuf,
    },
    /// Compute the X-Hub-Signature-256 value for a payload
    Sign {
        /// Webhook secret
        #[arg(long, env = "AUTOCD_WEBHOOK_SECRET", hide_env_values = true)]
        secret: String,
        /// Payload file (stdin when omitted)
        file: Option<PathBuf>,
    },
    /// Run a script once through the executor
    Exec {
        /// Script name inside the scripts directory
        script: String,
        /// Configuration file providing scripts directory, shell and limits
        #[arg(long)]
        config: Option<PathBuf>,
        /// Extra environment variables
        #[arg(short = 'e', long = "env", value_name = "KEY=VALUE", value_parser = parse_env)]
        env: Vec<(String, String)>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect and stop live runs on a server
    Runs {
        /// API server URL
        #[arg(long, env = "AUTOCD_API_URL", default_value = "http://localhost:8080")]
        api_url: String,
        /// Operator token
        #[arg(long, env = "AUTOCD_ADMIN_TOKEN", hide_env_values = true)]
        token: String,

        #[command(subcommand)]
        command: RunCommands,
    },
}

#[derive(Subcommand)]
enum RunCommands {
    /// List live runs
    List,
    /// Stop every live run of a script
    Stop {
        /// Script (event) name
        event: String,
    },
    /// Stop every live run
    StopAll,
}

fn parse_env(pair: &str) -> Result<(String, String), String> {
    autocd_core::executor::parse_env_pair(pair).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
        Commands::Sign { secret, file } => {
            commands::sign::run(&secret, file.as_deref())?;
        }
        Commands::Exec {
            script,
            config,
            env,
            json,
        } => {
            let code = commands::exec::run(&script, config.as_deref(), env, json).await?;
            std::process::exit(code);
        }
        Commands::Runs {
            api_url,
            token,
            command,
        } => {
            let client = commands::runs::OperatorClient::new(&api_url, &token)?;
            match command {
                RunCommands::List => commands::runs::list(&client).await?,
                RunCommands::Stop { event } => commands::runs::stop(&client, &event).await?,
                RunCommands::StopAll => commands::runs::stop_all(&client).await?,
            }
        }
    }

    Ok(())
}
