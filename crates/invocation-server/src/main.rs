//! Invocation Server Binary
//!
//! `invocation-server server start` binds an ephemeral port, prints the
//! startup announcement on stdout and serves until `/shutdown`.

use clap::{Parser, Subcommand};
use std::io;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

use invocation_server::{lifecycle, ServerConfig, ServerError};

#[derive(Parser)]
#[command(name = "invocation-server", version, about = "Signed capability invocation test server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Server commands
    Server {
        #[command(subcommand)]
        command: ServerCommand,
    },
}

#[derive(Subcommand)]
enum ServerCommand {
    /// Start the server and announce its identity and URL
    Start {
        /// Port to bind (default: OS-assigned)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let cli = Cli::parse();
    let config = ServerConfig::from_env()?;

    // stdout is reserved for the announcement
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).map_err(|e| ServerError::Logging(e.to_string()))?;

    match cli.command {
        Command::Server {
            command: ServerCommand::Start { port },
        } => {
            let config = match port {
                Some(port) => config.with_port(port),
                None => config,
            };
            run(config).await
        }
    }
}

async fn run(config: ServerConfig) -> Result<(), ServerError> {
    info!(
        addr = %config.bind_addr(),
        grace_ms = config.shutdown_grace.as_millis() as u64,
        "Starting invocation server"
    );

    let running = lifecycle::start(&config).await?;
    running.announce(&mut io::stdout())?;
    running.wait().await
}
