use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use dojo_lib::config::DojoConfig;
use dojo_lib::ledger::LedgerStorage;
use dojo_lib::llm::HttpGenerativeClient;
use dojo_lib::ratelimit::RateLimiter;
use dojo_lib::schedule::ScheduleStorage;
use dojo_lib::server::{start_server, ServerState};
use dojo_lib::session::PhaseController;
use dojo_lib::storage;

#[derive(Parser)]
#[command(name = "dojo", about = "AI-guided daily conversational training", version)]
struct Cli {
    /// Use a specific data directory (default: platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the training server (default)
    Serve {
        /// Bind address
        #[arg(long)]
        host: Option<String>,
        /// Bind port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print the training status report
    Status {
        /// How many recent sessions to include
        #[arg(long, default_value_t = 7)]
        last: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = DojoConfig::load();

    let data_dir = match cli.data_dir.or_else(|| config.data_dir.clone()) {
        Some(dir) => dir,
        None => storage::default_data_dir().context("Failed to resolve data directory")?,
    };

    let ledger = LedgerStorage::new(data_dir.clone()).context("Failed to open ledger")?;
    let schedule = ScheduleStorage::new(data_dir).context("Failed to open review schedule")?;

    match cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    }) {
        Command::Status { last } => {
            let client = Arc::new(
                HttpGenerativeClient::new(
                    config.llm.base_url.clone(),
                    config.llm.api_key.clone(),
                    config.llm.model.clone(),
                )
                .context("Failed to build generative client")?,
            );
            let controller = PhaseController::new(ledger, schedule, client);
            let report = controller.status(last);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Serve { host, port } => {
            let client = Arc::new(
                HttpGenerativeClient::new(
                    config.llm.base_url.clone(),
                    config.llm.api_key.clone(),
                    config.llm.model.clone(),
                )
                .context("Failed to build generative client")?,
            );
            let controller = PhaseController::new(ledger, schedule, client);

            let state = Arc::new(ServerState {
                controller,
                limiter: RateLimiter::new(),
                api_key: config.api_key.clone(),
            });

            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let mut server = start_server(state, &host, port)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to start server: {}", e))?;

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;
            server.stop();
        }
    }

    Ok(())
}
