use clap::{Parser, Subcommand};
use locago::agent::AgentRunner;
use locago::config::{load_or_default, resolve_config_path};
use locago::server::ServerRunner;
use locago::signals::spawn_shutdown_listener;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "Usage: locago [proxy|server] host:port";

#[derive(Parser)]
#[command(name = "locago")]
#[command(about = "Container log shipping and ingestion", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect container output on this host and ship it to a server
    Proxy {
        /// Server address to ship to
        addr: String,
    },
    /// Accept shipped records and store them in the backend
    Server {
        /// Address to listen on
        addr: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(_) => {
            eprintln!("{}", USAGE);
            return ExitCode::from(1);
        }
    };

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "locago=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = resolve_config_path(cli.config.as_deref());
    if let Some(path) = &config_path {
        info!(config_path = %path.display(), "Loading configuration");
    }

    let config = match load_or_default(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Fatal error: {}", e);
            return ExitCode::from(1);
        }
    };

    let shutdown = CancellationToken::new();
    let _signals = spawn_shutdown_listener(shutdown.clone());

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Commands::Proxy { addr } => AgentRunner::new(config, addr)
            .run(shutdown)
            .await
            .map_err(Into::into),
        Commands::Server { addr } => ServerRunner::new(config, addr)
            .run(shutdown)
            .await
            .map_err(Into::into),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Fatal error: {}", e);
            ExitCode::from(1)
        }
    }
}
