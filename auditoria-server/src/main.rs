//! # auditoria
//!
//! Audit trail pipeline: an HTTP gateway publishing user actions to an event
//! bus, and a worker persisting every consumed event to a cache and to object
//! storage.

use std::path::PathBuf;

use anyhow::Context;
use auditoria_server::infra::{
    config::{Config, ConfigLoad, ConfigLoader, ConfigLoaderOptions},
    runner,
};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "auditoria")]
#[command(about = "Audit event gateway and persistence worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    args: GlobalArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct GlobalArgs {
    /// Path to auditoria.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to a .env file (defaults to ./.env when present)
    #[arg(long, global = true, env = "AUDITORIA_ENV_FILE")]
    env_file: Option<PathBuf>,

    /// HTTP port (overrides config)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// HTTP host (overrides config)
    #[arg(long, global = true)]
    host: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Accept actions over HTTP and publish them to the event bus
    Gateway,
    /// Consume the audit topic and persist every event
    Worker,
    /// Run gateway and worker in one process over an in-memory bus
    Standalone,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_runtime_config(&cli.args)?;

    let shutdown = CancellationToken::new();
    runner::spawn_ctrl_c(shutdown.clone());

    match cli.command {
        Command::Gateway => runner::run_gateway(&config, shutdown).await,
        Command::Worker => runner::run_worker(&config, shutdown).await,
        Command::Standalone => runner::run_standalone(&config, shutdown).await,
    }
}

fn load_runtime_config(args: &GlobalArgs) -> anyhow::Result<Config> {
    let ConfigLoad {
        mut config,
        warnings,
    } = ConfigLoader::with_options(ConfigLoaderOptions {
        config_path: args.config.clone(),
        env_file: args.env_file.clone(),
    })
    .load()
    .context("failed to load configuration")?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host.clone() {
        config.server.host = host;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "loaded configuration file");
    }

    for warning in warnings.iter() {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    info!(
        bus.backend = ?config.bus.backend,
        bus.brokers = %config.bus.brokers,
        bus.topic = %config.bus.topic,
        bus.retry_attempts = config.bus.retry.max_attempts,
        fast_store = ?config.fast_store.backend,
        durable_store = ?config.durable_store.backend,
        log_id = ?config.persistence.log_id,
        "configuration in effect"
    );

    Ok(config)
}
