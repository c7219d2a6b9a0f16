//! halfclose - TCP half-close toolkit
//!
//! Echo server and probe client built on handle-based half-close, plus a
//! dump of the function catalog.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use halfclose::{config::ConfigManager, echo, Config, ConnectionManager, FunctionCatalog};

/// CLI arguments for halfclose
#[derive(Parser, Debug)]
#[command(name = "halfclose")]
#[command(about = "TCP half-close toolkit")]
#[command(version)]
#[command(long_about = "
halfclose - TCP half-close toolkit

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  HALFCLOSE_DEFAULT_DEADLINE - Deadline for send/recv/done (e.g., 10s)
  HALFCLOSE_CLOSE_DEADLINE   - Time a close waits for the peer (e.g., 5s)
  HALFCLOSE_MAX_HANDLES      - Maximum number of live handles
  HALFCLOSE_NODELAY          - Disable Nagle's algorithm (true/false)
  HALFCLOSE_LOG_LEVEL        - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "halfclose.toml", help = "Path to configuration file")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Default operation deadline (overrides config file)
    #[arg(long, value_parser = humantime::parse_duration, help = "Default deadline (e.g., 2s, 500ms)")]
    pub deadline: Option<Duration>,

    /// Maximum number of live handles (overrides config file)
    #[arg(long, help = "Maximum number of live connection handles")]
    pub max_handles: Option<usize>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print catalog records as JSON
    Describe {
        /// Function name; all records when omitted
        name: Option<String>,
    },
    /// List catalog functions by topic
    List,
    /// Read each connection to the peer's FIN, echo it back, then close
    Echo {
        #[arg(short, long, default_value = "127.0.0.1:7007")]
        bind: SocketAddr,
    },
    /// Send a payload, half-close, and read the reply to end of stream
    Probe {
        addr: SocketAddr,
        #[arg(short, long, default_value = "hello")]
        payload: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // The log level may come from the config, so load it before tracing is up.
    let mut config = if args.config.exists() {
        ConfigManager::load_from_file(&args.config)?
    } else {
        ConfigManager::load_from_env()?
    };

    init_tracing(&args, &config)?;
    if args.config.exists() {
        info!("Configuration loaded from {}", args.config.display());
    }

    config.merge_with_cli_args(args.deadline, args.max_handles);
    config
        .validate()
        .context("Final configuration validation failed")?;

    if args.validate_config {
        info!("Configuration is valid");
        info!("  Default deadline: {:?}", config.connection.default_deadline);
        info!("  Close deadline: {:?}", config.connection.close_deadline);
        info!("  Max handles: {}", config.connection.max_handles);
        info!("  TCP_NODELAY: {}", config.connection.nodelay);
        info!("  Log level: {}", config.monitoring.log_level);
        return Ok(());
    }

    let catalog = FunctionCatalog::builtin()?;

    match args.command {
        None | Some(Command::List) => list(&catalog),
        Some(Command::Describe { name }) => describe(&catalog, name.as_deref()),
        Some(Command::Echo { bind }) => run_echo(Arc::new(config), bind).await,
        Some(Command::Probe { addr, payload }) => probe(Arc::new(config), addr, &payload).await,
    }
}

fn list(catalog: &FunctionCatalog) -> Result<()> {
    for topic in catalog.topics().keys() {
        println!("{}:", topic);
        for record in catalog.topic(topic) {
            println!("  {:<12} {}", record.name, record.info);
        }
    }
    Ok(())
}

fn describe(catalog: &FunctionCatalog, name: Option<&str>) -> Result<()> {
    let json = match name {
        Some(name) => catalog.to_json(name)?,
        None => catalog.all_to_json()?,
    };
    println!("{}", json);
    Ok(())
}

async fn run_echo(config: Arc<Config>, bind: SocketAddr) -> Result<()> {
    let manager = Arc::new(ConnectionManager::new(config)?);
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Press Ctrl+C to stop");

    echo::serve(manager, listener, async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C"),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    })
    .await
}

async fn probe(config: Arc<Config>, addr: SocketAddr, payload: &str) -> Result<()> {
    let manager = ConnectionManager::new(Arc::clone(&config))?;
    let stream = tokio::time::timeout(config.connection.default_deadline, TcpStream::connect(addr))
        .await
        .with_context(|| format!("Timed out connecting to {}", addr))?
        .with_context(|| format!("Failed to connect to {}", addr))?;

    let handle = manager.attach(stream).await?;
    manager
        .send(handle, payload.as_bytes(), manager.default_deadline())
        .await?;
    manager.done(handle, manager.default_deadline()).await?;
    info!(%handle, "Sent {} bytes and half-closed", payload.len());

    let reply = manager.read_to_fin(handle, manager.default_deadline()).await;
    if let Err(e) = manager.close(handle, manager.close_deadline()).await {
        error!(%handle, "Close failed: {}", e);
    }
    let reply = reply?;

    println!("{}", String::from_utf8_lossy(&reply));
    if config.monitoring.metrics_enabled {
        print!("{}", manager.metrics().export_prometheus());
    }
    Ok(())
}

/// Initialize tracing/logging; `RUST_LOG` wins over everything else
fn init_tracing(args: &CliArgs, config: &Config) -> Result<()> {
    let log_level = config.log_level(args.log_level.as_deref(), args.verbose);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .with(env_filter)
        .init();

    Ok(())
}
