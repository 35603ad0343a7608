//! wsrelay - WebSocket Message Relay
//!
//! Accepts WebSocket clients, assigns each an identity and relays JSON
//! envelopes between them, directed or broadcast.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use tracing::{error, info, warn};
use tracing_subscriber::{
    layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

use wsrelay::{config::ConfigManager, Config, RelayServer, ShutdownSignal};

/// CLI arguments for wsrelay
#[derive(Parser, Debug)]
#[command(name = "wsrelay")]
#[command(about = "wsrelay - WebSocket message relay")]
#[command(version)]
#[command(long_about = "
wsrelay - WebSocket message relay

Clients connect to the WebSocket endpoint, are announced to everyone already
connected, and exchange JSON envelopes {sender, recipient, content}. An empty
recipient broadcasts to every connected client.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  WSRELAY_BIND_ADDR        - Bind address (e.g., 0.0.0.0:8080)
  WSRELAY_WS_PATH          - WebSocket endpoint path (e.g., /ws)
  WSRELAY_DELIVERY_MODE    - unbounded or bounded_drop
  WSRELAY_QUEUE_CAPACITY   - Per-connection queue capacity
  WSRELAY_DROP_POLICY      - oldest or newest
  WSRELAY_STRICT_DECODING  - Drop undecodable frames (true/false)
  WSRELAY_LOG_LEVEL        - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "config.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// Bind address (overrides config file)
    #[arg(short, long, help = "Bind address (e.g., 0.0.0.0:8080)")]
    pub bind: Option<String>,

    /// Port to bind to (overrides config file)
    #[arg(short, long, help = "Port to bind to")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error), overrides config file
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Bound every connection's delivery queue to this many messages
    #[arg(long, help = "Per-connection delivery queue capacity")]
    pub queue_capacity: Option<usize>,

    /// Drop frames that are not valid envelopes
    #[arg(long, help = "Drop frames that fail to decode")]
    pub strict_decoding: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Initialize tracing
    let log_filter = init_tracing(&args)?;

    info!("Starting wsrelay v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration with priority: CLI args > config file > environment > defaults
    let mut config = if args.config.exists() {
        ConfigManager::load_from_file(&args.config)?
    } else {
        info!("Config file not found, checking environment variables");
        ConfigManager::load_from_env()?
    };

    log_filter.apply_config_level(&config)?;

    // Apply CLI argument overrides (highest priority)
    config.merge_with_cli_args(
        args.bind.as_deref(),
        args.port,
        args.queue_capacity,
        args.strict_decoding,
    );

    // Final validation after all overrides
    config
        .validate()
        .context("Final configuration validation failed")?;

    if args.validate_config {
        info!("Configuration is valid");
        log_summary(&config);
        return Ok(());
    }

    log_summary(&config);

    let shutdown = ShutdownSignal::new(config.server.shutdown_timeout);
    let server = RelayServer::bind(&config).await?;
    let addr = server.local_addr()?;

    let mut server_handle = tokio::spawn(server.serve_with_shutdown(shutdown.wait()));

    info!(
        "wsrelay started on ws://{}{}",
        addr, config.server.ws_path
    );
    info!("Press Ctrl+C or send SIGTERM/SIGINT to shutdown gracefully");

    tokio::select! {
        result = shutdown.listen_for_signals() => {
            if let Err(e) = result {
                error!("Error setting up signal handlers: {}", e);
            }
        }
        result = &mut server_handle => {
            // The server only returns on its own when something went wrong
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(anyhow::anyhow!("Server task failed: {}", e)),
            };
        }
    }

    info!("Initiating graceful shutdown...");

    match tokio::time::timeout(shutdown.timeout(), server_handle).await {
        Ok(Ok(Ok(()))) => info!("Server shutdown complete"),
        Ok(Ok(Err(e))) => error!("Server error during shutdown: {:#}", e),
        Ok(Err(e)) if !e.is_cancelled() => error!("Server task failed: {}", e),
        Ok(Err(_)) => {}
        Err(_) => warn!(
            "Shutdown timeout of {:?} reached, exiting with connections still open",
            shutdown.timeout()
        ),
    }

    Ok(())
}

fn log_summary(config: &Config) {
    info!("Configuration summary:");
    info!("  Bind address: {}", config.server.bind_addr);
    info!("  WebSocket path: {}", config.server.ws_path);
    info!("  Health path: {}", config.server.health_path);
    info!("  Announce address: {:?}", config.relay.announce_address);
    info!(
        "  Delivery: {:?} (capacity {}, drop {:?})",
        config.relay.delivery.mode, config.relay.delivery.capacity, config.relay.delivery.drop
    );
    info!(
        "  Strict decoding: {}",
        if config.relay.strict_decoding {
            "enabled"
        } else {
            "disabled"
        }
    );
    info!(
        "  Metrics: {}",
        if config.monitoring.metrics_enabled {
            config.monitoring.metrics_path.as_str()
        } else {
            "disabled"
        }
    );
    info!(
        "  Shutdown timeout: {}",
        humantime::format_duration(config.server.shutdown_timeout)
    );
}

/// Log filter installed before the config is known
struct LogFilter {
    handle: reload::Handle<EnvFilter, Registry>,
    /// Set by RUST_LOG, --log-level or --verbose, which beat the config file
    pinned: bool,
}

impl LogFilter {
    /// Switch to the configured `monitoring.log_level` unless the level was pinned
    fn apply_config_level(&self, config: &Config) -> Result<()> {
        if self.pinned {
            return Ok(());
        }
        self.handle
            .reload(EnvFilter::new(&config.monitoring.log_level))
            .context("Failed to apply configured log level")
    }
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs) -> Result<LogFilter> {
    let (env_filter, pinned) = initial_filter(args);
    let (env_filter, handle) = reload::Layer::new(env_filter);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .init();

    Ok(LogFilter { handle, pinned })
}

/// Filter to start with, and whether it outranks the config file
fn initial_filter(args: &CliArgs) -> (EnvFilter, bool) {
    let cli_level = if args.verbose {
        Some("debug")
    } else {
        args.log_level.as_deref()
    };

    match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => match cli_level {
            Some(level) => (EnvFilter::new(level), true),
            None => (EnvFilter::new("info"), false),
        },
    }
}
