//! Courier Agent: Entry point.
//!
//! Starts the agent with configuration from a TOML file or defaults.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use courier_agent::{AgentConfig, Conductor};

/// Courier DIDComm agent
#[derive(Parser, Debug)]
#[command(name = "courier-agent", version, about = "Courier DIDComm agent")]
struct Args {
    /// Path to the configuration file (TOML).
    #[arg(short, long, default_value = "courier.toml")]
    config: PathBuf,

    /// Override the admin API port.
    #[arg(long)]
    admin_port: Option<u16>,

    /// Override the port of the first inbound transport.
    #[arg(long)]
    inbound_port: Option<u16>,

    /// Override the endpoint advertised to peers.
    #[arg(long)]
    endpoint: Option<String>,

    /// Override the label shown to peers.
    #[arg(long)]
    label: Option<String>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Generate a default config file and exit.
    #[arg(long)]
    init: bool,
}

fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Handle --init flag
    if args.init {
        let config = AgentConfig::default();
        config.save(&args.config)?;
        init_tracing(&config.logging.level, &config.logging.format);
        tracing::info!(path = %args.config.display(), "wrote default config");
        return Ok(());
    }

    // Load configuration
    let mut config = AgentConfig::load(&args.config)?;

    // Apply CLI overrides
    if let Some(admin_port) = args.admin_port {
        config.admin.port = admin_port;
    }
    if let Some(inbound_port) = args.inbound_port {
        if let Some(first) = config.transport.inbound.first_mut() {
            first.port = inbound_port;
        }
    }
    if let Some(endpoint) = args.endpoint {
        config.agent.endpoint = Some(endpoint);
    }
    if let Some(label) = args.label {
        config.agent.label = label;
    }
    if let Some(log_level) = args.log_level {
        config.logging.level = log_level;
    }

    init_tracing(&config.logging.level, &config.logging.format);
    tracing::info!("Courier Agent v{}", env!("CARGO_PKG_VERSION"));

    let conductor = Conductor::start(config).await?;

    // Wait for SIGINT, then shut down in order
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("received shutdown signal");

    conductor.shutdown().await;
    tracing::info!("agent exited cleanly");
    Ok(())
}
