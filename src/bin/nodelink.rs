//! nodelink daemon binary
//!
//! Loads configuration, joins the coordinator and runs the node until
//! interrupted. `nodelink test` runs the port and speed checks on their own
//! without contacting the coordinator.

use clap::{Parser, Subcommand};
use nodelink::{Config, Diagnostics, Node};
use std::path::PathBuf;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Storage node coordinator client
#[derive(Parser, Debug)]
#[command(name = "nodelink", version, about)]
struct Args {
    /// Path to configuration file (overrides default search paths)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Join the coordinator and run until interrupted (default)
    Run,
    /// Check port forwarding and measure internet speed
    Test,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse();
    let config = load_config(&args);

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Test => test(config).await,
    }
}

/// Load the explicit config file, or the cascading search paths.
fn load_config(args: &Args) -> Config {
    let (config, loaded_paths) = if let Some(config_path) = &args.config {
        // Explicit config file specified - load only that file
        match Config::load_file(config_path) {
            Ok(config) => (config, vec![config_path.clone()]),
            Err(e) => {
                error!("Failed to load configuration from {}: {}", config_path.display(), e);
                std::process::exit(1);
            }
        }
    } else {
        match Config::load() {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                std::process::exit(1);
            }
        }
    };

    if loaded_paths.is_empty() {
        info!("No config files found, using defaults");
    } else {
        for path in &loaded_paths {
            info!(path = %path.display(), "Loaded config file");
        }
    }
    config
}

async fn run(config: Config) {
    info!("nodelink starting");

    if config.has_identity() {
        info!("Using configured identity");
    } else {
        warn!("No identity configured, generating ephemeral keypair");
    }

    let mut node = match Node::new(config) {
        Ok(node) => node,
        Err(e) => {
            error!("Failed to create node: {}", e);
            std::process::exit(1);
        }
    };

    info!(state = %node.state(), "Node created");
    info!("  node_id: {}", node.identity().node_id());
    info!("  npub: {}", node.identity().npub());
    info!("  pubkey: {}", hex::encode(node.identity().pubkey().serialize()));
    info!("  coordinator: {}", node.config().coordinator.api());
    info!("  data_dir: {}", node.config().node.data_dir().display());

    if let Err(e) = node.start().await {
        error!("Failed to start node: {}", e);
        std::process::exit(1);
    }

    info!("nodelink running, press Ctrl+C to exit");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    if let Err(e) = node.stop().await {
        warn!("Error during shutdown: {}", e);
    }

    info!("nodelink shutdown complete");
}

async fn test(config: Config) {
    let diagnostics = match Diagnostics::from_config(&config) {
        Ok(diagnostics) => diagnostics,
        Err(e) => {
            error!("Failed to set up diagnostics: {}", e);
            std::process::exit(1);
        }
    };

    info!("Checking port forwarding and internet speed");
    let result = diagnostics.node_test().await;

    for (version, ip) in &result.ports {
        info!(
            version = %version,
            ip = %ip.ip,
            swarm = ip.swarm_open,
            gateway = ip.gateway_open,
            "Port forwarding"
        );
    }
    info!("Download Speed: {:5.2} Mbit/s", result.download);
    info!("Upload Speed: {:5.2} Mbit/s", result.upload);
    if !result.valid {
        warn!("Result seems to be wrong. Please run the speed test again.");
    }

    if !result.reachable() {
        error!("Node port forwarding is not accessible. Please change your router's configuration and try again.");
        std::process::exit(1);
    }
}
