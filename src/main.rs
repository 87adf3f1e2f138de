//! Local development gateway.
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                  LOCAL GATEWAY                       │
//!   HTTP request  │  ┌────────┐   ┌──────────┐   ┌──────────┐            │
//!  ───────────────┼─▶│listener│──▶│  http    │──▶│ routing  │──┐         │
//!                 │  └────────┘   │  server  │   └──────────┘  │         │
//!   WS upgrade    │               │          │                 ▼         │
//!  ───────────────┼──────────────▶│          │   ┌──────────────────┐    │
//!                 │               └────┬─────┘   │ events → invoker │────┼──▶ handler
//!                 │                    │         │   (env overlay)  │    │
//!                 │                    ▼         └──────────────────┘    │
//!                 │            ┌──────────────┐                          │
//!   /@connections │            │ connection   │                          │
//!  ───────────────┼───────────▶│ registry     │                          │
//!                 │            └──────────────┘                          │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use lambda_dev_gateway::config::{load_config, GatewayConfig};
use lambda_dev_gateway::invocation::ProcessHandlerLoader;
use lambda_dev_gateway::lifecycle::wait_for_shutdown_signal;
use lambda_dev_gateway::observability::{logging, metrics};
use lambda_dev_gateway::GatewayServer;

#[derive(Parser)]
#[command(name = "lambda-dev-gateway")]
#[command(about = "Run function handlers behind a local HTTP + WebSocket gateway", long_about = None)]
struct Args {
    /// Configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Override the configured port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Include error detail in 500 responses.
    #[arg(long)]
    dev: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config: GatewayConfig = if args.config.exists() {
        load_config(&args.config)?
    } else {
        eprintln!(
            "Config file {} not found, using defaults",
            args.config.display()
        );
        GatewayConfig::default()
    };
    if let Some(port) = args.port {
        config.gateway.port = port;
    }
    if args.dev {
        config.gateway.development = true;
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "lambda-dev-gateway starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let loader = Arc::new(ProcessHandlerLoader::new(&config.gateway.handlers_dir));
    let gateway = GatewayServer::new(config, loader)?.start().await?;
    tracing::info!(address = %gateway.local_addr(), "Gateway ready");

    wait_for_shutdown_signal().await;
    gateway.stop().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
