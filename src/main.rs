use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use burrow::config::Config;
use burrow::logger::setup_logging;
use burrow::node::{BurrowNode, probe};

#[derive(Parser)]
#[command(name = "burrow", about = "Kademlia-style peer discovery node")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bind an address and serve PING / FIND_NODE, optionally joining
    /// the network through a bootstrap peer first
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Bootstrap peer as host:port; omit to act as the bootstrap node
        #[arg(long)]
        bootstrap: Option<String>,
    },
    /// Send a single PING to a bootstrap address and report reachability
    Probe {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bootstrap: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut config = Config::from_file(cli.config);

    match cli.command {
        Command::Serve {
            host,
            port,
            bootstrap,
        } => {
            if let Some(host) = host {
                config.network.listen_host = host;
            }
            if let Some(port) = port {
                config.network.listen_port = port;
            }
            if bootstrap.is_some() {
                config.network.bootstrap_node = bootstrap;
            }
            serve(config).await
        }
        Command::Probe { bootstrap } => {
            setup_logging(&config.log_level, config.log_file.clone());

            let address: SocketAddr = match bootstrap.parse() {
                Ok(addr) => addr,
                Err(_) => {
                    error!(address = %bootstrap, "Invalid bootstrap address");
                    return ExitCode::FAILURE;
                }
            };
            match probe(&config, address).await {
                Ok(true) => {
                    info!(address = %address, "Bootstrap node is reachable");
                    ExitCode::SUCCESS
                }
                Ok(false) => {
                    error!(address = %address, "Bootstrap node is unreachable");
                    ExitCode::FAILURE
                }
                Err(e) => {
                    error!(error = %e, "Probe failed");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

async fn serve(config: Config) -> ExitCode {
    setup_logging(&config.log_level, config.log_file.clone());

    let node = match BurrowNode::new(config).await {
        Ok(node) => node,
        Err(e) => {
            error!(error = %e, "Failed to create node");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = node.start().await {
        error!(error = %e, "Failed to start node");
        return ExitCode::FAILURE;
    }
    info!(address = %node.local_addr(), "Serving PING / FIND_NODE");

    if tokio::signal::ctrl_c().await.is_err() {
        error!("Failed to listen for shutdown signal");
    }
    node.stop().await;
    ExitCode::SUCCESS
}
