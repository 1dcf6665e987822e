mod config;
mod shutdown;

use std::path::{Path, PathBuf};
use std::time::Duration;

use net::Gateway;
use rpg::{ContentTables, GameServices};

use crate::config::{parse_cli_args, ServerConfig, Transport};
use crate::shutdown::{shutdown_channel, ShutdownRx};

#[tokio::main]
async fn main() {
    observability::init_logging();

    let config = parse_cli_args();
    tracing::info!("RPG server starting...");

    let content = match load_content(&config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load content: {}", e);
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let server_future = run_rpg_server(config, content, shutdown_rx);

    tokio::select! {
        _ = shutdown::wait_for_signal() => {
            tracing::info!("Shutdown signal received, stopping server...");
            shutdown_tx.trigger();
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        _ = server_future => {}
    }

    tracing::info!("Server stopped.");
}

fn load_content(config: &ServerConfig) -> Result<ContentTables, rpg::ContentError> {
    let dir = Path::new(&config.content.content_dir);
    if dir.is_dir() {
        ContentTables::load_dir(dir)
    } else {
        tracing::info!("No content/ directory found, using built-in world");
        ContentTables::builtin()
    }
}

async fn run_rpg_server(config: ServerConfig, content: ContentTables, shutdown_rx: ShutdownRx) {
    let services = GameServices::new(content, config.to_session_config());
    let (accept_tx, accept_rx) = tokio::sync::mpsc::unbounded_channel();
    let gateway = Gateway::new(accept_tx, config.to_rate_limit_config());

    tokio::spawn(rpg::run_acceptor(
        accept_rx,
        services,
        shutdown_rx.clone().into_inner(),
    ));

    let shutdown = shutdown_rx.into_inner();
    let result = match config.net.transport {
        Transport::Ws => net::ws_server::run_ws_server(config.net.ws_addr.clone(), gateway, shutdown).await,
        Transport::Web => {
            let static_dir = PathBuf::from(&config.net.web_static_dir);
            let static_dir = if static_dir.is_dir() {
                Some(static_dir)
            } else {
                tracing::info!("No {} directory found, serving /ws only", config.net.web_static_dir);
                None
            };
            net::web_server::run_web_server(config.net.ws_addr.clone(), gateway, static_dir, shutdown).await
        }
        Transport::Tcp => net::server::run_tcp_server(config.net.tcp_addr.clone(), gateway, shutdown).await,
    };

    if let Err(e) = result {
        tracing::error!(transport = ?config.net.transport, "Server error: {}", e);
    }
}
