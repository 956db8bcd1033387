//! Chat relay - Entry Point

use log::{error, info};

use rax_chat_relay::utils::logging::setup_logging;
use rax_chat_relay::utils::signal::shutdown_signal;
use rax_chat_relay::{Server, ServerConfig};

#[tokio::main]
async fn main() {
    setup_logging();

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Launching chat relay on {}...", config.bind_address());

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Server startup failed: {}", e);
            std::process::exit(1);
        }
    };

    server.run_until(shutdown_signal()).await;
}
