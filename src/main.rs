//! Chat Relay Server - Entry Point
//!
//! A multi-client TCP chat broker: clients register a display name, then
//! exchange broadcast or directed messages and query the connected-user list.

use log::{error, info};

use chat_relay_server::{Server, ServerConfig};

#[tokio::main]
async fn main() {
    // Initialize the logger (env_logger picks up RUST_LOG environment variable)
    env_logger::init();

    info!("Launching chat relay server...");

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let server = match Server::new(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Server startup failed: {}", e);
            std::process::exit(1);
        }
    };

    server.start().await;
}
