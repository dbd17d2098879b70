pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod protocol;
pub mod router;
pub mod server;
pub mod session;

pub use config::ServerConfig;
pub use server::Server;
