use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};

use crate::client::{ClientRegistry, SharedRegistry};
use crate::config::ServerConfig;
use crate::error::ChatServerError;
use crate::session::handle_session;

pub struct Server {
    registry: SharedRegistry,
    listener: TcpListener,
    config: Arc<ServerConfig>,
    shutdown_tx: watch::Sender<bool>,
}

impl Server {
    /// Binds the listener and prepares shared state.
    pub async fn new(config: ServerConfig) -> Result<Self, ChatServerError> {
        let socket_addr = config.socket_addr();
        let listener = match TcpListener::bind(&socket_addr).await {
            Ok(listener) => {
                info!("Server bound to {}", socket_addr);
                listener
            }
            Err(e) => {
                error!("Failed to bind to {}: {}", socket_addr, e);
                return Err(e.into());
            }
        };

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            registry: Arc::new(Mutex::new(ClientRegistry::new())),
            listener,
            config: Arc::new(config),
            shutdown_tx,
        })
    }

    /// Actual bound address; useful when the configured port is 0.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Sender half of the shutdown signal. Sending `true` stops the accept
    /// loop and drives every active session to `Closing`.
    pub fn shutdown_trigger(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    /// Accept loop: one spawned session task per connection. Runs until the
    /// shutdown signal fires.
    pub async fn start(&self) {
        info!(
            "Starting chat relay server on {} (max {} clients)",
            self.config.socket_addr(),
            self.config.max_clients
        );

        let mut shutdown = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!("{} connected", addr);
                        let registry = Arc::clone(&self.registry);
                        let config = Arc::clone(&self.config);
                        let shutdown_rx = self.shutdown_tx.subscribe();

                        // Spawn a task per client so the accept loop never
                        // blocks on a session.
                        tokio::spawn(async move {
                            handle_session(stream, addr, registry, config, shutdown_rx).await;
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                    }
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Shutdown requested, no longer accepting connections");
                        break;
                    }
                }
            }
        }
    }
}
