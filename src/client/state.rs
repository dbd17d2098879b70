//! Module `state`
//!
//! Defines the `ClientRecord` kept in the registry for each registered
//! participant, the per-session lifecycle states, and the `ClientHandle`
//! used to deliver frames to a client from any task.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;

/// Lifecycle of one connection, driven only by its own session task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Registering,
    Active,
    Closing,
    Closed,
}

/// Writable endpoint for one client's connection.
///
/// Frames pushed here are drained to the socket by that session's writer
/// task, so senders never block on a slow peer's I/O. Once the writer task
/// exits (disconnect or write failure) every further send fails, which is the
/// signal the router uses to prune the dead client.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ClientHandle {
    /// Creates a handle plus the receiving end its writer task drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues an encoded frame for delivery.
    ///
    /// Fails only when the connection's writer task is gone.
    pub fn send_frame(&self, frame: Vec<u8>) -> Result<(), SendError<Vec<u8>>> {
        self.tx.send(frame)
    }
}

/// Represents one registered participant.
///
/// The name is the unique key and never changes after registration; state
/// transitions are made only by the owning session task.
#[derive(Debug, Clone)]
pub struct ClientRecord {
    name: String,
    handle: ClientHandle,
    state: SessionState,
}

impl ClientRecord {
    pub fn new(name: String, handle: ClientHandle) -> Self {
        Self {
            name,
            handle,
            state: SessionState::Active,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &ClientHandle {
        &self.handle
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }
}
