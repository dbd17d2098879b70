//! Per-connection session handler.
//!
//! Owns one connection end to end through the state machine
//! `Connecting -> Registering -> Active -> Closing -> Closed`. The session
//! task reads and decodes frames and dispatches envelopes to the router; a
//! companion writer task drains the connection's outbound channel to the
//! write half, so nothing in the server ever blocks on this peer's socket.

use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;

use crate::client::{ClientHandle, SessionState, SharedRegistry};
use crate::config::ServerConfig;
use crate::error::{DecodeError, EnvelopeError, SessionError};
use crate::protocol::{Envelope, FrameDecoder, SERVER_NAME, encode_frame};
use crate::router;

/// Runs one connection's session to completion.
pub async fn handle_session(
    stream: TcpStream,
    client_addr: SocketAddr,
    registry: SharedRegistry,
    config: Arc<ServerConfig>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut state = SessionState::Connecting;
    let (read_half, write_half) = stream.into_split();
    let (handle, outbound) = ClientHandle::channel();
    let writer = tokio::spawn(writer_task(write_half, outbound, client_addr));

    let mut reader = EnvelopeReader::new(read_half, &config);

    transition(client_addr, &mut state, SessionState::Registering);
    let name = match register_client(&mut reader, &handle, &registry, &config, client_addr).await {
        Ok(Some(name)) => name,
        Ok(None) => {
            // Registration refused or peer gone before registering; nothing
            // was inserted, so there is nothing to remove.
            transition(client_addr, &mut state, SessionState::Closing);
            finish(client_addr, &mut state, handle, writer).await;
            return;
        }
        Err(e) => {
            warn!("Registration failed for {}: {}", client_addr, e);
            transition(client_addr, &mut state, SessionState::Closing);
            finish(client_addr, &mut state, handle, writer).await;
            return;
        }
    };

    transition(client_addr, &mut state, SessionState::Active);
    loop {
        tokio::select! {
            outcome = reader.next() => match outcome {
                Ok(ReadOutcome::Envelope(envelope)) => {
                    debug!("Received {} from {}", envelope.kind(), name);
                    if let Err(e) = router::dispatch(envelope, &name, &handle, &registry).await {
                        error!("Failed to route message from {}: {}", name, e);
                        break;
                    }
                }
                Ok(ReadOutcome::Rejected(e)) => {
                    // Well-framed but invalid message: tell the client and
                    // keep the session alive.
                    warn!("Rejecting message from {}: {}", name, e);
                    if send(&handle, &router::rejection(&e.to_string())).is_err() {
                        break;
                    }
                }
                Ok(ReadOutcome::Disconnected) => {
                    info!("Connection closed by client {}", name);
                    break;
                }
                Err(e) => {
                    // Framing and transport errors are not retried; the
                    // stream is done.
                    warn!("Session error for {}: {}", name, e);
                    break;
                }
            },
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("Shutdown requested, closing session for {}", name);
                    break;
                }
            }
        }
    }

    transition(client_addr, &mut state, SessionState::Closing);
    {
        let mut guard = registry.lock().await;
        guard.set_state(&name, SessionState::Closing);
        guard.remove(&name);
    }
    info!("Client {} ({}) disconnected", name, client_addr);
    finish(client_addr, &mut state, handle, writer).await;
}

/// Reads exactly one envelope and attempts registration.
///
/// Returns the registered name, or `None` when the session must close
/// without ever having been registered: refused name, server full, a first
/// envelope that is not a registration, or an early disconnect. Every
/// refusal is acknowledged explicitly before closing.
async fn register_client(
    reader: &mut EnvelopeReader,
    handle: &ClientHandle,
    registry: &SharedRegistry,
    config: &ServerConfig,
    client_addr: SocketAddr,
) -> Result<Option<String>, SessionError> {
    let envelope = match reader.next().await? {
        ReadOutcome::Envelope(envelope) => envelope,
        ReadOutcome::Rejected(e) => {
            warn!("Malformed registration from {}: {}", client_addr, e);
            send(handle, &Envelope::ack_failure("malformed registration"))?;
            return Ok(None);
        }
        ReadOutcome::Disconnected => {
            info!("{} disconnected before registering", client_addr);
            return Ok(None);
        }
    };

    let name = match envelope {
        Envelope::Registration { payload } => payload.name,
        other => {
            warn!(
                "First envelope from {} was {}, not a registration",
                client_addr,
                other.kind()
            );
            send(handle, &Envelope::ack_failure("registration required"))?;
            return Ok(None);
        }
    };

    // Uniqueness check and insert happen under one lock acquisition, so two
    // sessions racing on the same name cannot both win.
    let refusal = {
        let mut guard = registry.lock().await;
        if guard.len() >= config.max_clients {
            Some("server full")
        } else if name.is_empty() || name == SERVER_NAME {
            Some("invalid name")
        } else if guard.register(&name, handle.clone()).is_err() {
            Some("name already registered")
        } else {
            None
        }
    };

    if let Some(reason) = refusal {
        info!(
            "Refused registration of {:?} from {}: {}",
            name, client_addr, reason
        );
        send(handle, &Envelope::ack_failure(reason))?;
        return Ok(None);
    }

    info!("Registered client {:?} from {}", name, client_addr);
    send(handle, &Envelope::ack_success())?;
    router::broadcast(registry, &name, &Envelope::join_notice(&name)).await?;
    Ok(Some(name))
}

/// Decoded read loop outcome for one `EnvelopeReader::next` call.
enum ReadOutcome {
    Envelope(Envelope),
    Rejected(EnvelopeError),
    Disconnected,
}

/// Couples the read half with the frame decoder: reads transport chunks of
/// whatever size the peer's writes arrived in and surfaces whole envelopes.
struct EnvelopeReader {
    read_half: OwnedReadHalf,
    decoder: FrameDecoder,
    buf: Vec<u8>,
}

impl EnvelopeReader {
    fn new(read_half: OwnedReadHalf, config: &ServerConfig) -> Self {
        Self {
            read_half,
            decoder: FrameDecoder::new(config.max_frame_len),
            buf: vec![0u8; config.read_buffer_size],
        }
    }

    /// Next envelope, invalid message, or end of stream.
    ///
    /// Cancel-safe: the only await is the transport read, and decoder state
    /// survives between calls.
    async fn next(&mut self) -> Result<ReadOutcome, SessionError> {
        loop {
            match self.decoder.next() {
                Ok(Some(envelope)) => return Ok(ReadOutcome::Envelope(envelope)),
                Ok(None) => {}
                Err(DecodeError::Envelope(e)) => return Ok(ReadOutcome::Rejected(e)),
                Err(DecodeError::Framing(e)) => return Err(e.into()),
            }

            let n = self.read_half.read(&mut self.buf).await?;
            if n == 0 {
                return Ok(ReadOutcome::Disconnected);
            }
            self.decoder.extend(&self.buf[..n]);
        }
    }
}

/// Drains the outbound channel to the socket.
///
/// Exits when every handle clone is gone (normal close) or a write fails;
/// after that, any send on this client's handle errors, which is how the
/// router discovers a dead peer.
async fn writer_task(
    mut write_half: OwnedWriteHalf,
    mut outbound: UnboundedReceiver<Vec<u8>>,
    client_addr: SocketAddr,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = write_half.write_all(&frame).await {
            debug!("Write to {} failed: {}", client_addr, e);
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

/// Encodes and queues one envelope on this session's own connection.
fn send(handle: &ClientHandle, envelope: &Envelope) -> Result<(), SessionError> {
    let frame = encode_frame(envelope)?;
    handle
        .send_frame(frame)
        .map_err(|_| SessionError::HandleClosed("local writer task exited".to_string()))
}

fn transition(client_addr: SocketAddr, state: &mut SessionState, next: SessionState) {
    debug!("Session {}: {:?} -> {:?}", client_addr, state, next);
    *state = next;
}

/// Final teardown shared by every exit path: release the handle so the
/// writer's channel closes, then wait for it to flush queued frames.
async fn finish(
    client_addr: SocketAddr,
    state: &mut SessionState,
    handle: ClientHandle,
    writer: tokio::task::JoinHandle<()>,
) {
    drop(handle);
    if let Err(e) = writer.await {
        debug!("Writer task for {} ended abnormally: {}", client_addr, e);
    }
    transition(client_addr, state, SessionState::Closed);
}
