//! Message routing
//!
//! Classifies each envelope arriving from an active session and computes who
//! receives what: command replies go back to the origin, directed chat goes
//! to one looked-up recipient, undirected chat fans out to a registry
//! snapshot. The router stamps `sender` and `timestamp` server-side, so
//! client-supplied identity fields are never trusted.

use log::{debug, info, warn};

use crate::client::{ClientHandle, SharedRegistry};
use crate::commands;
use crate::error::FramingError;
use crate::protocol::{Envelope, encode_frame};
use serde_json::json;

/// Builds the rejected-message report sent when a session receives an
/// envelope it cannot act on (invalid shape, or a kind only the server may
/// originate).
pub fn rejection(reason: &str) -> Envelope {
    Envelope::command_result("reject", json!({ "error": reason }))
}

/// Builds the report sent to a client whose directed chat named a recipient
/// that is not registered.
fn recipient_not_found(recipient: &str) -> Envelope {
    Envelope::command_result(
        "delivery",
        json!({ "error": "recipient not found", "recipient": recipient }),
    )
}

/// Routes one envelope from the active session owned by `sender`.
///
/// Replies destined for the originating client go through `origin`; a failed
/// reply there is only logged, since the owning session will notice its own
/// dead connection on the next read.
pub async fn dispatch(
    envelope: Envelope,
    sender: &str,
    origin: &ClientHandle,
    registry: &SharedRegistry,
) -> Result<(), FramingError> {
    match envelope {
        Envelope::Registration { .. } => {
            debug!("Client {} sent a second registration", sender);
            reply(sender, origin, &rejection("already registered"))
        }
        Envelope::Command { payload } => {
            info!("Received command {:?} from {}", payload.name, sender);
            let names = registry.lock().await.names();
            let result = commands::execute(&payload.name, names);
            reply(sender, origin, &result)
        }
        Envelope::Chat {
            recipient, payload, ..
        } => {
            // Identity and receipt time come from the server, never from
            // whatever the client put in the envelope.
            let stamped = Envelope::chat(sender, recipient.as_deref(), &payload.text);
            match recipient {
                Some(target) => unicast(registry, sender, origin, &target, &stamped).await,
                None => broadcast(registry, sender, &stamped).await,
            }
        }
        other => {
            debug!(
                "Client {} sent server-originated kind {:?}",
                sender,
                other.kind()
            );
            reply(
                sender,
                origin,
                &rejection("clients cannot originate this kind"),
            )
        }
    }
}

/// Delivers an envelope to a single named recipient.
///
/// An unregistered target is reported back to the sender. A registered
/// target whose connection handle is already dead is pruned and reported the
/// same way; by the time the sender hears anything, that name is gone.
async fn unicast(
    registry: &SharedRegistry,
    sender: &str,
    origin: &ClientHandle,
    target: &str,
    envelope: &Envelope,
) -> Result<(), FramingError> {
    let record = registry.lock().await.lookup(target);
    match record {
        Some(record) => {
            let frame = encode_frame(envelope)?;
            if record.handle().send_frame(frame).is_err() {
                warn!("Pruning dead client {} during unicast", target);
                registry.lock().await.remove(target);
                return reply(sender, origin, &recipient_not_found(target));
            }
            debug!("Delivered {} from {} to {}", envelope.kind(), sender, target);
            Ok(())
        }
        None => reply(sender, origin, &recipient_not_found(target)),
    }
}

/// Fans an envelope out to every registered client except `exclude`.
///
/// Iterates a point-in-time snapshot so concurrent joins and leaves cannot
/// corrupt the fan-out, and the registry lock is released before any
/// delivery. A dead recipient is pruned and delivery continues; one dead
/// peer never aborts the rest.
pub async fn broadcast(
    registry: &SharedRegistry,
    exclude: &str,
    envelope: &Envelope,
) -> Result<(), FramingError> {
    let snapshot = registry.lock().await.snapshot();
    let frame = encode_frame(envelope)?;

    let mut dead = Vec::new();
    for record in snapshot.iter().filter(|r| r.name() != exclude) {
        if record.handle().send_frame(frame.clone()).is_err() {
            dead.push(record.name().to_string());
        }
    }

    if !dead.is_empty() {
        let mut guard = registry.lock().await;
        for name in &dead {
            warn!("Pruning dead client {} during broadcast", name);
            guard.remove(name);
        }
    }
    Ok(())
}

/// Sends a server-built envelope back to the originating connection.
fn reply(sender: &str, origin: &ClientHandle, envelope: &Envelope) -> Result<(), FramingError> {
    let frame = encode_frame(envelope)?;
    if origin.send_frame(frame).is_err() {
        // The origin's own session cleans itself up on its next read.
        warn!("Could not reply to {}: connection handle closed", sender);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientHandle, ClientRegistry};
    use crate::protocol::{ChatPayload, CommandPayload, FrameDecoder};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn decode(frame: Vec<u8>) -> Envelope {
        let mut decoder = FrameDecoder::new(64 * 1024);
        decoder.extend(&frame);
        decoder.next().unwrap().expect("complete frame")
    }

    fn try_recv(rx: &mut UnboundedReceiver<Vec<u8>>) -> Option<Envelope> {
        rx.try_recv().ok().map(decode)
    }

    fn chat(recipient: Option<&str>, text: &str) -> Envelope {
        Envelope::Chat {
            sender: None,
            recipient: recipient.map(str::to_string),
            timestamp: None,
            payload: ChatPayload {
                text: text.to_string(),
            },
        }
    }

    async fn registry_with(
        names: &[&str],
    ) -> (SharedRegistry, Vec<UnboundedReceiver<Vec<u8>>>) {
        let registry = Arc::new(Mutex::new(ClientRegistry::new()));
        let mut receivers = Vec::new();
        {
            let mut guard = registry.lock().await;
            for name in names {
                let (handle, rx) = ClientHandle::channel();
                guard.register(name, handle).unwrap();
                receivers.push(rx);
            }
        }
        (registry, receivers)
    }

    #[tokio::test]
    async fn broadcast_reaches_everyone_but_the_sender() {
        let (registry, mut rxs) = registry_with(&["alice", "bob", "carol"]).await;
        let origin = registry.lock().await.lookup("alice").unwrap();

        dispatch(chat(None, "hi"), "alice", origin.handle(), &registry)
            .await
            .unwrap();

        assert!(try_recv(&mut rxs[0]).is_none(), "sender must not hear itself");
        for rx in &mut rxs[1..] {
            match try_recv(rx).expect("delivery") {
                Envelope::Chat {
                    sender,
                    timestamp,
                    payload,
                    ..
                } => {
                    assert_eq!(sender.as_deref(), Some("alice"));
                    assert!(timestamp.is_some());
                    assert_eq!(payload.text, "hi");
                }
                other => panic!("expected chat, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn sender_identity_comes_from_the_session_not_the_payload() {
        let (registry, mut rxs) = registry_with(&["alice", "bob"]).await;
        let origin = registry.lock().await.lookup("alice").unwrap();

        // A spoofed sender field is discarded during stamping.
        let spoofed = Envelope::Chat {
            sender: Some("mallory".to_string()),
            recipient: None,
            timestamp: Some("01/01/1970, 00:00:00".to_string()),
            payload: ChatPayload {
                text: "trust me".to_string(),
            },
        };
        dispatch(spoofed, "alice", origin.handle(), &registry)
            .await
            .unwrap();

        match try_recv(&mut rxs[1]).expect("delivery") {
            Envelope::Chat { sender, .. } => assert_eq!(sender.as_deref(), Some("alice")),
            other => panic!("expected chat, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unicast_reaches_only_the_target() {
        let (registry, mut rxs) = registry_with(&["alice", "bob", "carol"]).await;
        let origin = registry.lock().await.lookup("bob").unwrap();

        dispatch(chat(Some("alice"), "hey"), "bob", origin.handle(), &registry)
            .await
            .unwrap();

        match try_recv(&mut rxs[0]).expect("delivery to alice") {
            Envelope::Chat {
                sender, recipient, ..
            } => {
                assert_eq!(sender.as_deref(), Some("bob"));
                assert_eq!(recipient.as_deref(), Some("alice"));
            }
            other => panic!("expected chat, got {:?}", other),
        }
        assert!(try_recv(&mut rxs[1]).is_none());
        assert!(try_recv(&mut rxs[2]).is_none());
    }

    #[tokio::test]
    async fn unicast_to_unknown_name_reports_not_found() {
        let (registry, mut rxs) = registry_with(&["alice"]).await;
        let origin = registry.lock().await.lookup("alice").unwrap();

        dispatch(
            chat(Some("ghost"), "anyone?"),
            "alice",
            origin.handle(),
            &registry,
        )
        .await
        .unwrap();

        match try_recv(&mut rxs[0]).expect("not-found report") {
            Envelope::CommandResult { payload } => {
                assert_eq!(payload.name, "delivery");
                assert_eq!(payload.result["error"], json!("recipient not found"));
                assert_eq!(payload.result["recipient"], json!("ghost"));
            }
            other => panic!("expected command result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn dead_recipient_is_pruned_and_the_rest_still_receive() {
        let (registry, mut rxs) = registry_with(&["alice", "bob", "carol"]).await;
        let origin = registry.lock().await.lookup("alice").unwrap();

        // Bob's writer task is gone: dropping the receiver kills the handle.
        drop(rxs.remove(1));

        dispatch(chat(None, "still here?"), "alice", origin.handle(), &registry)
            .await
            .unwrap();

        // Carol still got the message.
        match try_recv(&mut rxs[1]).expect("delivery to carol") {
            Envelope::Chat { payload, .. } => assert_eq!(payload.text, "still here?"),
            other => panic!("expected chat, got {:?}", other),
        }
        // Bob is gone from the registry.
        assert_eq!(registry.lock().await.names(), vec!["alice", "carol"]);
    }

    #[tokio::test]
    async fn command_reply_goes_to_the_origin_only() {
        let (registry, mut rxs) = registry_with(&["alice", "bob"]).await;
        let origin = registry.lock().await.lookup("alice").unwrap();

        let command = Envelope::Command {
            payload: CommandPayload {
                name: "list".to_string(),
            },
        };
        dispatch(command, "alice", origin.handle(), &registry)
            .await
            .unwrap();

        match try_recv(&mut rxs[0]).expect("list result") {
            Envelope::CommandResult { payload } => {
                assert_eq!(payload.name, "list");
                assert_eq!(payload.result, json!(["alice", "bob"]));
            }
            other => panic!("expected command result, got {:?}", other),
        }
        assert!(try_recv(&mut rxs[1]).is_none());
    }

    #[tokio::test]
    async fn second_registration_is_rejected_without_closing() {
        let (registry, mut rxs) = registry_with(&["alice"]).await;
        let origin = registry.lock().await.lookup("alice").unwrap();

        dispatch(
            Envelope::registration("alice2"),
            "alice",
            origin.handle(),
            &registry,
        )
        .await
        .unwrap();

        match try_recv(&mut rxs[0]).expect("rejection") {
            Envelope::CommandResult { payload } => assert_eq!(payload.name, "reject"),
            other => panic!("expected command result, got {:?}", other),
        }
        // Still registered under the original name.
        assert_eq!(registry.lock().await.names(), vec!["alice"]);
    }
}
