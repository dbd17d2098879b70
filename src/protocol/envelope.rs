//! Module `envelope`
//!
//! Defines the tagged `Envelope` enum and its per-kind payloads. The `kind`
//! field is the wire discriminant; each kind carries exactly the fields it
//! needs, so a structurally wrong message fails deserialization instead of
//! being guessed at with optional-key lookups.

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EnvelopeError;

/// Sender name used for server-originated notices (join broadcasts).
pub const SERVER_NAME: &str = "server";

/// Timestamp format inherited from the wire protocol: `10/24/2023, 18:02:11`.
const TIMESTAMP_FORMAT: &str = "%m/%d/%Y, %H:%M:%S";

/// One logical unit of communication between client and server.
///
/// `sender` and `timestamp` on `Chat` are set by the server at receipt;
/// values supplied by the client are discarded during routing so a client can
/// never speak as someone else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Envelope {
    Registration {
        payload: RegistrationPayload,
    },
    RegistrationAck {
        payload: RegistrationAckPayload,
    },
    Chat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recipient: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
        payload: ChatPayload,
    },
    Command {
        payload: CommandPayload,
    },
    CommandResult {
        payload: CommandResultPayload,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationPayload {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationAckPayload {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResultPayload {
    pub name: String,
    pub result: Value,
}

impl Envelope {
    /// Builds a registration request for `name`.
    pub fn registration(name: &str) -> Self {
        Envelope::Registration {
            payload: RegistrationPayload {
                name: name.to_string(),
            },
        }
    }

    /// Builds a successful registration acknowledgment.
    pub fn ack_success() -> Self {
        Envelope::RegistrationAck {
            payload: RegistrationAckPayload {
                success: true,
                reason: None,
            },
        }
    }

    /// Builds a failed registration acknowledgment carrying the refusal
    /// reason.
    pub fn ack_failure(reason: &str) -> Self {
        Envelope::RegistrationAck {
            payload: RegistrationAckPayload {
                success: false,
                reason: Some(reason.to_string()),
            },
        }
    }

    /// Builds a server-stamped chat envelope ready for delivery.
    pub fn chat(sender: &str, recipient: Option<&str>, text: &str) -> Self {
        Envelope::Chat {
            sender: Some(sender.to_string()),
            recipient: recipient.map(str::to_string),
            timestamp: Some(wire_timestamp()),
            payload: ChatPayload {
                text: text.to_string(),
            },
        }
    }

    /// Builds the join notice broadcast when a client registers.
    pub fn join_notice(name: &str) -> Self {
        Envelope::chat(SERVER_NAME, None, &format!("{} registered", name))
    }

    /// Builds a command result addressed back to the requester.
    pub fn command_result(name: &str, result: Value) -> Self {
        Envelope::CommandResult {
            payload: CommandResultPayload {
                name: name.to_string(),
                result,
            },
        }
    }

    /// Validates a decoded JSON value as an envelope.
    ///
    /// Failures here are message-level, not stream-level: the frame was
    /// well-formed, its contents were not.
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        serde_json::from_value(value).map_err(EnvelopeError)
    }

    /// Wire discriminant of this envelope, for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Registration { .. } => "registration",
            Envelope::RegistrationAck { .. } => "registration_ack",
            Envelope::Chat { .. } => "chat",
            Envelope::Command { .. } => "command",
            Envelope::CommandResult { .. } => "command_result",
        }
    }
}

/// Current server time in the wire timestamp format.
pub fn wire_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}
