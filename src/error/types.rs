//! Error types
//!
//! Defines domain-specific error types for each module of the chat relay
//! server.

use std::fmt;
use std::io;

/// Registry module errors
#[derive(Debug)]
pub enum RegistryError {
    DuplicateName(String),
    NotFound(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateName(n) => write!(f, "Name already registered: {}", n),
            RegistryError::NotFound(n) => write!(f, "No registered client named: {}", n),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Fatal framing errors; the stream is no longer trustworthy past one of
/// these, so the session closes.
#[derive(Debug)]
pub enum FramingError {
    FrameTooLarge { declared: usize, max: usize },
    InvalidUtf8(std::str::Utf8Error),
    InvalidJson(serde_json::Error),
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingError::FrameTooLarge { declared, max } => {
                write!(f, "Frame length {} exceeds maximum {}", declared, max)
            }
            FramingError::InvalidUtf8(e) => write!(f, "Frame body is not valid UTF-8: {}", e),
            FramingError::InvalidJson(e) => write!(f, "Frame body is not valid JSON: {}", e),
        }
    }
}

impl std::error::Error for FramingError {}

/// Non-fatal envelope errors: the frame was well-formed JSON but not a valid
/// envelope (unknown kind, missing required fields). The message is rejected
/// and the session continues.
#[derive(Debug)]
pub struct EnvelopeError(pub serde_json::Error);

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid envelope: {}", self.0)
    }
}

impl std::error::Error for EnvelopeError {}

/// Outcome of one decode attempt that did not produce an envelope.
#[derive(Debug)]
pub enum DecodeError {
    Framing(FramingError),
    Envelope(EnvelopeError),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Framing(e) => write!(f, "Framing error: {}", e),
            DecodeError::Envelope(e) => write!(f, "Envelope error: {}", e),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<FramingError> for DecodeError {
    fn from(error: FramingError) -> Self {
        DecodeError::Framing(error)
    }
}

impl From<EnvelopeError> for DecodeError {
    fn from(error: EnvelopeError) -> Self {
        DecodeError::Envelope(error)
    }
}

/// Session module errors
#[derive(Debug)]
pub enum SessionError {
    Transport(io::Error),
    Framing(FramingError),
    HandleClosed(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Transport(e) => write!(f, "Transport error: {}", e),
            SessionError::Framing(e) => write!(f, "Framing error: {}", e),
            SessionError::HandleClosed(n) => {
                write!(f, "Connection handle closed: {}", n)
            }
        }
    }
}

impl std::error::Error for SessionError {}

impl From<io::Error> for SessionError {
    fn from(error: io::Error) -> Self {
        SessionError::Transport(error)
    }
}

impl From<FramingError> for SessionError {
    fn from(error: FramingError) -> Self {
        SessionError::Framing(error)
    }
}

/// General server error that encompasses all error types
#[derive(Debug)]
pub enum ChatServerError {
    Registry(RegistryError),
    Framing(FramingError),
    Envelope(EnvelopeError),
    Session(SessionError),
    IoError(io::Error),
    ConfigError(config::ConfigError),
}

impl fmt::Display for ChatServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatServerError::Registry(e) => write!(f, "Registry error: {}", e),
            ChatServerError::Framing(e) => write!(f, "Framing error: {}", e),
            ChatServerError::Envelope(e) => write!(f, "Envelope error: {}", e),
            ChatServerError::Session(e) => write!(f, "Session error: {}", e),
            ChatServerError::IoError(e) => write!(f, "I/O error: {}", e),
            ChatServerError::ConfigError(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl std::error::Error for ChatServerError {}

impl From<RegistryError> for ChatServerError {
    fn from(error: RegistryError) -> Self {
        ChatServerError::Registry(error)
    }
}

impl From<FramingError> for ChatServerError {
    fn from(error: FramingError) -> Self {
        ChatServerError::Framing(error)
    }
}

impl From<EnvelopeError> for ChatServerError {
    fn from(error: EnvelopeError) -> Self {
        ChatServerError::Envelope(error)
    }
}

impl From<SessionError> for ChatServerError {
    fn from(error: SessionError) -> Self {
        ChatServerError::Session(error)
    }
}

impl From<io::Error> for ChatServerError {
    fn from(error: io::Error) -> Self {
        ChatServerError::IoError(error)
    }
}

impl From<config::ConfigError> for ChatServerError {
    fn from(error: config::ConfigError) -> Self {
        ChatServerError::ConfigError(error)
    }
}
