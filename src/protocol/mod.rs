//! Wire protocol
//!
//! Envelope definitions and the length-prefixed frame codec. Everything that
//! understands bytes-on-the-wire lives here; the rest of the server only ever
//! sees whole envelopes.

pub mod codec;
pub mod envelope;

pub use codec::{FrameDecoder, encode_frame};
pub use envelope::{
    ChatPayload, CommandPayload, CommandResultPayload, Envelope, RegistrationAckPayload,
    RegistrationPayload, SERVER_NAME,
};
