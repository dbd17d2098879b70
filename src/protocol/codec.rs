//! Module `codec`
//!
//! Length-prefixed framing over the raw byte stream. TCP gives no message
//! boundaries: one client write can arrive split across reads, and several
//! writes can coalesce into one. Every frame is a 4-byte big-endian length
//! followed by a JSON envelope body, and the decoder buffers partial frames
//! until a whole one is available.

use crate::error::{DecodeError, FramingError};
use crate::protocol::envelope::Envelope;

/// Size of the frame length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Serializes an envelope into a self-describing frame.
///
/// The declared length always equals the body length.
pub fn encode_frame(envelope: &Envelope) -> Result<Vec<u8>, FramingError> {
    let body = serde_json::to_vec(envelope).map_err(FramingError::InvalidJson)?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Incremental frame decoder.
///
/// Feed it whatever the transport produced with [`extend`](Self::extend),
/// then drain complete envelopes with [`next`](Self::next). A length prefix
/// above `max_frame_len` is a fatal framing error; it bounds how much memory
/// a malicious or corrupt peer can make the server buffer.
#[derive(Debug)]
pub struct FrameDecoder {
    max_frame_len: usize,
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            max_frame_len,
            buf: Vec::new(),
        }
    }

    /// Appends freshly read bytes to the internal buffer.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Attempts to decode the next complete envelope.
    ///
    /// Returns `Ok(None)` when more bytes are needed. A
    /// `DecodeError::Framing` means the stream itself is corrupt and the
    /// session must close; a `DecodeError::Envelope` means one well-framed
    /// message was invalid — the frame has already been consumed, so decoding
    /// can continue with the next call.
    pub fn next(&mut self) -> Result<Option<Envelope>, DecodeError> {
        if self.buf.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        prefix.copy_from_slice(&self.buf[..LENGTH_PREFIX_LEN]);
        let body_len = u32::from_be_bytes(prefix) as usize;

        if body_len > self.max_frame_len {
            return Err(FramingError::FrameTooLarge {
                declared: body_len,
                max: self.max_frame_len,
            }
            .into());
        }

        if self.buf.len() < LENGTH_PREFIX_LEN + body_len {
            return Ok(None);
        }

        // Consume the frame before validating its contents so an invalid
        // envelope never wedges the stream.
        let body: Vec<u8> = self
            .buf
            .drain(..LENGTH_PREFIX_LEN + body_len)
            .skip(LENGTH_PREFIX_LEN)
            .collect();

        let text = std::str::from_utf8(&body)
            .map_err(|e| DecodeError::Framing(FramingError::InvalidUtf8(e)))?;
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| DecodeError::Framing(FramingError::InvalidJson(e)))?;

        let envelope = Envelope::from_value(value)?;
        Ok(Some(envelope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MAX: usize = 1024;

    #[test]
    fn round_trips_a_single_frame() {
        let env = Envelope::chat("alice", None, "hi");
        let frame = encode_frame(&env).unwrap();

        let mut decoder = FrameDecoder::new(MAX);
        decoder.extend(&frame);
        assert_eq!(decoder.next().unwrap(), Some(env));
        assert_eq!(decoder.next().unwrap(), None);
    }

    #[test]
    fn declared_length_matches_body() {
        let frame = encode_frame(&Envelope::registration("alice")).unwrap();
        let declared = u32::from_be_bytes(frame[..4].try_into().unwrap()) as usize;
        assert_eq!(declared, frame.len() - LENGTH_PREFIX_LEN);
    }

    #[test]
    fn reassembles_frames_fed_one_byte_at_a_time() {
        let envs = vec![
            Envelope::chat("alice", None, "first"),
            Envelope::chat("alice", Some("bob"), "second"),
            Envelope::registration("carol"),
        ];
        let mut wire = Vec::new();
        for env in &envs {
            wire.extend_from_slice(&encode_frame(env).unwrap());
        }

        let mut decoder = FrameDecoder::new(MAX);
        let mut decoded = Vec::new();
        for byte in wire {
            decoder.extend(&[byte]);
            while let Some(env) = decoder.next().unwrap() {
                decoded.push(env);
            }
        }
        assert_eq!(decoded, envs);
    }

    #[test]
    fn splits_coalesced_frames() {
        let a = Envelope::chat("alice", None, "one");
        let b = Envelope::chat("alice", None, "two");
        let mut wire = encode_frame(&a).unwrap();
        wire.extend_from_slice(&encode_frame(&b).unwrap());

        // Both frames arrive in a single read.
        let mut decoder = FrameDecoder::new(MAX);
        decoder.extend(&wire);
        assert_eq!(decoder.next().unwrap(), Some(a));
        assert_eq!(decoder.next().unwrap(), Some(b));
        assert_eq!(decoder.next().unwrap(), None);
    }

    #[test]
    fn oversize_prefix_is_a_fatal_framing_error() {
        let mut decoder = FrameDecoder::new(16);
        decoder.extend(&1024u32.to_be_bytes());
        match decoder.next() {
            Err(DecodeError::Framing(FramingError::FrameTooLarge { declared, max })) => {
                assert_eq!(declared, 1024);
                assert_eq!(max, 16);
            }
            other => panic!("expected FrameTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn non_json_body_is_a_fatal_framing_error() {
        let body = b"not json at all";
        let mut decoder = FrameDecoder::new(MAX);
        decoder.extend(&(body.len() as u32).to_be_bytes());
        decoder.extend(body);
        assert!(matches!(
            decoder.next(),
            Err(DecodeError::Framing(FramingError::InvalidJson(_)))
        ));
    }

    #[test]
    fn invalid_envelope_is_rejected_without_wedging_the_stream() {
        let bad = serde_json::to_vec(&json!({"kind": "chat", "payload": {}})).unwrap();
        let good = Envelope::chat("alice", None, "still here");

        let mut decoder = FrameDecoder::new(MAX);
        decoder.extend(&(bad.len() as u32).to_be_bytes());
        decoder.extend(&bad);
        decoder.extend(&encode_frame(&good).unwrap());

        assert!(matches!(
            decoder.next(),
            Err(DecodeError::Envelope(_))
        ));
        // The bad frame was consumed; the next one decodes normally.
        assert_eq!(decoder.next().unwrap(), Some(good));
    }
}
