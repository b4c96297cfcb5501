//! Vendor binary wire protocol, carried inside WebSocket binary
//! messages. All multi-byte integers are big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{AnytalkError, Result};

/// Byte 0: protocol version = 1 (bits 7-4), header size in 4-byte units
/// = 1 (bits 3-0).
const VERSION_AND_HEADER_SIZE: u8 = 0x11;

const MSG_TYPE_FULL_CLIENT_REQUEST: u8 = 0b0001;
const MSG_TYPE_AUDIO_ONLY: u8 = 0b0010;
const MSG_TYPE_FULL_SERVER_RESPONSE: u8 = 0b1001;
const MSG_TYPE_ERROR: u8 = 0b1111;

const FLAG_NO_SEQUENCE: u8 = 0b0000;
const FLAG_LAST_NO_SEQUENCE: u8 = 0b0010;
/// Flags pattern marking the terminal full-server-response frame.
const FLAG_TERMINAL_RESPONSE: u8 = 0b0011;

const SERIALIZATION_JSON: u8 = 0b0001;
const SERIALIZATION_NONE: u8 = 0b0000;
const COMPRESSION_NONE: u8 = 0b0000;

/// Encode the initial "full client request" frame carrying the
/// mode-specific JSON body.
#[must_use]
pub(crate) fn encode_full_client_request(json: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(8 + json.len());
    buf.put_u8(VERSION_AND_HEADER_SIZE);
    buf.put_u8((MSG_TYPE_FULL_CLIENT_REQUEST << 4) | FLAG_NO_SEQUENCE);
    buf.put_u8((SERIALIZATION_JSON << 4) | COMPRESSION_NONE);
    buf.put_u8(0);
    buf.put_u32(json.len() as u32);
    buf.put_slice(json);
    buf.freeze()
}

/// Encode an "audio only" frame. `last` marks the terminal audio marker
/// (the terminal audio marker); its payload may be empty.
#[must_use]
pub(crate) fn encode_audio_only(pcm: &[u8], last: bool) -> Bytes {
    let flags = if last {
        FLAG_LAST_NO_SEQUENCE
    } else {
        FLAG_NO_SEQUENCE
    };
    let mut buf = BytesMut::with_capacity(8 + pcm.len());
    buf.put_u8(VERSION_AND_HEADER_SIZE);
    buf.put_u8((MSG_TYPE_AUDIO_ONLY << 4) | flags);
    buf.put_u8((SERIALIZATION_NONE << 4) | COMPRESSION_NONE);
    buf.put_u8(0);
    buf.put_u32(pcm.len() as u32);
    buf.put_slice(pcm);
    buf.freeze()
}

/// A decoded inbound vendor frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Decoded {
    /// A "full server response": the JSON payload, and whether the
    /// frame flags equal `0011` (the terminal response).
    Response { json: Bytes, terminal: bool },
    /// An "error" frame: vendor numeric code plus UTF-8 message.
    Error { code: u32, message: String },
    /// Any other message type; reported but not acted on.
    Unknown,
}

/// Decode one vendor frame from a WebSocket binary message payload.
pub(crate) fn decode(frame: &[u8]) -> Result<Decoded> {
    if frame.len() < 4 {
        return Err(AnytalkError::Protocol(
            "frame shorter than the 4-byte header".to_string(),
        ));
    }
    let mut buf = Bytes::copy_from_slice(frame);
    buf.advance(1); // version/header-size byte, not needed to interpret
    let byte1 = buf.get_u8();
    let msg_type = byte1 >> 4;
    let flags = byte1 & 0x0F;
    buf.advance(2); // serialization/compression byte + reserved byte

    match msg_type {
        MSG_TYPE_FULL_SERVER_RESPONSE => {
            if buf.remaining() < 4 {
                return Err(AnytalkError::Protocol(
                    "response frame missing sequence field".to_string(),
                ));
            }
            buf.advance(4); // sequence field, unused by this client
            let json = read_length_prefixed(&mut buf)?;
            Ok(Decoded::Response {
                json,
                terminal: flags == FLAG_TERMINAL_RESPONSE,
            })
        }
        MSG_TYPE_ERROR => {
            if buf.remaining() < 4 {
                return Err(AnytalkError::Protocol(
                    "error frame missing error code".to_string(),
                ));
            }
            let code = buf.get_u32();
            let message_bytes = read_length_prefixed(&mut buf)?;
            let message = String::from_utf8_lossy(&message_bytes).into_owned();
            Ok(Decoded::Error { code, message })
        }
        _ => Ok(Decoded::Unknown),
    }
}

fn read_length_prefixed(buf: &mut Bytes) -> Result<Bytes> {
    if buf.remaining() < 4 {
        return Err(AnytalkError::Protocol(
            "missing payload-length field".to_string(),
        ));
    }
    let size = buf.get_u32() as usize;
    if buf.remaining() < size {
        return Err(AnytalkError::Protocol(
            "payload shorter than declared length".to_string(),
        ));
    }
    Ok(buf.copy_to_bytes(size))
}

/// Decode a frame this client itself produced via
/// [`encode_full_client_request`]. Exists for the round-trip property in
/// the round-trip property below; the server never sends this message type to us.
#[must_use]
pub(crate) fn decode_full_client_request(frame: &[u8]) -> Option<Bytes> {
    let mut buf = Bytes::copy_from_slice(frame);
    if buf.remaining() < 4 {
        return None;
    }
    buf.advance(4);
    read_length_prefixed(&mut buf).ok()
}

/// Decode a frame this client itself produced via [`encode_audio_only`].
/// Exists for the round-trip property below.
#[must_use]
pub(crate) fn decode_audio_only(frame: &[u8]) -> Option<(Bytes, bool)> {
    if frame.len() < 2 {
        return None;
    }
    let last = (frame[1] & 0x0F) == FLAG_LAST_NO_SEQUENCE;
    let mut buf = Bytes::copy_from_slice(frame);
    buf.advance(4);
    read_length_prefixed(&mut buf).ok().map(|p| (p, last))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_client_request_round_trips() {
        let json = br#"{"user":{"uid":"anytalk"}}"#;
        let frame = encode_full_client_request(json);
        let decoded = decode_full_client_request(&frame).expect("decodes");
        assert_eq!(decoded.len(), json.len());
        assert_eq!(&decoded[..], json);
    }

    #[test]
    fn audio_only_round_trips_and_preserves_last_flag() {
        let pcm = vec![0x42u8; 1280];
        let frame = encode_audio_only(&pcm, false);
        let (decoded, last) = decode_audio_only(&frame).expect("decodes");
        assert_eq!(&decoded[..], &pcm[..]);
        assert!(!last);

        let terminal = encode_audio_only(&[], true);
        let (decoded, last) = decode_audio_only(&terminal).expect("decodes");
        assert!(decoded.is_empty());
        assert!(last);
    }

    #[test]
    fn decodes_full_server_response_and_terminal_flag() {
        let json = br#"{"result":{"text":"hi"}}"#;
        let mut raw = BytesMut::new();
        raw.put_u8(VERSION_AND_HEADER_SIZE);
        raw.put_u8((MSG_TYPE_FULL_SERVER_RESPONSE << 4) | FLAG_TERMINAL_RESPONSE);
        raw.put_u8((SERIALIZATION_JSON << 4) | COMPRESSION_NONE);
        raw.put_u8(0);
        raw.put_u32(0); // sequence, unused
        raw.put_u32(json.len() as u32);
        raw.put_slice(json);

        match decode(&raw).expect("decodes") {
            Decoded::Response { json: got, terminal } => {
                assert_eq!(&got[..], json);
                assert!(terminal);
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn decodes_error_frame() {
        let message = b"resource exhausted";
        let mut raw = BytesMut::new();
        raw.put_u8(VERSION_AND_HEADER_SIZE);
        raw.put_u8(MSG_TYPE_ERROR << 4);
        raw.put_u8(0);
        raw.put_u8(0);
        raw.put_u32(45_000_002);
        raw.put_u32(message.len() as u32);
        raw.put_slice(message);

        match decode(&raw).expect("decodes") {
            Decoded::Error { code, message: got } => {
                assert_eq!(code, 45_000_002);
                assert_eq!(got, "resource exhausted");
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_message_type_is_reported_not_rejected() {
        let mut raw = BytesMut::new();
        raw.put_u8(VERSION_AND_HEADER_SIZE);
        raw.put_u8(0b0101_0000);
        raw.put_u8(0);
        raw.put_u8(0);
        assert_eq!(decode(&raw).expect("decodes"), Decoded::Unknown);
    }

    #[test]
    fn truncated_header_is_a_protocol_error() {
        assert!(decode(&[0x11, 0x90]).is_err());
    }
}
