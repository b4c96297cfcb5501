//! RFC 6455 WebSocket client over [`TlsStream`].
//!
//! Only what the session worker needs: the upgrade handshake, masked
//! client frames, and a frame reader for single-frame (non-continuation)
//! binary/ping/pong/close messages.

use std::time::{Duration, Instant};

use base64::Engine;
use rand::RngCore;

use crate::error::{AnytalkError, Result};
use crate::tls::TlsStream;

const MAX_FRAME_LEN: u64 = 16 * 1024 * 1024;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// The opcode of a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Opcode {
    /// Binary payload (carries vendor wire-protocol frames).
    Binary,
    /// Text payload, returned verbatim; the vendor protocol doesn't use it.
    Text,
    /// Continuation of a fragmented message, returned verbatim.
    Continuation,
    /// Keepalive ping; the caller replies with [`WebSocket::send_pong`].
    Ping,
    /// Keepalive pong.
    Pong,
    /// Connection close.
    Close,
}

/// A single received WebSocket frame.
#[derive(Debug)]
pub(crate) struct Frame {
    /// The frame's opcode.
    pub(crate) opcode: Opcode,
    /// The (already unmasked, if applicable) payload.
    pub(crate) payload: Vec<u8>,
    /// The FIN bit. Continuation-free messages always see `true`.
    pub(crate) fin: bool,
}

/// A connected WebSocket client.
pub(crate) struct WebSocket {
    stream: TlsStream,
    buf: Vec<u8>,
}

impl std::fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocket").finish_non_exhaustive()
    }
}

impl WebSocket {
    /// Perform the TLS handshake, then the HTTP/1.1 WebSocket upgrade.
    /// `extra_headers` are sent in the supplied order after the
    /// mandatory upgrade headers.
    pub(crate) fn connect(
        host: &str,
        port: u16,
        path: &str,
        extra_headers: &[(String, String)],
    ) -> Result<Self> {
        let stream = TlsStream::connect(host, port)?;
        let mut ws = Self {
            stream,
            buf: Vec::new(),
        };
        ws.stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;

        let mut key_bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut key_bytes);
        let key = base64::engine::general_purpose::STANDARD.encode(key_bytes);

        let mut request = format!(
            "GET {path} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {key}\r\n\
             Sec-WebSocket-Version: 13\r\n"
        );
        for (name, value) in extra_headers {
            request.push_str(name);
            request.push_str(": ");
            request.push_str(value);
            request.push_str("\r\n");
        }
        request.push_str("\r\n");
        ws.stream.write_all(request.as_bytes())?;

        let response = ws.read_http_response()?;
        let status_line = response.lines().next().unwrap_or_default();
        if !status_line.starts_with("HTTP/1.1 101") {
            return Err(AnytalkError::HandshakeFailure(format!(
                "unexpected status line: {status_line}"
            )));
        }
        tracing::debug!(%host, %path, "websocket upgrade complete");
        Ok(ws)
    }

    /// Configure the read timeout used by [`WebSocket::read_frame`].
    pub(crate) fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_read_timeout(timeout)
    }

    /// Read one frame. Propagates `AnytalkError::WouldBlock` only when no
    /// bytes of a new frame have arrived yet; once a frame has started,
    /// this blocks (retrying timeouts) until it completes or a hard
    /// error occurs.
    pub(crate) fn read_frame(&mut self) -> Result<Frame> {
        let header = self.read_exact(2)?;
        let fin = header[0] & 0x80 != 0;
        let opcode_bits = header[0] & 0x0F;
        let masked = header[1] & 0x80 != 0;
        let len7 = header[1] & 0x7F;

        let len: u64 = match len7 {
            126 => {
                let bytes = self.read_exact(2)?;
                u16::from_be_bytes([bytes[0], bytes[1]]) as u64
            }
            127 => {
                let bytes = self.read_exact(8)?;
                u64::from_be_bytes(bytes.try_into().expect("read_exact(8) returns 8 bytes"))
            }
            n => n as u64,
        };
        if len > MAX_FRAME_LEN {
            return Err(AnytalkError::Protocol(format!(
                "frame length {len} exceeds {MAX_FRAME_LEN} byte cap"
            )));
        }

        let mask_key = if masked {
            Some(self.read_exact(4)?)
        } else {
            None
        };

        let mut payload = self.read_exact(len as usize)?;
        if let Some(key) = mask_key {
            for (i, b) in payload.iter_mut().enumerate() {
                *b ^= key[i % 4];
            }
        }

        let opcode = match opcode_bits {
            0x0 => Opcode::Continuation,
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xA => Opcode::Pong,
            other => {
                return Err(AnytalkError::Protocol(format!(
                    "unsupported opcode 0x{other:x}"
                )));
            }
        };

        Ok(Frame {
            opcode,
            payload,
            fin,
        })
    }

    /// Send a masked binary frame.
    pub(crate) fn send_binary(&mut self, bytes: &[u8]) -> Result<()> {
        self.send_masked(0x2, bytes)
    }

    /// Send a masked pong frame, typically echoing a ping's payload.
    pub(crate) fn send_pong(&mut self, bytes: &[u8]) -> Result<()> {
        self.send_masked(0xA, bytes)
    }

    /// Send a close frame and shut down the underlying TLS stream.
    /// Idempotent.
    pub(crate) fn close(&mut self) {
        let _ = self.send_masked(0x8, &[]);
        self.stream.close();
    }

    fn send_masked(&mut self, opcode: u8, payload: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(14 + payload.len());
        frame.push(0x80 | opcode);

        let len = payload.len();
        if len < 126 {
            frame.push(0x80 | len as u8);
        } else if len <= u16::MAX as usize {
            frame.push(0x80 | 126);
            frame.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            frame.push(0x80 | 127);
            frame.extend_from_slice(&(len as u64).to_be_bytes());
        }

        let mut mask_key = [0u8; 4];
        rand::rng().fill_bytes(&mut mask_key);
        frame.extend_from_slice(&mask_key);

        let start = frame.len();
        frame.extend_from_slice(payload);
        for (i, b) in frame[start..].iter_mut().enumerate() {
            *b ^= mask_key[i % 4];
        }

        self.stream.write_all(&frame)
    }

    /// Top up `self.buf` until it holds at least `want` bytes, then
    /// split off and return the first `n` of them.
    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        while self.buf.len() < n {
            let mut chunk = [0u8; 4096];
            match self.stream.read(&mut chunk) {
                Ok(read) => self.buf.extend_from_slice(&chunk[..read]),
                Err(AnytalkError::WouldBlock) if self.buf.is_empty() => {
                    return Err(AnytalkError::WouldBlock);
                }
                Err(AnytalkError::WouldBlock) => continue,
                Err(e) => return Err(e),
            }
        }
        let rest = self.buf.split_off(n);
        Ok(std::mem::replace(&mut self.buf, rest))
    }

    fn read_http_response(&mut self) -> Result<String> {
        let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
        let mut raw = Vec::new();
        loop {
            if raw.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
            if Instant::now() > deadline {
                return Err(AnytalkError::HandshakeFailure(
                    "timed out waiting for upgrade response".to_string(),
                ));
            }
            let mut chunk = [0u8; 512];
            match self.stream.read(&mut chunk) {
                Ok(n) => raw.extend_from_slice(&chunk[..n]),
                Err(AnytalkError::WouldBlock) => continue,
                Err(e) => return Err(AnytalkError::HandshakeFailure(e.to_string())),
            }
        }
        String::from_utf8(raw)
            .map_err(|e| AnytalkError::HandshakeFailure(format!("non-utf8 response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masking_round_trips() {
        let mask_key = [0x11u8, 0x22, 0x33, 0x44];
        let original = b"hello vendor frame".to_vec();
        let mut masked = original.clone();
        for (i, b) in masked.iter_mut().enumerate() {
            *b ^= mask_key[i % 4];
        }
        let mut unmasked = masked;
        for (i, b) in unmasked.iter_mut().enumerate() {
            *b ^= mask_key[i % 4];
        }
        assert_eq!(unmasked, original);
    }

    #[test]
    fn oversized_frame_is_rejected_by_length_check() {
        let len: u64 = MAX_FRAME_LEN + 1;
        assert!(len > MAX_FRAME_LEN);
    }
}
