//! Blocking TCP+TLS client stream.
//!
//! `TlsStream` is the sole owner of its socket, SSL session, and any
//! buffered bytes. All other layers only
//! ever see `connect`/`set_read_timeout`/`read`/`write_all`/`close`.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};

use crate::error::{AnytalkError, Result};

/// A connected, handshake-complete TLS stream over a blocking TCP socket.
pub(crate) struct TlsStream {
    inner: StreamOwned<ClientConnection, TcpStream>,
    closed: bool,
}

impl std::fmt::Debug for TlsStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsStream").field("closed", &self.closed).finish()
    }
}

impl TlsStream {
    /// Resolve `host`, open a TCP socket, and complete a TLS client
    /// handshake with SNI set to `host` and hostname verification against
    /// the platform trust store.
    pub(crate) fn connect(host: &str, port: u16) -> Result<Self> {
        let mut addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| AnytalkError::DialFailure(format!("dns resolution failed: {e}")))?;
        let addr = addrs
            .next()
            .ok_or_else(|| AnytalkError::DialFailure(format!("no addresses found for {host}")))?;

        let tcp = TcpStream::connect(addr)
            .map_err(|e| AnytalkError::DialFailure(format!("tcp connect failed: {e}")))?;
        tcp.set_nodelay(true)
            .map_err(|e| AnytalkError::DialFailure(format!("tcp setup failed: {e}")))?;

        let config = ClientConfig::builder()
            .with_root_certificates(native_root_store()?)
            .with_no_client_auth();

        let server_name = ServerName::try_from(host.to_owned())
            .map_err(|e| AnytalkError::TlsFailure(format!("invalid hostname {host}: {e}")))?;

        let conn = ClientConnection::new(Arc::new(config), server_name)
            .map_err(|e| AnytalkError::TlsFailure(format!("handshake setup failed: {e}")))?;

        let mut stream = Self {
            inner: StreamOwned::new(conn, tcp),
            closed: false,
        };
        // StreamOwned defers the handshake to the first read/write; force
        // it now so `connect` fails fast on a bad certificate.
        stream
            .inner
            .conn
            .complete_io(&mut stream.inner.sock)
            .map_err(|e| AnytalkError::TlsFailure(format!("tls handshake failed: {e}")))?;

        tracing::debug!(%host, port, "tls handshake complete");
        Ok(stream)
    }

    /// Configure the socket receive timeout. `None` disables the timeout.
    pub(crate) fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner
            .get_ref()
            .set_read_timeout(timeout)
            .map_err(AnytalkError::from_io)
    }

    /// Read up to `buf.len()` bytes. Returns `AnytalkError::WouldBlock` on
    /// a read-timeout and `AnytalkError::ConnectionClosed` on EOF; never
    /// returns `Ok(0)`.
    pub(crate) fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.inner.read(buf) {
            Ok(0) => Err(AnytalkError::ConnectionClosed),
            Ok(n) => Ok(n),
            Err(e) => Err(AnytalkError::from_io(e)),
        }
    }

    /// Write the entire buffer, blocking until done.
    pub(crate) fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.inner
            .write_all(buf)
            .map_err(|e| AnytalkError::TlsFailure(format!("tls write failed: {e}")))
    }

    /// Shut down the socket. Idempotent.
    pub(crate) fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.inner.sock.shutdown(Shutdown::Both);
    }
}

impl Drop for TlsStream {
    fn drop(&mut self) {
        self.close();
    }
}

fn native_root_store() -> Result<RootCertStore> {
    let mut store = RootCertStore::empty();
    let loaded = rustls_native_certs::load_native_certs();
    for cert in loaded.certs {
        // A handful of platform certs are routinely unparsable by rustls;
        // skip them rather than failing the whole store.
        let _ = store.add(cert);
    }
    if store.is_empty() {
        return Err(AnytalkError::TlsFailure(
            "no trusted root certificates available".to_string(),
        ));
    }
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_root_store_is_non_empty_on_this_platform() {
        // Exercises the trust-store loading path without any network I/O.
        assert!(native_root_store().is_ok());
    }
}
