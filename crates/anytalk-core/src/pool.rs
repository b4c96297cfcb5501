//! Pre-warmed connection pool: a background maintainer keeps one "hot
//! spare" WebSocket ready so the next session starts without paying for
//! a handshake.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use uuid::Uuid;

use crate::config::{Config, ANYTALK_HOST, ANYTALK_PORT};
use crate::error::Result;
use crate::websocket::WebSocket;

const RETRY_BACKOFF: Duration = Duration::from_secs(3);
const CONSUMED_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
const SETTLING_DELAY: Duration = Duration::from_millis(100);

/// Dial the remote ASR endpoint for `config`'s mode, with the auth
/// headers the remote service requires. Used both by the pool maintainer and by
/// `Context`'s on-demand dial when the pool is empty.
pub(crate) fn dial(config: &Config) -> Result<WebSocket> {
    let headers = vec![
        ("X-Api-App-Key".to_string(), config.app_id().to_string()),
        ("X-Api-Access-Key".to_string(), config.access_token().to_string()),
        ("X-Api-Resource-Id".to_string(), config.resource_id().to_string()),
        ("X-Api-Connect-Id".to_string(), Uuid::new_v4().to_string()),
    ];
    WebSocket::connect(ANYTALK_HOST, ANYTALK_PORT, config.mode().path(), &headers)
}

struct Shared {
    config: Config,
    slot: Mutex<Option<WebSocket>>,
    running: AtomicBool,
}

/// Maintains at most one idle pre-connected WebSocket.
pub(crate) struct ConnectionPool {
    shared: Arc<Shared>,
    consumed_tx: Mutex<Option<mpsc::Sender<()>>>,
    maintainer: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("has_spare", &self.shared.slot.lock().expect("pool mutex poisoned").is_some())
            .finish()
    }
}

impl ConnectionPool {
    /// Build an idle pool bound to `config`. Call [`start`](Self::start)
    /// to begin maintaining the spare.
    #[must_use]
    pub(crate) fn new(config: Config) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                slot: Mutex::new(None),
                running: AtomicBool::new(false),
            }),
            consumed_tx: Mutex::new(None),
            maintainer: Mutex::new(None),
        }
    }

    /// Spawn the background maintainer thread.
    pub(crate) fn start(&self) {
        let mut maintainer_guard = self.maintainer.lock().expect("pool mutex poisoned");
        if maintainer_guard.is_some() {
            return;
        }
        self.shared.running.store(true, Ordering::SeqCst);

        let (consumed_tx, consumed_rx) = mpsc::channel();
        *self.consumed_tx.lock().expect("pool mutex poisoned") = Some(consumed_tx);

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("anytalk-pool-maintainer".to_string())
            .spawn(move || maintainer_main(shared, consumed_rx))
            .expect("failed to spawn pool maintainer thread");
        *maintainer_guard = Some(handle);
    }

    /// Stop the maintainer and close any held spare connection.
    pub(crate) fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        // Wake the maintainer out of its timed wait immediately.
        if let Some(tx) = self.consumed_tx.lock().expect("pool mutex poisoned").take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.maintainer.lock().expect("pool mutex poisoned").take() {
            let _ = handle.join();
        }
        if let Some(mut ws) = self.shared.slot.lock().expect("pool mutex poisoned").take() {
            ws.close();
        }
    }

    /// Atomically remove and return the spare, if any, signaling the
    /// maintainer to replenish it. Never blocks.
    pub(crate) fn take(&self) -> Option<WebSocket> {
        let ws = self.shared.slot.lock().expect("pool mutex poisoned").take();
        if ws.is_some() {
            if let Some(tx) = &*self.consumed_tx.lock().expect("pool mutex poisoned") {
                let _ = tx.send(());
            }
        }
        ws
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn maintainer_main(shared: Arc<Shared>, consumed_rx: mpsc::Receiver<()>) {
    while shared.running.load(Ordering::SeqCst) {
        let needs_fill = shared.slot.lock().expect("pool mutex poisoned").is_none();
        if needs_fill {
            match dial(&shared.config) {
                Ok(ws) => {
                    tracing::debug!("pool spare connection ready");
                    *shared.slot.lock().expect("pool mutex poisoned") = Some(ws);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "pool dial failed, retrying");
                    thread::sleep(RETRY_BACKOFF);
                    continue;
                }
            }
        }

        // Acts as both a wakeup (take() signals it) and a periodic
        // health-check window.
        let _ = consumed_rx.recv_timeout(CONSUMED_WAIT_TIMEOUT);
        if !shared.running.load(Ordering::SeqCst) {
            break;
        }
        // Avoid hammering the service on rapid session start/stop cycles.
        thread::sleep(SETTLING_DELAY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pool_has_no_spare_until_started() {
        let pool = ConnectionPool::new(Config::new());
        assert!(pool.take().is_none());
    }

    #[test]
    fn stop_is_idempotent_before_start() {
        let pool = ConnectionPool::new(Config::new());
        pool.stop();
        pool.stop();
    }
}
