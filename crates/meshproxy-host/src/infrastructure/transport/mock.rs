//! In-memory transport for tests.
//!
//! # How it works
//!
//! [`MockTransport::new`] returns two halves that share one state block:
//!
//! - the [`MockTransport`], which is boxed and handed to the session, and
//! - a [`MockDevice`], which the test keeps and uses to play the gateway:
//!   push inbound bytes, inject read errors, hang up, and inspect every
//!   write the session made.
//!
//! Writes are recorded in order in a `Mutex<Vec<...>>` so assertions can see
//! exactly which command bytes went out.
//!
//! # Failure switches
//!
//! `set_fail_open`, `set_fail_writes` and `set_fail_close` make the matching
//! operation return an error, for exercising the session's error paths.
//!
//! ```ignore
//! let (transport, device) = MockTransport::new();
//! let (handle, _task) = LinkSession::new(Box::new(transport), ...).spawn();
//!
//! handle.connect().await?;
//! device.push(&info_reply_bytes).await;
//! assert_eq!(device.command_ids(), vec![0x01]);
//! ```

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::application::transport::{InboundChunks, Transport, TransportError};

const INBOUND_CAPACITY: usize = 64;

#[derive(Default)]
struct Shared {
    inbound: Option<mpsc::Sender<Result<Vec<u8>, TransportError>>>,
    writes: Vec<Vec<u8>>,
    open_count: u32,
    close_count: u32,
    fail_open: bool,
    fail_writes: bool,
    fail_close: bool,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The session-facing half of the mock link.
pub struct MockTransport {
    shared: Arc<Mutex<Shared>>,
}

/// The test-facing half of the mock link.
#[derive(Clone)]
pub struct MockDevice {
    shared: Arc<Mutex<Shared>>,
}

impl MockTransport {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (MockTransport, MockDevice) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            MockTransport {
                shared: Arc::clone(&shared),
            },
            MockDevice { shared },
        )
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&mut self) -> Result<InboundChunks, TransportError> {
        let mut shared = lock(&self.shared);
        if shared.fail_open {
            return Err(TransportError::Open {
                port: "mock".to_string(),
                reason: "simulated open failure".to_string(),
            });
        }
        if shared.inbound.is_some() {
            return Err(TransportError::AlreadyOpen);
        }
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        shared.inbound = Some(tx);
        shared.open_count += 1;
        Ok(rx)
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut shared = lock(&self.shared);
        if shared.inbound.is_none() {
            return Err(TransportError::NotOpen);
        }
        if shared.fail_writes {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated write failure",
            )));
        }
        shared.writes.push(bytes.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let mut shared = lock(&self.shared);
        shared.close_count += 1;
        shared.inbound = None;
        if shared.fail_close {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::Other,
                "simulated close failure",
            )));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

impl MockDevice {
    /// Delivers `bytes` as one inbound chunk.  Returns `false` if the link is
    /// not open.
    pub async fn push(&self, bytes: &[u8]) -> bool {
        self.deliver(Ok(bytes.to_vec())).await
    }

    /// Delivers a terminal read error.
    pub async fn push_error(&self, error: TransportError) -> bool {
        self.deliver(Err(error)).await
    }

    /// Ends the inbound stream, as if the cable were pulled.
    pub fn hang_up(&self) {
        lock(&self.shared).inbound = None;
    }

    pub fn is_open(&self) -> bool {
        lock(&self.shared).inbound.is_some()
    }

    /// Every write so far, one entry per `write` call.
    pub fn written(&self) -> Vec<Vec<u8>> {
        lock(&self.shared).writes.clone()
    }

    /// The command id (first byte) of every write so far.
    pub fn command_ids(&self) -> Vec<u8> {
        lock(&self.shared)
            .writes
            .iter()
            .filter_map(|w| w.first().copied())
            .collect()
    }

    pub fn clear_written(&self) {
        lock(&self.shared).writes.clear();
    }

    pub fn open_count(&self) -> u32 {
        lock(&self.shared).open_count
    }

    pub fn close_count(&self) -> u32 {
        lock(&self.shared).close_count
    }

    pub fn set_fail_open(&self, fail: bool) {
        lock(&self.shared).fail_open = fail;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        lock(&self.shared).fail_writes = fail;
    }

    pub fn set_fail_close(&self, fail: bool) {
        lock(&self.shared).fail_close = fail;
    }

    async fn deliver(&self, item: Result<Vec<u8>, TransportError>) -> bool {
        // Clone the sender out so the lock is not held across the await.
        let sender = lock(&self.shared).inbound.clone();
        match sender {
            Some(tx) => tx.send(item).await.is_ok(),
            None => false,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
