//! Byte-transport port used by the link session.
//!
//! The session does not care whether bytes travel over a real USB-serial
//! port or an in-memory test double.  It only needs to open the link, write
//! whole encoded commands, and receive inbound chunks in arrival order.
//!
//! Inbound data is delivered through a channel rather than a `read` method so
//! the session can wait on it inside `tokio::select!` alongside its timers
//! and commands.  The channel ends (returns `None`) when the far side hangs
//! up; a terminal read error is delivered as one final `Err` item.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Inbound chunks in arrival order.
pub type InboundChunks = mpsc::Receiver<Result<Vec<u8>, TransportError>>;

/// Errors raised by [`Transport`] implementations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The port could not be opened (missing device, permission denied, busy).
    #[error("failed to open {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("transport is not open")]
    NotOpen,

    #[error("transport is already open")]
    AlreadyOpen,

    /// The inbound stream ended.
    #[error("device closed the connection")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial reader thread panicked")]
    ReaderPanicked,
}

/// A bidirectional byte link to the gateway.
#[async_trait]
pub trait Transport: Send {
    /// Opens the link and returns the inbound chunk stream.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::AlreadyOpen`] if called twice without a
    /// [`close`](Self::close) in between.
    async fn open(&mut self) -> Result<InboundChunks, TransportError>;

    /// Writes `bytes` in full.
    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Closes the link.  Once this returns no further inbound chunks are
    /// produced.  Closing a link that is not open is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Human-readable name of the link, e.g. the serial port path.
    fn describe(&self) -> String;
}
