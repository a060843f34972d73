//! USB-serial transport.
//!
//! # Threading model
//!
//! The `serialport` crate is blocking.  Opening and writing are short, so
//! they run on Tokio's blocking pool via `spawn_blocking`.  Reading is a
//! loop, so it gets its own OS thread: the port is cloned, the clone is moved
//! into the reader thread, and each chunk it reads is forwarded through a
//! bounded channel that the session awaits.
//!
//! The reader uses a short read timeout so it can notice the stop flag.
//! [`SerialTransport::close`] sets that flag and joins the thread, so once
//! `close` returns no further chunks can be produced.
//!
//! # Line settings
//!
//! 8 data bits, no parity, 1 stop bit, no flow control.  DTR and RTS are
//! asserted after opening because boards with native USB only start
//! talking once the host signals that a terminal is present.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use serialport::SerialPort;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::application::transport::{InboundChunks, Transport, TransportError};

/// Default line rate of the gateway firmware.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

const READ_BUFFER_SIZE: usize = 256;
const INBOUND_CAPACITY: usize = 64;

struct ReaderThread {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// A [`Transport`] over a local serial port.
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
    read_timeout: Duration,
    writer: Option<Arc<Mutex<Box<dyn SerialPort>>>>,
    reader: Option<ReaderThread>,
}

impl SerialTransport {
    pub fn new(port_name: impl Into<String>, baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            read_timeout,
            writer: None,
            reader: None,
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&mut self) -> Result<InboundChunks, TransportError> {
        if self.writer.is_some() {
            return Err(TransportError::AlreadyOpen);
        }

        let (name, baud, timeout) = (self.port_name.clone(), self.baud_rate, self.read_timeout);
        let port = tokio::task::spawn_blocking(move || open_port(&name, baud, timeout))
            .await
            .map_err(|e| TransportError::Io(io::Error::new(io::ErrorKind::Other, e)))??;
        let reader_port = port.try_clone().map_err(|e| TransportError::Open {
            port: self.port_name.clone(),
            reason: format!("cannot clone port handle: {e}"),
        })?;

        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("meshproxy-serial-rx".to_string())
            .spawn(move || read_loop(reader_port, tx, thread_stop))?;

        debug!(port = %self.port_name, baud = self.baud_rate, "serial port open");
        self.writer = Some(Arc::new(Mutex::new(port)));
        self.reader = Some(ReaderThread { stop, handle });
        Ok(rx)
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self.writer.clone().ok_or(TransportError::NotOpen)?;
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || -> Result<(), TransportError> {
            let mut port = port
                .lock()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "serial writer lock poisoned"))?;
            port.write_all(&bytes)?;
            port.flush()?;
            Ok(())
        })
        .await
        .map_err(|e| TransportError::Io(io::Error::new(io::ErrorKind::Other, e)))?
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.writer = None;
        let Some(reader) = self.reader.take() else {
            return Ok(());
        };
        reader.stop.store(true, Ordering::Relaxed);
        let joined = tokio::task::spawn_blocking(move || reader.handle.join())
            .await
            .map_err(|e| TransportError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
        if joined.is_err() {
            warn!(port = %self.port_name, "serial reader thread panicked");
            return Err(TransportError::ReaderPanicked);
        }
        debug!(port = %self.port_name, "serial port closed");
        Ok(())
    }

    fn describe(&self) -> String {
        self.port_name.clone()
    }
}

fn open_port(
    port_name: &str,
    baud_rate: u32,
    read_timeout: Duration,
) -> Result<Box<dyn SerialPort>, TransportError> {
    let builder = serialport::new(port_name, baud_rate)
        .timeout(read_timeout)
        .flow_control(serialport::FlowControl::None);
    #[cfg(unix)]
    let builder = builder
        .data_bits(serialport::DataBits::Eight)
        .stop_bits(serialport::StopBits::One)
        .parity(serialport::Parity::None);

    let mut port = builder.open().map_err(|e| TransportError::Open {
        port: port_name.to_string(),
        reason: e.to_string(),
    })?;
    if let Err(e) = port.write_data_terminal_ready(true) {
        debug!("could not assert DTR on {port_name}: {e}");
    }
    if let Err(e) = port.write_request_to_send(true) {
        debug!("could not assert RTS on {port_name}: {e}");
    }
    Ok(port)
}

/// Body of the reader thread.  Exits when stopped, when the receiver is
/// dropped, or after forwarding a fatal read error.
fn read_loop(
    mut port: Box<dyn SerialPort>,
    tx: mpsc::Sender<Result<Vec<u8>, TransportError>>,
    stop: Arc<AtomicBool>,
) {
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    while !stop.load(Ordering::Relaxed) {
        match port.read(&mut buffer) {
            Ok(0) => continue,
            Ok(n) => {
                trace!(bytes = n, "serial read");
                if tx.blocking_send(Ok(buffer[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::Interrupted) => {
                continue;
            }
            Err(e) => {
                if !stop.load(Ordering::Relaxed) {
                    let _ = tx.blocking_send(Err(TransportError::Io(e)));
                }
                break;
            }
        }
    }
    debug!("serial reader stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_before_open_fails() {
        let mut transport = SerialTransport::new("/dev/null-meshproxy", DEFAULT_BAUD_RATE, Duration::from_millis(100));
        assert!(matches!(
            transport.write(&[0x01, 0x00]).await,
            Err(TransportError::NotOpen)
        ));
    }

    #[tokio::test]
    async fn test_close_without_open_is_noop() {
        let mut transport = SerialTransport::new("/dev/null-meshproxy", DEFAULT_BAUD_RATE, Duration::from_millis(100));
        tokio_test::assert_ok!(transport.close().await);
    }

    #[tokio::test]
    async fn test_open_missing_port_reports_port_name() {
        let mut transport = SerialTransport::new("/dev/meshproxy-does-not-exist", DEFAULT_BAUD_RATE, Duration::from_millis(100));
        match transport.open().await {
            Err(TransportError::Open { port, .. }) => {
                assert_eq!(port, "/dev/meshproxy-does-not-exist")
            }
            other => panic!("expected open failure, got {:?}", other.map(|_| ())),
        }
        assert_eq!(transport.describe(), "/dev/meshproxy-does-not-exist");
    }
}
