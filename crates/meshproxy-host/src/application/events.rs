//! Session events and the sink they are delivered to.
//!
//! The session never prints anything itself.  Every state change a user
//! might care about is turned into a [`SessionEvent`] and handed to an
//! [`EventSink`]; the console bridge renders them, tests collect them.

use std::fmt;

use tokio::sync::mpsc;

use meshproxy_core::domain::settings::EditableSettings;
use meshproxy_core::domain::snapshot::DeviceSnapshot;
use meshproxy_core::domain::status::DerivedStatus;
use meshproxy_core::protocol::messages::{RxPacket, Stats};

/// Where the link is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionPhase::Disconnected => f.write_str("Disconnected"),
            ConnectionPhase::Connecting => f.write_str("Connecting"),
            ConnectionPhase::Connected => f.write_str("Connected"),
        }
    }
}

/// Severity of a user-visible log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Console-only chatter such as per-packet `RX:`/`TX:` traces.
    Debug,
    Info,
    Success,
    Warning,
    Error,
}

/// Something the session wants the presentation layer to know.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ConnectionChanged(ConnectionPhase),
    /// A fresh InfoReply was applied; carries the whole read-only state.
    InfoUpdated(DeviceSnapshot),
    /// The editable form was overwritten from device state.
    FormReset(EditableSettings),
    StatsUpdated(Stats),
    PacketReceived(RxPacket),
    /// Text of an Error frame, verbatim.  May be empty.
    ErrorReceived(String),
    LogLine { level: LogLevel, text: String },
    StatusRefreshed(DerivedStatus),
    /// Every handshake attempt went unanswered.  Fired at most once per
    /// connection.
    HandshakeTimedOut,
    /// The transport died; the session has already torn the link down.
    TransportFailed(String),
}

/// Port through which the session publishes [`SessionEvent`]s.
///
/// `emit` must not block: it is called from inside the session task.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send {
    fn emit(&self, event: SessionEvent);
}

/// The usual sink: an unbounded channel read by the presentation layer.
///
/// A dropped receiver just means nobody is watching, so send errors are
/// ignored.
impl EventSink for mpsc::UnboundedSender<SessionEvent> {
    fn emit(&self, event: SessionEvent) {
        let _ = self.send(event);
    }
}
