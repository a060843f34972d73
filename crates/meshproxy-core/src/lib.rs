//! # meshproxy-core
//!
//! Shared library for the MeshProxy host tools containing the serial wire
//! framer, the response decoder, the outbound command set, and the
//! device-state model the host keeps about the gateway.
//!
//! It has zero dependencies on serial ports, async runtimes, or terminals,
//! so everything here can be unit-tested with plain byte slices.
//!
//! # Architecture overview (for beginners)
//!
//! MeshProxy is a LoRa gateway that listens on one mesh protocol (MeshCore or
//! Meshtastic) and re-transmits converted packets on the other.  A host
//! program talks to it over USB serial to read its configuration, watch its
//! traffic counters, and change its radio settings.
//!
//! This crate (`meshproxy-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – How bytes travel over the serial link.  Every message is
//!   a tiny `[tag][len][payload]` frame.  The [`FrameCodec`] pulls frames out
//!   of a stream that also carries free-text firmware prints, and
//!   [`decode_message`] turns each frame into a typed [`DeviceMessage`].
//!
//! - **`domain`** – Pure state with no I/O.  [`DeviceSnapshot`] is the host's
//!   last-known copy of the device, [`EditableSettings`] is what the user is
//!   allowed to change, and [`compute_status`] derives the live status line
//!   (activity, uptime, recently-active slots) from those.

pub mod domain;
pub mod protocol;

pub use domain::settings::{EditableSettings, FormError, SlotParams};
pub use domain::snapshot::{DeviceSnapshot, LastPacket, SlotState};
pub use domain::status::{compute_status, format_uptime, Activity, DerivedStatus};
pub use protocol::codec::{decode_message, encode_command, ProtocolError};
pub use protocol::framer::{encode_frame, FeedOutput, FrameCodec};
pub use protocol::messages::{Command, DeviceMessage, Frame, ProtocolId};
