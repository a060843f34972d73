//! meshproxy-host library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does meshproxy-host do? (for beginners)
//!
//! The MeshProxy gateway is a small LoRa board that listens for packets of one
//! mesh protocol (MeshCore or Meshtastic), converts them, and retransmits them
//! in the other.  It is plugged into a computer over USB, where it shows up as
//! a serial port.  This crate is the program running on that computer.
//!
//! The host:
//!
//! 1. Opens the serial port and asks the device who it is (`GetInfo`),
//!    retrying a few times because freshly-reset boards are slow to answer.
//! 2. Polls statistics once a second and device info every few seconds.
//! 3. Decodes everything the device sends (radio settings, counters, received
//!    packets, errors, and debug text) into one snapshot of device state.
//! 4. Lets the user edit settings and writes them back, without ever letting
//!    a background poll overwrite an edit that has not been saved yet.

/// Application layer: the link session state machine and its ports.
pub mod application;

/// Infrastructure layer: transports, configuration storage, and the console bridge.
pub mod infrastructure;
