//! Domain entities for the MeshProxy host.
//!
//! This module contains pure state and rules with no infrastructure
//! dependencies: no serial port, no runtime, no terminal.
//!
//! # What lives here? (for beginners)
//!
//! The host keeps three views of the gateway:
//!
//! - [`snapshot::DeviceSnapshot`] – the canonical, last-known device state.
//!   Only successfully decoded InfoReply, Stats and RxPacket messages write
//!   to it.
//! - [`settings::EditableSettings`] – the values the user is editing.  While
//!   the user has unsaved edits ("dirty form") device updates must not
//!   overwrite these, even though the snapshot keeps updating.
//! - [`status::DerivedStatus`] – display values recomputed on a timer from
//!   the snapshot alone (activity, uptime, which slots heard traffic recently).

/// Canonical device state fed by decoded messages.
pub mod snapshot;

/// User-editable radio settings and the commands that apply them.
pub mod settings;

/// Derived, display-only status.
pub mod status;
