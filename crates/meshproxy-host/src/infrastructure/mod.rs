//! Infrastructure layer for the host.
//!
//! Contains the adapters that touch the outside world: the USB-serial port,
//! the configuration file on disk, and the text console.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `meshproxy_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`transport`** – Implementations of the `Transport` port.  The serial
//!   transport is compiled only with the `serial` feature; a
//!   `MockTransport` is always available for tests.
//!
//! - **`storage`** – TOML configuration: where it lives on each platform,
//!   its defaults, and how it maps onto `SessionConfig`.
//!
//! - **`ui_bridge`** – Console front end: parses typed commands into session
//!   calls and renders `SessionEvent`s as text.

pub mod storage;
pub mod transport;
pub mod ui_bridge;
