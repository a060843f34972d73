//! `Transport` implementations.
//!
//! - **`serial`** – USB-serial link to real hardware (feature `serial`).
//! - **`mock`** – In-memory link driven by a [`mock::MockDevice`] handle.

pub mod mock;
#[cfg(feature = "serial")]
pub mod serial;

pub use mock::{MockDevice, MockTransport};
#[cfg(feature = "serial")]
pub use serial::SerialTransport;
