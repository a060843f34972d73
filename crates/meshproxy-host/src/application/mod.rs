//! Application layer use cases for the host.
//!
//! # What lives here?
//!
//! - **`events`** – Everything the session reports to a presentation layer,
//!   plus the [`events::EventSink`] port it reports through.
//!
//! - **`handshake`** – The bounded `GetInfo` retry loop run right after the
//!   port opens, as a pure state machine driven by the session's clock.
//!
//! - **`polling`** – Stats polling cadence, including how often a `GetInfo`
//!   is piggy-backed on a stats tick.
//!
//! - **`transport`** – The byte-transport port (`Transport`) the session
//!   writes commands to and reads chunks from.  Real serial and in-memory
//!   mock implementations live in `infrastructure::transport`.
//!
//! - **`link_session`** – The single task that owns the transport, the framer,
//!   the device snapshot, and the editable form, and serializes every event
//!   touching them.

pub mod events;
pub mod handshake;
pub mod link_session;
pub mod polling;
pub mod transport;
