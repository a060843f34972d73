//! Binary codec for MeshProxy gateway messages.
//!
//! Wire format:
//! ```text
//! [tag:1][len:1][payload:len]
//! ```
//! All multi-byte integers are little-endian.  Framing (finding where one
//! message ends and the next begins) is handled by [`crate::protocol::framer`];
//! this module only turns a single tag + payload into a typed message and back.
//!
//! # Payload layouts
//!
//! | Tag    | Message   | Layout |
//! |--------|-----------|--------|
//! | `0x81` | InfoReply | `major, minor, freqA u32, freqB u32, interval, protocol[, bwA, bwB, mode, platform]` |
//! | `0x82` | Stats     | `rxA, rxB, txA, txB, conversion_errors[, parse_errors]` (u32 each) |
//! | `0x83` | RxPacket  | `protocol u8, rssi i16, snr i8, len u8, data[len]` |
//! | `0x84` | Error     | UTF-8 text |
//! | `0x85` | DebugLog  | UTF-8 text |

use thiserror::Error;

use crate::protocol::framer::encode_frame;
use crate::protocol::messages::{
    Command, DeviceMessage, FirmwareVersion, Frame, InfoReply, Platform, ProtocolId,
    ResponseTag, RxPacket, Stats, INFO_REPLY_EXTENDED_LEN, INFO_REPLY_MIN_LEN,
    PROTOCOL_SLOT_COUNT, RX_PACKET_HEADER_LEN, STATS_EXTENDED_LEN, STATS_MIN_LEN,
};

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// An outbound payload exceeds the protocol-wide maximum.
    #[error("payload too long: {len} bytes exceeds the {max}-byte maximum")]
    PayloadTooLong { len: usize, max: usize },

    /// The tag byte is not one of the recognized response tags.
    #[error("unknown response tag: 0x{0:02X}")]
    UnknownTag(u8),

    /// The payload is shorter than the minimum for its message type.
    #[error("{context}: need at least {needed} bytes, got {available}")]
    InsufficientData {
        context: &'static str,
        needed: usize,
        available: usize,
    },

    /// An inner length field claims more bytes than the payload holds.
    #[error("payload length mismatch: declared {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Command`] into wire bytes, header included.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLong`] if the payload would exceed
/// [`crate::protocol::MAX_PAYLOAD_LEN`].  None of the built-in commands come close, but the
/// check is shared with [`encode_frame`].
///
/// # Examples
///
/// ```rust
/// use meshproxy_core::protocol::{encode_command, Command};
///
/// let bytes = encode_command(&Command::SetSwitchInterval(0)).unwrap();
/// assert_eq!(bytes, vec![0x07, 2, 0, 0]);
/// ```
pub fn encode_command(cmd: &Command) -> Result<Vec<u8>, ProtocolError> {
    encode_frame(cmd.id() as u8, &cmd.payload())
}

/// Decodes a single tag + payload into a [`DeviceMessage`].
///
/// Never returns a partially-filled message: a payload shorter than its
/// tag's minimum is an error, not a zero-padded struct.
///
/// # Errors
///
/// Returns [`ProtocolError`] for unknown tags, short payloads, or an RxPacket
/// whose declared data length runs past the end of the payload.
///
/// # Examples
///
/// ```rust
/// use meshproxy_core::protocol::{decode_message, DeviceMessage};
///
/// let msg = decode_message(0x85, b"boot ok").unwrap();
/// assert_eq!(msg, DeviceMessage::DebugLog("boot ok".to_string()));
/// ```
pub fn decode_message(tag: u8, payload: &[u8]) -> Result<DeviceMessage, ProtocolError> {
    let tag = ResponseTag::try_from(tag).map_err(|_| ProtocolError::UnknownTag(tag))?;
    match tag {
        ResponseTag::InfoReply => decode_info_reply(payload).map(DeviceMessage::InfoReply),
        ResponseTag::Stats => decode_stats(payload).map(DeviceMessage::Stats),
        ResponseTag::RxPacket => decode_rx_packet(payload).map(DeviceMessage::RxPacket),
        ResponseTag::Error => Ok(DeviceMessage::Error(decode_text(payload))),
        ResponseTag::DebugLog => Ok(DeviceMessage::DebugLog(decode_text(payload))),
    }
}

/// Convenience wrapper over [`decode_message`] for a framed unit.
pub fn decode_frame(frame: &Frame) -> Result<DeviceMessage, ProtocolError> {
    decode_message(frame.tag, &frame.payload)
}

// ── Per-message decode helpers ────────────────────────────────────────────────

fn decode_info_reply(buf: &[u8]) -> Result<InfoReply, ProtocolError> {
    require_len(buf, INFO_REPLY_MIN_LEN, "InfoReply")?;

    let firmware = FirmwareVersion {
        major: buf[0],
        minor: buf[1],
    };
    let frequencies_hz = [read_u32(buf, 2)?, read_u32(buf, 6)?];

    if buf.len() < INFO_REPLY_EXTENDED_LEN {
        // Legacy layout: one-byte mode/interval, one-byte current protocol.
        return Ok(InfoReply {
            firmware,
            frequencies_hz,
            bandwidths: None,
            switch_interval: buf[10] as u16,
            current_protocol: ProtocolId(buf[11]),
            protocol_mode: None,
            platform: None,
        });
    }

    Ok(InfoReply {
        firmware,
        frequencies_hz,
        bandwidths: Some([buf[13], buf[14]]),
        switch_interval: read_u16(buf, 10)?,
        current_protocol: ProtocolId(buf[12]),
        protocol_mode: Some(buf[15]),
        platform: Some(Platform::from(buf[16])),
    })
}

fn decode_stats(buf: &[u8]) -> Result<Stats, ProtocolError> {
    require_len(buf, STATS_MIN_LEN, "Stats")?;

    let mut rx = [0u32; PROTOCOL_SLOT_COUNT];
    let mut tx = [0u32; PROTOCOL_SLOT_COUNT];
    for slot in 0..PROTOCOL_SLOT_COUNT {
        rx[slot] = read_u32(buf, 4 * slot)?;
        tx[slot] = read_u32(buf, 4 * (PROTOCOL_SLOT_COUNT + slot))?;
    }
    let conversion_errors = read_u32(buf, 4 * 2 * PROTOCOL_SLOT_COUNT)?;
    let parse_errors = if buf.len() >= STATS_EXTENDED_LEN {
        Some(read_u32(buf, STATS_MIN_LEN)?)
    } else {
        None
    };

    Ok(Stats {
        rx,
        tx,
        conversion_errors,
        parse_errors,
    })
}

fn decode_rx_packet(buf: &[u8]) -> Result<RxPacket, ProtocolError> {
    require_len(buf, RX_PACKET_HEADER_LEN, "RxPacket")?;

    let protocol = ProtocolId(buf[0]);
    let rssi = read_u16(buf, 1)? as i16;
    let snr = buf[3] as i8;
    let declared = buf[4] as usize;
    let available = buf.len() - RX_PACKET_HEADER_LEN;
    if declared > available {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared,
            available,
        });
    }

    Ok(RxPacket {
        protocol,
        rssi,
        snr,
        data: buf[RX_PACKET_HEADER_LEN..RX_PACKET_HEADER_LEN + declared].to_vec(),
    })
}

/// Text frames are decoded permissively; invalid UTF-8 becomes U+FFFD.
fn decode_text(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf).into_owned()
}

// ── Binary helpers ────────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &'static str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::InsufficientData {
            context,
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

fn read_u16(buf: &[u8], offset: usize) -> Result<u16, ProtocolError> {
    match buf.get(offset..offset + 2) {
        Some(bytes) => Ok(u16::from_le_bytes([bytes[0], bytes[1]])),
        None => Err(ProtocolError::InsufficientData {
            context: "u16 field",
            needed: offset + 2,
            available: buf.len(),
        }),
    }
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, ProtocolError> {
    match buf.get(offset..offset + 4) {
        Some(bytes) => Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        None => Err(ProtocolError::InsufficientData {
            context: "u32 field",
            needed: offset + 4,
            available: buf.len(),
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
