//! All MeshProxy wire message types.
//!
//! The gateway speaks a tiny tag-length-value protocol over the serial link.
//! Every unit on the wire, in either direction, has the same shape:
//!
//! ```text
//! [tag:1][len:1][payload:len]
//! ```
//!
//! Outbound tags are command ids (`0x01`–`0x0A`); inbound tags are response
//! tags (`0x81`–`0x85`).  All multi-byte integers are little-endian.

use serde::{Deserialize, Serialize};
use std::fmt;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size of the `[tag][len]` header in bytes.
pub const HEADER_SIZE: usize = 2;

/// Protocol-wide payload ceiling.  The length byte could express 255, but the
/// framer treats anything above this as corruption, so the encoder refuses it.
pub const MAX_PAYLOAD_LEN: usize = 64;

/// How far the framer scans for a plausible frame start after desync.
pub const RESYNC_WINDOW: usize = 100;

/// Number of radio protocol slots the gateway exposes (MeshCore, Meshtastic).
pub const PROTOCOL_SLOT_COUNT: usize = 2;

/// Largest valid LoRa bandwidth code (0 = 7.8 kHz … 9 = 500 kHz).
pub const MAX_BANDWIDTH_CODE: u8 = 9;

/// `SendTest` target byte meaning "every enabled transmit protocol".
pub const SEND_TEST_ALL: u8 = 2;

/// Minimum InfoReply payload (legacy 2-slot layout).
pub const INFO_REPLY_MIN_LEN: usize = 12;

/// InfoReply payloads at least this long use the extended layout.
pub const INFO_REPLY_EXTENDED_LEN: usize = 17;

/// Minimum Stats payload: rx×2, tx×2, conversion errors.
pub const STATS_MIN_LEN: usize = 4 * (2 * PROTOCOL_SLOT_COUNT + 1);

/// Stats payloads at least this long also carry a parse-error counter.
pub const STATS_EXTENDED_LEN: usize = STATS_MIN_LEN + 4;

/// Fixed RxPacket prefix: protocol, rssi(2), snr, data length.
pub const RX_PACKET_HEADER_LEN: usize = 5;

// ── Response tags ─────────────────────────────────────────────────────────────

/// Tags of the five responses the gateway can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ResponseTag {
    InfoReply = 0x81,
    Stats = 0x82,
    RxPacket = 0x83,
    Error = 0x84,
    DebugLog = 0x85,
}

impl ResponseTag {
    /// Returns `true` if `byte` is one of the recognized response tags.
    pub fn is_recognized(byte: u8) -> bool {
        Self::try_from(byte).is_ok()
    }
}

impl TryFrom<u8> for ResponseTag {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x81 => Ok(ResponseTag::InfoReply),
            0x82 => Ok(ResponseTag::Stats),
            0x83 => Ok(ResponseTag::RxPacket),
            0x84 => Ok(ResponseTag::Error),
            0x85 => Ok(ResponseTag::DebugLog),
            _ => Err(()),
        }
    }
}

// ── Command ids ───────────────────────────────────────────────────────────────

/// Command ids understood by the gateway firmware.
///
/// `SetFrequency` and `SetProtocol` belong to the legacy six-command set and
/// are kept for older firmware; the per-slot setters below them supersede them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommandId {
    GetInfo = 0x01,
    GetStats = 0x02,
    SetFrequency = 0x03,
    SetProtocol = 0x04,
    ResetStats = 0x05,
    SendTest = 0x06,
    SetSwitchInterval = 0x07,
    SetProtocolParams = 0x08,
    SetRxProtocol = 0x09,
    SetTxProtocols = 0x0A,
}

impl TryFrom<u8> for CommandId {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(CommandId::GetInfo),
            0x02 => Ok(CommandId::GetStats),
            0x03 => Ok(CommandId::SetFrequency),
            0x04 => Ok(CommandId::SetProtocol),
            0x05 => Ok(CommandId::ResetStats),
            0x06 => Ok(CommandId::SendTest),
            0x07 => Ok(CommandId::SetSwitchInterval),
            0x08 => Ok(CommandId::SetProtocolParams),
            0x09 => Ok(CommandId::SetRxProtocol),
            0x0A => Ok(CommandId::SetTxProtocols),
            _ => Err(()),
        }
    }
}

// ── Frame ─────────────────────────────────────────────────────────────────────

/// One complete `[tag, len, payload]` unit extracted from the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub tag: u8,
    /// Never longer than [`MAX_PAYLOAD_LEN`].
    pub payload: Vec<u8>,
}

// ── Protocol slots and platforms ──────────────────────────────────────────────

/// Index of a radio protocol slot on the gateway.
///
/// Slot indices arrive from the device as raw bytes, so values outside
/// `0..PROTOCOL_SLOT_COUNT` are representable; [`ProtocolId::slot`] tells them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolId(pub u8);

impl ProtocolId {
    pub const MESHCORE: ProtocolId = ProtocolId(0);
    pub const MESHTASTIC: ProtocolId = ProtocolId(1);

    /// Returns the slot index if this id names a known slot.
    pub fn slot(self) -> Option<usize> {
        let index = self.0 as usize;
        (index < PROTOCOL_SLOT_COUNT).then_some(index)
    }

    /// Human-readable protocol name.
    pub fn name(self) -> String {
        match self.0 {
            0 => "MeshCore".to_string(),
            1 => "Meshtastic".to_string(),
            n => format!("Protocol {n}"),
        }
    }

    /// Bit for this slot in a transmit-protocol bitmask.
    pub fn mask_bit(self) -> u8 {
        1u8.checked_shl(self.0 as u32).unwrap_or(0)
    }

    /// All known slots in index order.
    pub fn all() -> impl Iterator<Item = ProtocolId> {
        (0..PROTOCOL_SLOT_COUNT as u8).map(ProtocolId)
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Hardware platform reported in the extended InfoReply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    LoRa32u4II,
    Rak4631,
    Unknown(u8),
}

impl From<u8> for Platform {
    fn from(value: u8) -> Self {
        match value {
            0 => Platform::LoRa32u4II,
            1 => Platform::Rak4631,
            other => Platform::Unknown(other),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::LoRa32u4II => f.write_str("LoRa32u4II"),
            Platform::Rak4631 => f.write_str("RAK4631"),
            Platform::Unknown(id) => write!(f, "Unknown ({id})"),
        }
    }
}

/// Firmware `major.minor` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}", self.major, self.minor)
    }
}

// ── Response payloads ─────────────────────────────────────────────────────────

/// Device configuration snapshot (`0x81`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoReply {
    pub firmware: FirmwareVersion,
    /// Per-slot centre frequency in Hz.
    pub frequencies_hz: [u32; PROTOCOL_SLOT_COUNT],
    /// Per-slot bandwidth codes; only present in the extended layout.
    pub bandwidths: Option<[u8; PROTOCOL_SLOT_COUNT]>,
    /// Auto-switch interval.  One byte (legacy mode byte) in the short layout,
    /// milliseconds as u16 in the extended one.
    pub switch_interval: u16,
    /// Slot the radio is currently listening on.
    pub current_protocol: ProtocolId,
    pub protocol_mode: Option<u8>,
    pub platform: Option<Platform>,
}

/// Traffic counters (`0x82`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stats {
    pub rx: [u32; PROTOCOL_SLOT_COUNT],
    pub tx: [u32; PROTOCOL_SLOT_COUNT],
    pub conversion_errors: u32,
    pub parse_errors: Option<u32>,
}

/// A packet the radio heard (`0x83`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RxPacket {
    pub protocol: ProtocolId,
    /// dBm.
    pub rssi: i16,
    /// dB.
    pub snr: i8,
    pub data: Vec<u8>,
}

/// Every message the gateway can send, one variant per response tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceMessage {
    InfoReply(InfoReply),
    Stats(Stats),
    RxPacket(RxPacket),
    Error(String),
    DebugLog(String),
}

impl DeviceMessage {
    /// Returns the response tag this message arrives under.
    pub fn tag(&self) -> ResponseTag {
        match self {
            DeviceMessage::InfoReply(_) => ResponseTag::InfoReply,
            DeviceMessage::Stats(_) => ResponseTag::Stats,
            DeviceMessage::RxPacket(_) => ResponseTag::RxPacket,
            DeviceMessage::Error(_) => ResponseTag::Error,
            DeviceMessage::DebugLog(_) => ResponseTag::DebugLog,
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Target of a `SendTest` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestTarget {
    Slot(ProtocolId),
    /// Every protocol in the transmit set.
    All,
}

impl TestTarget {
    pub fn to_byte(self) -> u8 {
        match self {
            TestTarget::Slot(id) => id.0,
            TestTarget::All => SEND_TEST_ALL,
        }
    }
}

/// Outbound commands.  Fire-and-forget: the firmware never acknowledges them
/// except indirectly through later InfoReply/Stats frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    GetInfo,
    GetStats,
    /// Legacy single-frequency setter.
    SetFrequency(u32),
    /// Legacy protocol/mode select (slot index, or 2 for auto-switch).
    SetProtocol(u8),
    ResetStats,
    SendTest(TestTarget),
    /// Auto-switch interval in ms; 0 disables auto-switching.
    SetSwitchInterval(u16),
    SetProtocolParams {
        protocol: ProtocolId,
        frequency_hz: u32,
        bandwidth: u8,
    },
    SetRxProtocol(ProtocolId),
    /// Bit n set = transmit converted packets on slot n.
    SetTxProtocols(u8),
}

impl Command {
    /// Returns the [`CommandId`] written as this command's tag.
    pub fn id(&self) -> CommandId {
        match self {
            Command::GetInfo => CommandId::GetInfo,
            Command::GetStats => CommandId::GetStats,
            Command::SetFrequency(_) => CommandId::SetFrequency,
            Command::SetProtocol(_) => CommandId::SetProtocol,
            Command::ResetStats => CommandId::ResetStats,
            Command::SendTest(_) => CommandId::SendTest,
            Command::SetSwitchInterval(_) => CommandId::SetSwitchInterval,
            Command::SetProtocolParams { .. } => CommandId::SetProtocolParams,
            Command::SetRxProtocol(_) => CommandId::SetRxProtocol,
            Command::SetTxProtocols(_) => CommandId::SetTxProtocols,
        }
    }

    /// Serializes the command-specific payload (without the header).
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Command::GetInfo | Command::GetStats | Command::ResetStats => Vec::new(),
            Command::SetFrequency(hz) => hz.to_le_bytes().to_vec(),
            Command::SetProtocol(mode) => vec![*mode],
            Command::SendTest(target) => vec![target.to_byte()],
            Command::SetSwitchInterval(ms) => ms.to_le_bytes().to_vec(),
            Command::SetProtocolParams {
                protocol,
                frequency_hz,
                bandwidth,
            } => {
                let mut buf = Vec::with_capacity(6);
                buf.push(protocol.0);
                buf.extend_from_slice(&frequency_hz.to_le_bytes());
                buf.push(*bandwidth);
                buf
            }
            Command::SetRxProtocol(id) => vec![id.0],
            Command::SetTxProtocols(mask) => vec![*mask],
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_tag_try_from_accepts_all_five_tags() {
        for byte in 0x81..=0x85u8 {
            let tag = ResponseTag::try_from(byte).expect("tag should be recognized");
            assert_eq!(tag as u8, byte);
        }
    }

    #[test]
    fn test_response_tag_rejects_command_ids_and_ascii() {
        for byte in [0x00u8, 0x01, 0x0A, 0x80, 0x86, b'R', b'\n'] {
            assert!(!ResponseTag::is_recognized(byte), "0x{byte:02X} must not be a tag");
        }
    }

    #[test]
    fn test_command_id_try_from_round_trips() {
        for byte in 0x01..=0x0Au8 {
            let id = CommandId::try_from(byte).expect("id should be recognized");
            assert_eq!(id as u8, byte);
        }
        assert!(CommandId::try_from(0x0B).is_err());
    }

    #[test]
    fn test_protocol_id_names() {
        assert_eq!(ProtocolId::MESHCORE.name(), "MeshCore");
        assert_eq!(ProtocolId::MESHTASTIC.name(), "Meshtastic");
        assert_eq!(ProtocolId(7).name(), "Protocol 7");
    }

    #[test]
    fn test_protocol_id_slot_bounds() {
        assert_eq!(ProtocolId(0).slot(), Some(0));
        assert_eq!(ProtocolId(1).slot(), Some(1));
        assert_eq!(ProtocolId(2).slot(), None);
    }

    #[test]
    fn test_protocol_id_mask_bit_saturates_for_wide_ids() {
        assert_eq!(ProtocolId(0).mask_bit(), 0b01);
        assert_eq!(ProtocolId(1).mask_bit(), 0b10);
        assert_eq!(ProtocolId(200).mask_bit(), 0);
    }

    #[test]
    fn test_platform_from_byte() {
        assert_eq!(Platform::from(0), Platform::LoRa32u4II);
        assert_eq!(Platform::from(1), Platform::Rak4631);
        assert_eq!(Platform::from(9), Platform::Unknown(9));
        assert_eq!(Platform::Rak4631.to_string(), "RAK4631");
    }

    #[test]
    fn test_set_protocol_params_payload_layout() {
        // Arrange
        let cmd = Command::SetProtocolParams {
            protocol: ProtocolId::MESHTASTIC,
            frequency_hz: 906_875_000,
            bandwidth: 8,
        };

        // Act
        let payload = cmd.payload();

        // Assert
        assert_eq!(payload.len(), 6);
        assert_eq!(payload[0], 1);
        assert_eq!(&payload[1..5], &906_875_000u32.to_le_bytes());
        assert_eq!(payload[5], 8);
    }

    #[test]
    fn test_switch_interval_payload_is_little_endian_u16() {
        assert_eq!(Command::SetSwitchInterval(0x1234).payload(), vec![0x34, 0x12]);
    }

    #[test]
    fn test_send_test_all_uses_reserved_byte() {
        assert_eq!(Command::SendTest(TestTarget::All).payload(), vec![SEND_TEST_ALL]);
        assert_eq!(
            Command::SendTest(TestTarget::Slot(ProtocolId::MESHCORE)).payload(),
            vec![0]
        );
    }

    #[test]
    fn test_query_commands_have_empty_payloads() {
        assert!(Command::GetInfo.payload().is_empty());
        assert!(Command::GetStats.payload().is_empty());
        assert!(Command::ResetStats.payload().is_empty());
    }

    #[test]
    fn test_stats_lengths_follow_slot_count() {
        assert_eq!(STATS_MIN_LEN, 20);
        assert_eq!(STATS_EXTENDED_LEN, 24);
    }
}
