//! Canonical device snapshot.
//!
//! The snapshot is the host's single source of truth about the gateway.  It is
//! mutated only by the `apply_*` methods, each fed by one successfully decoded
//! message kind.  Timestamps are [`Instant`]s supplied by the caller so the
//! session can drive everything from one clock.

use std::time::Instant;

use crate::protocol::messages::{
    FirmwareVersion, InfoReply, Platform, ProtocolId, RxPacket, Stats, PROTOCOL_SLOT_COUNT,
};

/// Per-slot radio defaults used until the device reports its own values.
pub const DEFAULT_FREQUENCIES_HZ: [u32; PROTOCOL_SLOT_COUNT] = [910_525_000, 906_875_000];

/// Per-slot bandwidth codes used until the device reports its own values.
pub const DEFAULT_BANDWIDTHS: [u8; PROTOCOL_SLOT_COUNT] = [6, 8];

/// Everything known about one protocol slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotState {
    pub frequency_hz: u32,
    pub bandwidth: u8,
    pub rx_count: u32,
    pub tx_count: u32,
    /// When a packet for this slot last arrived.
    pub last_seen: Option<Instant>,
}

/// The most recent packet and when it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastPacket {
    pub packet: RxPacket,
    pub received_at: Instant,
}

/// Last-known device configuration and counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub firmware: Option<FirmwareVersion>,
    pub platform: Option<Platform>,
    pub slots: [SlotState; PROTOCOL_SLOT_COUNT],
    /// Slot the radio listens on; `None` until the first InfoReply.
    pub current_protocol: Option<ProtocolId>,
    pub switch_interval: u16,
    pub protocol_mode: Option<u8>,
    /// The device never reports its transmit set, so this is only known once
    /// the host has written one.
    pub tx_bitmask: Option<u8>,
    pub conversion_errors: u32,
    pub parse_errors: Option<u32>,
    pub last_packet: Option<LastPacket>,
    pub last_activity: Option<Instant>,
    /// Number of times InfoReply reported a different listening slot than the
    /// one before it.
    pub protocol_switches: u32,
}

impl Default for DeviceSnapshot {
    fn default() -> Self {
        let slots = std::array::from_fn(|i| SlotState {
            frequency_hz: DEFAULT_FREQUENCIES_HZ[i],
            bandwidth: DEFAULT_BANDWIDTHS[i],
            rx_count: 0,
            tx_count: 0,
            last_seen: None,
        });
        Self {
            firmware: None,
            platform: None,
            slots,
            current_protocol: None,
            switch_interval: 0,
            protocol_mode: None,
            tx_bitmask: None,
            conversion_errors: 0,
            parse_errors: None,
            last_packet: None,
            last_activity: None,
            protocol_switches: 0,
        }
    }
}

impl DeviceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an InfoReply.  Returns `true` if the listening slot changed
    /// since the previous reply (a protocol switch).
    pub fn apply_info(&mut self, info: &InfoReply) -> bool {
        self.firmware = Some(info.firmware);
        for (slot, hz) in self.slots.iter_mut().zip(info.frequencies_hz) {
            slot.frequency_hz = hz;
        }
        if let Some(bandwidths) = info.bandwidths {
            for (slot, bw) in self.slots.iter_mut().zip(bandwidths) {
                slot.bandwidth = bw;
            }
        }
        self.switch_interval = info.switch_interval;
        self.protocol_mode = info.protocol_mode;
        if info.platform.is_some() {
            self.platform = info.platform;
        }

        let switched = matches!(self.current_protocol, Some(prev) if prev != info.current_protocol);
        if switched {
            self.protocol_switches += 1;
        }
        self.current_protocol = Some(info.current_protocol);
        switched
    }

    pub fn apply_stats(&mut self, stats: &Stats) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            slot.rx_count = stats.rx[i];
            slot.tx_count = stats.tx[i];
        }
        self.conversion_errors = stats.conversion_errors;
        self.parse_errors = stats.parse_errors;
    }

    /// Records `packet` as the last packet and stamps its slot as seen.
    /// Packets for unknown slots still count as activity.
    pub fn apply_packet(&mut self, packet: RxPacket, now: Instant) {
        if let Some(index) = packet.protocol.slot() {
            self.slots[index].last_seen = Some(now);
        }
        self.last_activity = Some(now);
        self.last_packet = Some(LastPacket {
            packet,
            received_at: now,
        });
    }

    pub fn record_tx_bitmask(&mut self, mask: u8) {
        self.tx_bitmask = Some(mask);
    }
}
