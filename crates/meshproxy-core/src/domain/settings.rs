//! User-editable radio settings.
//!
//! The gateway listens on exactly one protocol slot and transmits converted
//! packets on a set of slots given as a bitmask.  Transmitting on the slot you
//! listen on is pointless, so the listen slot is always removed from the
//! transmit set, and when only one other slot is left it is selected
//! automatically.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::snapshot::DeviceSnapshot;
use crate::protocol::messages::{
    Command, ProtocolId, MAX_BANDWIDTH_CODE, PROTOCOL_SLOT_COUNT,
};

/// Reasons a set of edited settings cannot be sent to the device.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("listen protocol {0} does not name a protocol slot")]
    InvalidListenProtocol(u8),

    #[error("bandwidth code {code} for {protocol} is out of range (0-9)")]
    BandwidthOutOfRange { protocol: ProtocolId, code: u8 },

    #[error("transmit mask 0x{0:02X} names slots that do not exist")]
    UnknownTxSlots(u8),

    #[error("frequency for {0} must be non-zero")]
    ZeroFrequency(ProtocolId),
}

/// Radio parameters of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotParams {
    pub frequency_hz: u32,
    pub bandwidth: u8,
}

/// The editable part of the device configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditableSettings {
    pub listen_protocol: ProtocolId,
    pub tx_bitmask: u8,
    pub slots: [SlotParams; PROTOCOL_SLOT_COUNT],
}

impl Default for EditableSettings {
    fn default() -> Self {
        Self::from_snapshot(&DeviceSnapshot::default())
    }
}

impl EditableSettings {
    /// Rebuilds the form from authoritative device state.
    pub fn from_snapshot(snapshot: &DeviceSnapshot) -> Self {
        let slots = std::array::from_fn(|i| SlotParams {
            frequency_hz: snapshot.slots[i].frequency_hz,
            bandwidth: snapshot.slots[i].bandwidth,
        });
        let mut settings = Self {
            listen_protocol: snapshot.current_protocol.unwrap_or(ProtocolId::MESHCORE),
            tx_bitmask: snapshot.tx_bitmask.unwrap_or(0),
            slots,
        };
        settings.normalize_tx();
        settings
    }

    /// Removes the listen slot from the transmit set and, if exactly one slot
    /// remains available, selects it.
    pub fn normalize_tx(&mut self) {
        let listen = self.listen_protocol;
        let valid_mask = (1u8 << PROTOCOL_SLOT_COUNT) - 1;
        self.tx_bitmask &= valid_mask & !listen.mask_bit();

        let mut available = ProtocolId::all().filter(|&id| id != listen);
        if let (Some(only), None) = (available.next(), available.next()) {
            self.tx_bitmask |= only.mask_bit();
        }
    }

    /// Changes the listen slot and re-applies the transmit rule.
    pub fn set_listen_protocol(&mut self, protocol: ProtocolId) {
        self.listen_protocol = protocol;
        self.normalize_tx();
    }

    /// Checks every field against what the firmware accepts.
    pub fn validate(&self) -> Result<(), FormError> {
        if self.listen_protocol.slot().is_none() {
            return Err(FormError::InvalidListenProtocol(self.listen_protocol.0));
        }
        let valid_mask = (1u8 << PROTOCOL_SLOT_COUNT) - 1;
        if self.tx_bitmask & !valid_mask != 0 {
            return Err(FormError::UnknownTxSlots(self.tx_bitmask));
        }
        for (protocol, params) in ProtocolId::all().zip(self.slots.iter()) {
            if params.bandwidth > MAX_BANDWIDTH_CODE {
                return Err(FormError::BandwidthOutOfRange {
                    protocol,
                    code: params.bandwidth,
                });
            }
            if params.frequency_hz == 0 {
                return Err(FormError::ZeroFrequency(protocol));
            }
        }
        Ok(())
    }

    /// Commands that apply these settings, in the order they must be sent.
    ///
    /// Auto-switching is always turned off: with an explicit listen slot the
    /// firmware would otherwise keep hopping away from it.
    pub fn save_commands(&self) -> Result<Vec<Command>, FormError> {
        self.validate()?;
        let mut commands = vec![
            Command::SetRxProtocol(self.listen_protocol),
            Command::SetTxProtocols(self.tx_bitmask),
            Command::SetSwitchInterval(0),
        ];
        commands.extend(
            ProtocolId::all()
                .zip(self.slots.iter())
                .map(|(protocol, params)| Command::SetProtocolParams {
                    protocol,
                    frequency_hz: params.frequency_hz,
                    bandwidth: params.bandwidth,
                }),
        );
        Ok(commands)
    }

    /// Names of the slots in the transmit set, for display.
    pub fn tx_names(&self) -> Vec<String> {
        ProtocolId::all()
            .filter(|id| self.tx_bitmask & id.mask_bit() != 0)
            .map(ProtocolId::name)
            .collect()
    }
}
