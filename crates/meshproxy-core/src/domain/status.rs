//! Derived display status.
//!
//! Recomputed on a short timer purely from the snapshot and the connection
//! start time; nothing here talks to the device.

use std::fmt;
use std::time::{Duration, Instant};

use crate::domain::snapshot::DeviceSnapshot;
use crate::protocol::messages::{Platform, ProtocolId, PROTOCOL_SLOT_COUNT};

/// A slot counts as recently active if a packet arrived within this window.
pub const RECENT_WINDOW: Duration = Duration::from_secs(30);

const PROCESSING_WINDOW: Duration = Duration::from_secs(2);
const LISTENING_WINDOW: Duration = Duration::from_secs(10);

/// What the gateway appears to be doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// A packet arrived less than 2 s ago.
    ProcessingPacket,
    /// A packet arrived less than 10 s ago.
    Listening,
    /// Quiet; listening on the given slot.
    ListeningOn(ProtocolId),
    /// Nothing heard and the listening slot is not known yet.
    Idle,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activity::ProcessingPacket => f.write_str("Processing Packet"),
            Activity::Listening => f.write_str("Listening"),
            Activity::ListeningOn(id) => write!(f, "Listening ({id})"),
            Activity::Idle => f.write_str("Idle"),
        }
    }
}

/// Display-only values derived from the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedStatus {
    pub activity: Activity,
    /// Time since the connection opened; `None` while disconnected.
    pub uptime: Option<Duration>,
    pub recently_active: [bool; PROTOCOL_SLOT_COUNT],
    pub since_last_activity: Option<Duration>,
    pub protocol_switches: u32,
    pub platform: Option<Platform>,
}

impl DerivedStatus {
    pub fn uptime_text(&self) -> String {
        self.uptime.map_or_else(|| "--".to_string(), format_uptime)
    }

    pub fn last_activity_text(&self) -> String {
        match self.since_last_activity {
            None => "--".to_string(),
            Some(d) if d.as_secs() < 60 => format!("{}s ago", d.as_secs()),
            Some(d) => format!("{} ago", format_uptime(d)),
        }
    }
}

impl fmt::Display for DerivedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | uptime {} | last activity {} | switches {}",
            self.activity,
            self.uptime_text(),
            self.last_activity_text(),
            self.protocol_switches
        )?;
        if let Some(platform) = self.platform {
            write!(f, " | {platform}")?;
        }
        Ok(())
    }
}

/// Computes the status shown to the user at `now`.
pub fn compute_status(
    snapshot: &DeviceSnapshot,
    now: Instant,
    connected_at: Option<Instant>,
    window: Duration,
) -> DerivedStatus {
    let since_packet = snapshot
        .last_packet
        .as_ref()
        .map(|p| now.saturating_duration_since(p.received_at));

    let activity = match (since_packet, snapshot.current_protocol) {
        (Some(d), _) if d < PROCESSING_WINDOW => Activity::ProcessingPacket,
        (Some(d), _) if d < LISTENING_WINDOW => Activity::Listening,
        (_, Some(id)) => Activity::ListeningOn(id),
        (_, None) => Activity::Idle,
    };

    let recently_active = std::array::from_fn(|i| {
        snapshot.slots[i]
            .last_seen
            .is_some_and(|seen| now.saturating_duration_since(seen) < window)
    });

    DerivedStatus {
        activity,
        uptime: connected_at.map(|t| now.saturating_duration_since(t)),
        recently_active,
        since_last_activity: snapshot
            .last_activity
            .map(|t| now.saturating_duration_since(t)),
        protocol_switches: snapshot.protocol_switches,
        platform: snapshot.platform,
    }
}

/// Formats a duration as `Hh Mm`, `Mm Ss`, or `Ss`.
pub fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
