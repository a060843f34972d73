//! Console bridge between the user and the link session.
//!
//! The host has no GUI; the user types short commands on stdin and reads
//! session output on stdout.  This module is the only place that knows about
//! both the text console and the application layer:
//!
//! ```text
//! stdin line ──parse_command──► UserCommand ──execute──► SessionHandle
//! SessionEvent ──render_event──► stdout line
//! ```
//!
//! # Commands
//!
//! | Command                        | Effect                                      |
//! |--------------------------------|---------------------------------------------|
//! | `connect` / `disconnect`       | open or close the serial link               |
//! | `status`                       | print device, form, and link state          |
//! | `listen <protocol>`            | edit the listen slot                        |
//! | `tx <protocol,...\|none>`       | edit the transmit set                       |
//! | `freq <protocol> <MHz>`        | edit a slot's frequency                     |
//! | `bw <protocol> <0-9>`          | edit a slot's bandwidth code                |
//! | `save` / `cancel`              | write the form, or discard edits            |
//! | `test <protocol\|all>`          | ask the device to send a test message       |
//! | `reset`                        | zero the device's counters                  |
//! | `rate <ms>`                    | change and persist the stats poll interval  |
//! | `help` / `quit`                |                                             |
//!
//! Protocols may be given as `meshcore`/`mc`/`0` or `meshtastic`/`mt`/`1`.
//! Edit commands only change the local form (marking it dirty); nothing is
//! sent until `save`.

use std::fmt::Write as _;
use std::time::Duration;

use thiserror::Error;

use meshproxy_core::domain::settings::EditableSettings;
use meshproxy_core::protocol::messages::{
    ProtocolId, TestTarget, MAX_BANDWIDTH_CODE, PROTOCOL_SLOT_COUNT,
};

use crate::application::events::{ConnectionPhase, LogLevel, SessionEvent};
use crate::application::link_session::{SessionError, SessionHandle, SessionView};
use crate::infrastructure::storage::config::clamp_stats_interval_ms;

pub const HELP_TEXT: &str = "\
commands:
  connect | disconnect | status
  listen <meshcore|meshtastic>
  tx <protocol[,protocol]|none>
  freq <protocol> <MHz>      bw <protocol> <0-9>
  save | cancel
  test <protocol|all> | reset
  rate <ms>                  (10-10000, saved to config)
  help | quit";

/// One parsed console command.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    Connect,
    Disconnect,
    Status,
    Listen(ProtocolId),
    Tx(u8),
    Freq { protocol: ProtocolId, hz: u32 },
    Bw { protocol: ProtocolId, code: u8 },
    Save,
    Cancel,
    Test(TestTarget),
    Reset,
    Rate(u64),
    Help,
    Quit,
}

/// Why a console line could not be understood.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unknown command '{0}' (type 'help')")]
    UnknownCommand(String),

    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),

    #[error("unknown protocol '{0}'")]
    UnknownProtocol(String),

    #[error("'{0}' is not a valid frequency in MHz")]
    InvalidFrequency(String),

    #[error("bandwidth must be 0-9, got '{0}'")]
    InvalidBandwidth(String),

    #[error("'{0}' is not a valid interval in ms")]
    InvalidInterval(String),
}

/// What the console loop should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Print(String),
    /// The stats interval changed to this (clamped) value; persist it.
    RateChanged(u64),
    Quit,
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parses one console line.  Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<UserCommand>, CommandParseError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let verb = verb.to_ascii_lowercase();
    let mut arg = |name: &'static str| words.next().ok_or(CommandParseError::MissingArgument(name));

    let command = match verb.as_str() {
        "connect" => UserCommand::Connect,
        "disconnect" => UserCommand::Disconnect,
        "status" => UserCommand::Status,
        "listen" => UserCommand::Listen(parse_protocol(arg("listen")?)?),
        "tx" => UserCommand::Tx(parse_tx_mask(arg("tx")?)?),
        "freq" => {
            let protocol = parse_protocol(arg("freq")?)?;
            let hz = parse_mhz(arg("freq")?)?;
            UserCommand::Freq { protocol, hz }
        }
        "bw" => {
            let protocol = parse_protocol(arg("bw")?)?;
            let raw = arg("bw")?;
            let code = raw
                .parse::<u8>()
                .ok()
                .filter(|c| *c <= MAX_BANDWIDTH_CODE)
                .ok_or_else(|| CommandParseError::InvalidBandwidth(raw.to_string()))?;
            UserCommand::Bw { protocol, code }
        }
        "save" => UserCommand::Save,
        "cancel" => UserCommand::Cancel,
        "test" => {
            let raw = arg("test")?;
            if raw.eq_ignore_ascii_case("all") {
                UserCommand::Test(TestTarget::All)
            } else {
                UserCommand::Test(TestTarget::Slot(parse_protocol(raw)?))
            }
        }
        "reset" => UserCommand::Reset,
        "rate" => {
            let raw = arg("rate")?;
            let ms = raw
                .parse::<u64>()
                .map_err(|_| CommandParseError::InvalidInterval(raw.to_string()))?;
            UserCommand::Rate(ms)
        }
        "help" | "?" => UserCommand::Help,
        "quit" | "exit" => UserCommand::Quit,
        other => return Err(CommandParseError::UnknownCommand(other.to_string())),
    };
    Ok(Some(command))
}

fn parse_protocol(raw: &str) -> Result<ProtocolId, CommandParseError> {
    match raw.to_ascii_lowercase().as_str() {
        "meshcore" | "mc" | "0" => Ok(ProtocolId::MESHCORE),
        "meshtastic" | "mt" | "1" => Ok(ProtocolId::MESHTASTIC),
        _ => Err(CommandParseError::UnknownProtocol(raw.to_string())),
    }
}

fn parse_tx_mask(raw: &str) -> Result<u8, CommandParseError> {
    if raw.eq_ignore_ascii_case("none") {
        return Ok(0);
    }
    raw.split(',')
        .filter(|part| !part.is_empty())
        .try_fold(0u8, |mask, part| Ok(mask | parse_protocol(part)?.mask_bit()))
}

fn parse_mhz(raw: &str) -> Result<u32, CommandParseError> {
    let invalid = || CommandParseError::InvalidFrequency(raw.to_string());
    let mhz: f64 = raw.parse().map_err(|_| invalid())?;
    let hz = (mhz * 1_000_000.0).round();
    if !hz.is_finite() || hz <= 0.0 || hz > f64::from(u32::MAX) {
        return Err(invalid());
    }
    Ok(hz as u32)
}

// ── Execution ─────────────────────────────────────────────────────────────────

/// Runs `command` against the session.
///
/// Edits read the current form, change one field, and write it back, which
/// marks the form dirty.
pub async fn execute(
    handle: &SessionHandle,
    command: UserCommand,
) -> Result<Outcome, SessionError> {
    match command {
        UserCommand::Connect => handle.connect().await.map(|()| Outcome::Done),
        UserCommand::Disconnect => handle.disconnect().await.map(|()| Outcome::Done),
        UserCommand::Status => {
            let view = handle.snapshot().await?;
            Ok(Outcome::Print(render_view(&view)))
        }
        UserCommand::Listen(protocol) => {
            edit_form(handle, |form| form.set_listen_protocol(protocol)).await
        }
        UserCommand::Tx(mask) => edit_form(handle, |form| form.tx_bitmask = mask).await,
        UserCommand::Freq { protocol, hz } => {
            edit_form(handle, |form| {
                if let Some(i) = protocol.slot() {
                    form.slots[i].frequency_hz = hz;
                }
            })
            .await
        }
        UserCommand::Bw { protocol, code } => {
            edit_form(handle, |form| {
                if let Some(i) = protocol.slot() {
                    form.slots[i].bandwidth = code;
                }
            })
            .await
        }
        UserCommand::Save => handle.save_settings().await.map(|()| Outcome::Done),
        UserCommand::Cancel => handle.cancel_settings().await.map(|()| Outcome::Done),
        UserCommand::Test(target) => handle.send_test(target).await.map(|()| Outcome::Done),
        UserCommand::Reset => handle.reset_stats().await.map(|()| Outcome::Done),
        UserCommand::Rate(ms) => {
            let ms = clamp_stats_interval_ms(ms);
            handle.set_stats_interval(Duration::from_millis(ms)).await?;
            Ok(Outcome::RateChanged(ms))
        }
        UserCommand::Help => Ok(Outcome::Print(HELP_TEXT.to_string())),
        UserCommand::Quit => Ok(Outcome::Quit),
    }
}

async fn edit_form(
    handle: &SessionHandle,
    edit: impl FnOnce(&mut EditableSettings),
) -> Result<Outcome, SessionError> {
    let mut form = handle.snapshot().await?.form;
    edit(&mut form);
    handle.update_form(form).await?;
    let view = handle.snapshot().await?;
    Ok(Outcome::Print(format!("form (unsaved): {}", describe_form(&view.form))))
}

// ── Rendering ─────────────────────────────────────────────────────────────────

/// Turns an event into a console line, or `None` if it is not printed.
///
/// Only log lines are printed; the other events carry state that `status`
/// shows on demand.  `Debug` lines appear only when `show_debug` is set.
pub fn render_event(event: &SessionEvent, show_debug: bool) -> Option<String> {
    match event {
        SessionEvent::LogLine { level, text } => {
            let prefix = match level {
                LogLevel::Debug if !show_debug => return None,
                LogLevel::Debug => "[debug]",
                LogLevel::Info => "[info] ",
                LogLevel::Success => "[ok]   ",
                LogLevel::Warning => "[warn] ",
                LogLevel::Error => "[error]",
            };
            Some(format!("{prefix} {text}"))
        }
        _ => None,
    }
}

/// Multi-line summary for the `status` command.
pub fn render_view(view: &SessionView) -> String {
    let device = &view.device;
    let mut out = String::new();

    let link = match (view.phase, view.info_received) {
        (ConnectionPhase::Connected, true) => "Connected".to_string(),
        (ConnectionPhase::Connected, false) if view.handshake_active => {
            "Connected (waiting for device info)".to_string()
        }
        (ConnectionPhase::Connected, false) => "Connected (no device info yet)".to_string(),
        (phase, _) => phase.to_string(),
    };
    let _ = writeln!(out, "Link:      {link} | uptime {}", view.status.uptime_text());

    let firmware = device
        .firmware
        .map_or_else(|| "--".to_string(), |f| f.to_string());
    let platform = device
        .platform
        .map_or_else(|| "--".to_string(), |p| p.to_string());
    let _ = writeln!(out, "Device:    firmware {firmware} | platform {platform}");

    let listening = device
        .current_protocol
        .map_or_else(|| "--".to_string(), ProtocolId::name);
    let _ = writeln!(
        out,
        "Activity:  {} | listening on {listening} | switches {} | last activity {}",
        view.status.activity,
        view.status.protocol_switches,
        view.status.last_activity_text()
    );

    for (i, protocol) in ProtocolId::all().take(PROTOCOL_SLOT_COUNT).enumerate() {
        let slot = &device.slots[i];
        let _ = writeln!(
            out,
            "{:<11}{} bw {} | rx {} tx {}{}",
            format!("{protocol}:"),
            format_mhz(slot.frequency_hz),
            slot.bandwidth,
            slot.rx_count,
            slot.tx_count,
            if view.status.recently_active[i] { " | active" } else { "" }
        );
    }

    let parse_errors = device
        .parse_errors
        .map_or_else(|| "--".to_string(), |n| n.to_string());
    let _ = writeln!(
        out,
        "Errors:    conversion {} | parse {parse_errors}",
        device.conversion_errors
    );
    if let Some(last) = &device.last_packet {
        let _ = writeln!(
            out,
            "Last RX:   {} RSSI {} dBm SNR {} dB ({} bytes)",
            last.packet.protocol,
            last.packet.rssi,
            last.packet.snr,
            last.packet.data.len()
        );
    }
    let _ = writeln!(
        out,
        "Form{}: {}",
        if view.form_dirty { " (unsaved)" } else { "" },
        describe_form(&view.form)
    );
    let _ = write!(out, "Polling:   stats every {} ms", view.stats_interval.as_millis());
    out
}

fn describe_form(form: &EditableSettings) -> String {
    let tx = form.tx_names();
    let tx = if tx.is_empty() { "none".to_string() } else { tx.join(",") };
    let slots: Vec<String> = ProtocolId::all()
        .zip(form.slots.iter())
        .map(|(id, p)| format!("{id} {} bw {}", format_mhz(p.frequency_hz), p.bandwidth))
        .collect();
    format!("listen {} | tx {tx} | {}", form.listen_protocol, slots.join(" | "))
}

fn format_mhz(hz: u32) -> String {
    format!("{:.3} MHz", f64::from(hz) / 1_000_000.0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::link_session::{LinkSession, SessionConfig};
    use crate::infrastructure::transport::mock::MockTransport;
    use meshproxy_core::protocol::framer::FrameCodec;
    use tokio::sync::mpsc;

    #[test]
    fn test_parse_blank_line_is_none() {
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn test_parse_simple_verbs_case_insensitive() {
        assert_eq!(parse_command("SAVE"), Ok(Some(UserCommand::Save)));
        assert_eq!(parse_command("quit"), Ok(Some(UserCommand::Quit)));
        assert_eq!(parse_command("?"), Ok(Some(UserCommand::Help)));
    }

    #[test]
    fn test_parse_listen_aliases() {
        assert_eq!(
            parse_command("listen mt"),
            Ok(Some(UserCommand::Listen(ProtocolId::MESHTASTIC)))
        );
        assert_eq!(
            parse_command("listen MeshCore"),
            Ok(Some(UserCommand::Listen(ProtocolId::MESHCORE)))
        );
    }

    #[test]
    fn test_parse_tx_list_and_none() {
        assert_eq!(parse_command("tx meshcore,meshtastic"), Ok(Some(UserCommand::Tx(0b11))));
        assert_eq!(parse_command("tx none"), Ok(Some(UserCommand::Tx(0))));
        assert_eq!(
            parse_command("tx lora"),
            Err(CommandParseError::UnknownProtocol("lora".to_string()))
        );
    }

    #[test]
    fn test_parse_freq_in_mhz() {
        assert_eq!(
            parse_command("freq mc 910.525"),
            Ok(Some(UserCommand::Freq {
                protocol: ProtocolId::MESHCORE,
                hz: 910_525_000
            }))
        );
        assert_eq!(
            parse_command("freq mc -1"),
            Err(CommandParseError::InvalidFrequency("-1".to_string()))
        );
    }

    #[test]
    fn test_parse_bw_range() {
        assert_eq!(
            parse_command("bw mt 9"),
            Ok(Some(UserCommand::Bw {
                protocol: ProtocolId::MESHTASTIC,
                code: 9
            }))
        );
        assert_eq!(
            parse_command("bw mt 10"),
            Err(CommandParseError::InvalidBandwidth("10".to_string()))
        );
    }

    #[test]
    fn test_parse_missing_argument() {
        assert_eq!(parse_command("rate"), Err(CommandParseError::MissingArgument("rate")));
        assert_eq!(parse_command("freq mc"), Err(CommandParseError::MissingArgument("freq")));
    }

    #[test]
    fn test_parse_unknown_command() {
        assert_eq!(
            parse_command("reboot"),
            Err(CommandParseError::UnknownCommand("reboot".to_string()))
        );
    }

    #[test]
    fn test_parse_test_targets() {
        assert_eq!(parse_command("test all"), Ok(Some(UserCommand::Test(TestTarget::All))));
        assert_eq!(
            parse_command("test 1"),
            Ok(Some(UserCommand::Test(TestTarget::Slot(ProtocolId::MESHTASTIC))))
        );
    }

    #[test]
    fn test_render_event_hides_debug_unless_asked() {
        let event = SessionEvent::LogLine {
            level: LogLevel::Debug,
            text: "RX: MeshCore".to_string(),
        };
        assert_eq!(render_event(&event, false), None);
        assert_eq!(render_event(&event, true), Some("[debug] RX: MeshCore".to_string()));
    }

    #[test]
    fn test_render_event_ignores_state_events() {
        assert_eq!(render_event(&SessionEvent::HandshakeTimedOut, true), None);
    }

    #[test]
    fn test_format_mhz() {
        assert_eq!(format_mhz(910_525_000), "910.525 MHz");
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_edit_marks_form_dirty_and_normalizes() {
        // Arrange
        let (transport, _device) = MockTransport::new();
        let (events, _rx) = mpsc::unbounded_channel();
        let (handle, task) = LinkSession::new(
            Box::new(transport),
            FrameCodec::new(),
            Box::new(events),
            SessionConfig::default(),
        )
        .spawn();

        // Act
        let outcome = execute(&handle, UserCommand::Listen(ProtocolId::MESHTASTIC))
            .await
            .expect("execute");

        // Assert
        assert!(matches!(outcome, Outcome::Print(_)));
        let view = handle.snapshot().await.expect("view");
        assert!(view.form_dirty);
        assert_eq!(view.form.listen_protocol, ProtocolId::MESHTASTIC);
        assert_eq!(view.form.tx_bitmask, 0b01);

        handle.shutdown().await;
        task.await.expect("session task panicked");
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_rate_is_clamped() {
        let (transport, _device) = MockTransport::new();
        let (events, _rx) = mpsc::unbounded_channel();
        let (handle, task) = LinkSession::new(
            Box::new(transport),
            FrameCodec::new(),
            Box::new(events),
            SessionConfig::default(),
        )
        .spawn();

        let outcome = execute(&handle, UserCommand::Rate(5)).await.expect("execute");

        assert_eq!(outcome, Outcome::RateChanged(10));
        let view = handle.snapshot().await.expect("view");
        assert_eq!(view.stats_interval, Duration::from_millis(10));
        assert!(render_view(&view).contains("stats every 10 ms"));

        handle.shutdown().await;
        task.await.expect("session task panicked");
    }
}
