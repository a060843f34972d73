//! The link session: one task that owns the whole host-side device link.
//!
//! # Why a single task? (for beginners)
//!
//! Three things happen concurrently while connected: bytes arrive from the
//! device, timers fire (handshake retries, stats polling, status refresh), and
//! the user issues commands (save, cancel, disconnect...).  All of them read
//! or change the same state: the framer buffer, the device snapshot, the
//! editable form and its dirty flag.
//!
//! Rather than sharing that state behind locks, [`LinkSession`] owns it
//! outright and runs a `tokio::select!` loop over every event source.  Each
//! event is handled to completion before the next one is looked at, so there
//! are no data races and no lock ordering to think about.  Other tasks talk
//! to the session through a cloneable [`SessionHandle`], which sends a
//! [`SessionCommand`] and awaits the reply on a oneshot channel.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──open ok──► Connected
//!      ▲                          │                      │
//!      └────────── open failed ◄──┘                      │
//!      └──── disconnect() / transport error / EOF ◄──────┘
//! ```
//!
//! While connected the session first runs the [`Handshake`], then sends one
//! `GetStats` and starts stats polling and the status timer.
//!
//! # The dirty form
//!
//! The user edits a copy of the settings ([`EditableSettings`]).  Every
//! InfoReply refreshes the read-only snapshot, but it only overwrites the
//! form when the user has no unsaved edits.  Saving or cancelling clears the
//! dirty flag.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use meshproxy_core::domain::settings::{EditableSettings, FormError};
use meshproxy_core::domain::snapshot::DeviceSnapshot;
use meshproxy_core::domain::status::{compute_status, DerivedStatus, RECENT_WINDOW};
use meshproxy_core::protocol::codec::{decode_frame, encode_command};
use meshproxy_core::protocol::framer::FrameCodec;
use meshproxy_core::protocol::messages::{Command, DeviceMessage, InfoReply, RxPacket, TestTarget};

use crate::application::events::{ConnectionPhase, EventSink, LogLevel, SessionEvent};
use crate::application::handshake::{Handshake, HandshakeConfig, HandshakeStep};
use crate::application::polling::{PollAction, StatsSchedule};
use crate::application::transport::{InboundChunks, Transport, TransportError};

/// Capacity of the command channel between handles and the session task.
const COMMAND_QUEUE: usize = 32;

// ── Configuration ─────────────────────────────────────────────────────────────

/// Timing knobs for a [`LinkSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub stats_interval: Duration,
    /// Approximate period between piggy-backed `GetInfo` requests.
    pub info_cadence: Duration,
    pub status_interval: Duration,
    /// Delay between a save and the `GetInfo` that confirms it.
    pub confirm_delay: Duration,
    /// Window for the per-slot "recently active" flag.
    pub recent_window: Duration,
    pub handshake: HandshakeConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stats_interval: Duration::from_millis(1000),
            info_cadence: Duration::from_millis(5000),
            status_interval: Duration::from_millis(100),
            confirm_delay: Duration::from_millis(200),
            recent_window: RECENT_WINDOW,
            handshake: HandshakeConfig::default(),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors returned to [`SessionHandle`] callers.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("already connected")]
    AlreadyConnected,

    #[error("not connected")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid settings: {0}")]
    Form(#[from] FormError),

    /// The session task is gone; no further commands can be processed.
    #[error("session task has stopped")]
    SessionClosed,
}

// ── Commands and handle ───────────────────────────────────────────────────────

type Reply = oneshot::Sender<Result<(), SessionError>>;

/// Requests accepted by the session task.
#[derive(Debug)]
pub enum SessionCommand {
    Connect { reply: Reply },
    Disconnect { reply: Reply },
    /// Replaces the editable form and marks it dirty.
    UpdateForm { settings: EditableSettings, reply: Reply },
    SaveSettings { reply: Reply },
    CancelSettings { reply: Reply },
    ResetStats { reply: Reply },
    SendTest { target: TestTarget, reply: Reply },
    SetStatsInterval { interval: Duration, reply: Reply },
    Snapshot { reply: oneshot::Sender<SessionView> },
    /// Disconnects if needed and stops the task.
    Shutdown,
}

/// A point-in-time copy of session state for presentation.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub phase: ConnectionPhase,
    pub info_received: bool,
    pub form_dirty: bool,
    pub handshake_active: bool,
    pub device: DeviceSnapshot,
    pub form: EditableSettings,
    pub stats_interval: Duration,
    pub status: DerivedStatus,
}

/// Cloneable front end to a running [`LinkSession`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Opens the transport and starts the handshake.  Returns once the port
    /// is open; the handshake continues in the background.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Connect { reply }).await?
    }

    /// Closes the link.  Calling this while disconnected is a no-op.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Disconnect { reply }).await?
    }

    pub async fn update_form(&self, settings: EditableSettings) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::UpdateForm { settings, reply })
            .await?
    }

    /// Validates the form and writes it to the device.
    ///
    /// # Errors
    ///
    /// [`SessionError::Form`] if the form is invalid, in which case nothing
    /// was sent; [`SessionError::NotConnected`] while disconnected.
    pub async fn save_settings(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::SaveSettings { reply }).await?
    }

    pub async fn cancel_settings(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::CancelSettings { reply }).await?
    }

    pub async fn reset_stats(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::ResetStats { reply }).await?
    }

    pub async fn send_test(&self, target: TestTarget) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::SendTest { target, reply })
            .await?
    }

    pub async fn set_stats_interval(&self, interval: Duration) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::SetStatsInterval { interval, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<SessionView, SessionError> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    /// Asks the task to stop.  Succeeds silently if it already has.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(SessionCommand::Shutdown).await;
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        rx.await.map_err(|_| SessionError::SessionClosed)
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Owner of the device link.  See the module docs.
pub struct LinkSession {
    transport: Box<dyn Transport>,
    codec: FrameCodec,
    events: Box<dyn EventSink>,
    config: SessionConfig,

    phase: ConnectionPhase,
    inbound: Option<InboundChunks>,
    connected_at: Option<Instant>,

    info_received: bool,
    form_dirty: bool,
    ready_logged: bool,
    device: DeviceSnapshot,
    form: EditableSettings,

    handshake: Option<Handshake>,
    schedule: StatsSchedule,
    stats_timer: Option<Interval>,
    status_timer: Option<Interval>,
    confirm_at: Option<Instant>,
}

impl LinkSession {
    pub fn new(
        transport: Box<dyn Transport>,
        codec: FrameCodec,
        events: Box<dyn EventSink>,
        config: SessionConfig,
    ) -> Self {
        let schedule = StatsSchedule::new(config.stats_interval, config.info_cadence);
        Self {
            transport,
            codec,
            events,
            config,
            phase: ConnectionPhase::Disconnected,
            inbound: None,
            connected_at: None,
            info_received: false,
            form_dirty: false,
            ready_logged: false,
            device: DeviceSnapshot::default(),
            form: EditableSettings::default(),
            handshake: None,
            schedule,
            stats_timer: None,
            status_timer: None,
            confirm_at: None,
        }
    }

    /// Spawns the session onto the current Tokio runtime.
    pub fn spawn(self) -> (SessionHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let task = tokio::spawn(self.run(rx));
        (SessionHandle { commands: tx }, task)
    }

    /// Runs the event loop until shutdown or until every handle is dropped.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        debug!("link session started");
        loop {
            let handshake_wake = self.handshake.as_ref().and_then(Handshake::wake_at);
            let confirm_wake = self.confirm_at;

            // Inbound data first so frames that arrived before a command are
            // applied before the command observes state.
            tokio::select! {
                biased;

                chunk = next_chunk(&mut self.inbound) => self.handle_inbound(chunk).await,

                cmd = commands.recv() => match cmd {
                    None | Some(SessionCommand::Shutdown) => break,
                    Some(cmd) => self.handle_command(cmd).await,
                },

                _ = sleep_until_opt(handshake_wake) => self.drive_handshake().await,

                _ = sleep_until_opt(confirm_wake) => {
                    self.confirm_at = None;
                    self.send(Command::GetInfo).await;
                }

                _ = tick_opt(&mut self.stats_timer) => self.on_stats_tick().await,

                _ = tick_opt(&mut self.status_timer) => self.refresh_status(),
            }
        }
        self.teardown().await;
        debug!("link session stopped");
    }

    // ── Commands ──────────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Connect { reply } => {
                let result = self.connect().await;
                let _ = reply.send(result);
            }
            SessionCommand::Disconnect { reply } => {
                self.teardown().await;
                let _ = reply.send(Ok(()));
            }
            SessionCommand::UpdateForm { mut settings, reply } => {
                settings.normalize_tx();
                self.form = settings;
                self.form_dirty = true;
                let _ = reply.send(Ok(()));
            }
            SessionCommand::SaveSettings { reply } => {
                let result = self.save_settings().await;
                let _ = reply.send(result);
            }
            SessionCommand::CancelSettings { reply } => {
                self.cancel_settings().await;
                let _ = reply.send(Ok(()));
            }
            SessionCommand::ResetStats { reply } => {
                let result = self.reset_stats().await;
                let _ = reply.send(result);
            }
            SessionCommand::SendTest { target, reply } => {
                let result = self.send_test(target).await;
                let _ = reply.send(result);
            }
            SessionCommand::SetStatsInterval { interval, reply } => {
                self.set_stats_interval(interval);
                let _ = reply.send(Ok(()));
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.view());
            }
            // Handled by the run loop.
            SessionCommand::Shutdown => {}
        }
    }

    async fn connect(&mut self) -> Result<(), SessionError> {
        if self.phase != ConnectionPhase::Disconnected {
            return Err(SessionError::AlreadyConnected);
        }
        self.set_phase(ConnectionPhase::Connecting);
        self.log(
            LogLevel::Info,
            format!("Connecting to {}...", self.transport.describe()),
        );

        let inbound = match self.transport.open().await {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!("failed to open transport: {e}");
                self.set_phase(ConnectionPhase::Disconnected);
                self.log(LogLevel::Error, format!("Connection failed: {e}"));
                return Err(e.into());
            }
        };

        let now = Instant::now();
        self.inbound = Some(inbound);
        self.connected_at = Some(now);
        self.codec.reset();
        self.info_received = false;
        self.form_dirty = false;
        self.ready_logged = false;
        self.device = DeviceSnapshot::default();
        self.form = EditableSettings::from_snapshot(&self.device);
        self.handshake = Some(Handshake::start(self.config.handshake.clone(), now));

        info!(port = %self.transport.describe(), "connected");
        self.set_phase(ConnectionPhase::Connected);
        self.log(LogLevel::Success, "Connected successfully");
        Ok(())
    }

    async fn save_settings(&mut self) -> Result<(), SessionError> {
        if self.phase != ConnectionPhase::Connected {
            return Err(SessionError::NotConnected);
        }
        let commands = match self.form.save_commands() {
            Ok(commands) => commands,
            Err(e) => {
                self.log(LogLevel::Error, format!("Invalid settings: {e}"));
                return Err(e.into());
            }
        };

        self.log(
            LogLevel::Info,
            format!("Setting RX protocol to {}...", self.form.listen_protocol),
        );
        self.log(
            LogLevel::Info,
            format!("Setting TX protocols (bitmask: 0x{:02x})...", self.form.tx_bitmask),
        );
        for command in commands {
            if !self.send(command).await {
                return Err(SessionError::NotConnected);
            }
        }

        self.device.record_tx_bitmask(self.form.tx_bitmask);
        self.form_dirty = false;
        self.confirm_at = Some(Instant::now() + self.config.confirm_delay);
        self.log(LogLevel::Success, "Settings saved");
        Ok(())
    }

    async fn cancel_settings(&mut self) {
        self.form_dirty = false;
        if self.phase == ConnectionPhase::Connected {
            self.form = EditableSettings::from_snapshot(&self.device);
            self.events.emit(SessionEvent::FormReset(self.form.clone()));
            self.send(Command::GetInfo).await;
        }
        self.log(
            LogLevel::Info,
            "Settings cancelled - form reset to device state",
        );
    }

    async fn reset_stats(&mut self) -> Result<(), SessionError> {
        if self.phase != ConnectionPhase::Connected {
            return Err(SessionError::NotConnected);
        }
        if !self.send(Command::ResetStats).await {
            return Err(SessionError::NotConnected);
        }
        self.log(LogLevel::Info, "Statistics reset");
        Ok(())
    }

    async fn send_test(&mut self, target: TestTarget) -> Result<(), SessionError> {
        if self.phase != ConnectionPhase::Connected {
            return Err(SessionError::NotConnected);
        }
        let name = match target {
            TestTarget::Slot(id) => id.name(),
            TestTarget::All => "All".to_string(),
        };
        self.log(LogLevel::Info, format!("Sending {name} test message..."));
        if !self.send(Command::SendTest(target)).await {
            return Err(SessionError::NotConnected);
        }
        Ok(())
    }

    fn set_stats_interval(&mut self, interval: Duration) {
        self.config.stats_interval = interval;
        self.schedule = StatsSchedule::new(interval, self.config.info_cadence);
        if self.stats_timer.is_some() {
            self.stats_timer = Some(periodic(Instant::now(), self.schedule.interval()));
        }
        debug!(
            interval_ms = self.schedule.interval().as_millis() as u64,
            info_every = self.schedule.info_every(),
            "stats polling rate changed"
        );
    }

    fn view(&self) -> SessionView {
        SessionView {
            phase: self.phase,
            info_received: self.info_received,
            form_dirty: self.form_dirty,
            handshake_active: self.handshake.is_some(),
            device: self.device.clone(),
            form: self.form.clone(),
            stats_interval: self.schedule.interval(),
            status: self.status_at(Instant::now()),
        }
    }

    // ── Handshake and polling ─────────────────────────────────────────────

    async fn drive_handshake(&mut self) {
        let Some(handshake) = self.handshake.as_mut() else {
            return;
        };
        let max_attempts = handshake.config().max_attempts;
        let step = handshake.poll(Instant::now(), self.info_received);

        match step {
            HandshakeStep::Wait => {}
            HandshakeStep::SendGetInfo { attempt } => {
                self.log(
                    LogLevel::Info,
                    format!("Requesting device info (attempt {attempt}/{max_attempts})..."),
                );
                self.send(Command::GetInfo).await;
            }
            HandshakeStep::Succeeded { attempts } => {
                debug!(attempts, "handshake complete");
                self.finish_handshake().await;
            }
            HandshakeStep::Exhausted => {
                warn!(max_attempts, "no InfoReply during handshake");
                self.events.emit(SessionEvent::HandshakeTimedOut);
                self.log(
                    LogLevel::Warning,
                    "Warning: Device info not received immediately. Will retry via background polling.",
                );
                self.finish_handshake().await;
            }
        }
    }

    async fn finish_handshake(&mut self) {
        self.handshake = None;
        if !self.send(Command::GetStats).await {
            return;
        }
        let now = Instant::now();
        self.schedule.reset();
        self.stats_timer = Some(periodic(now, self.schedule.interval()));
        self.status_timer = Some(periodic(now, self.config.status_interval));
    }

    async fn on_stats_tick(&mut self) {
        let action = self.schedule.on_tick();
        if !self.send(Command::GetStats).await {
            return;
        }
        if action == PollAction::StatsAndInfo {
            self.send(Command::GetInfo).await;
        }
    }

    fn refresh_status(&self) {
        self.events
            .emit(SessionEvent::StatusRefreshed(self.status_at(Instant::now())));
    }

    fn status_at(&self, now: Instant) -> DerivedStatus {
        compute_status(
            &self.device,
            now.into_std(),
            self.connected_at.map(Instant::into_std),
            self.config.recent_window,
        )
    }

    // ── Inbound ───────────────────────────────────────────────────────────

    async fn handle_inbound(&mut self, chunk: Option<Result<Vec<u8>, TransportError>>) {
        match chunk {
            Some(Ok(bytes)) => {
                let out = self.codec.feed(&bytes);
                if out.discarded > 0 {
                    trace!(discarded = out.discarded, "skipped non-frame bytes");
                }
                for frame in out.frames {
                    // A write failure while handling an earlier frame may
                    // already have torn the link down.
                    if self.phase != ConnectionPhase::Connected {
                        break;
                    }
                    match decode_frame(&frame) {
                        Ok(message) => self.handle_message(message).await,
                        Err(e) => warn!(tag = frame.tag, "dropping malformed frame: {e}"),
                    }
                }
            }
            Some(Err(e)) => self.fail(e).await,
            None => self.fail(TransportError::Closed).await,
        }
    }

    async fn handle_message(&mut self, message: DeviceMessage) {
        match message {
            DeviceMessage::InfoReply(info) => self.apply_info(info).await,
            DeviceMessage::Stats(stats) => {
                self.device.apply_stats(&stats);
                self.events.emit(SessionEvent::StatsUpdated(stats));
            }
            DeviceMessage::RxPacket(packet) => self.apply_packet(packet),
            DeviceMessage::Error(text) => {
                let line = if text.is_empty() {
                    "Error from device (no details)".to_string()
                } else {
                    format!("Error: {text}")
                };
                warn!("device reported an error: {text:?}");
                self.log(LogLevel::Error, line);
                self.events.emit(SessionEvent::ErrorReceived(text));
            }
            DeviceMessage::DebugLog(text) => {
                let level = if text.contains("RX:") || text.contains("TX:") {
                    LogLevel::Debug
                } else {
                    LogLevel::Info
                };
                self.log(level, text);
            }
        }
    }

    async fn apply_info(&mut self, info: InfoReply) {
        self.info_received = true;
        if self.device.apply_info(&info) {
            info!(protocol = %info.current_protocol, "device switched listening protocol");
        }
        self.events.emit(SessionEvent::InfoUpdated(self.device.clone()));

        if self.form_dirty {
            debug!("form has unsaved edits, leaving it untouched");
        } else {
            self.form = EditableSettings::from_snapshot(&self.device);
            self.events.emit(SessionEvent::FormReset(self.form.clone()));
        }

        if !self.ready_logged {
            self.ready_logged = true;
            self.log(
                LogLevel::Success,
                format!(
                    "Device ready: Firmware {} | Mode: Manual ({})",
                    info.firmware, info.current_protocol
                ),
            );
        }

        if self.handshake.is_some() {
            self.drive_handshake().await;
        }
    }

    fn apply_packet(&mut self, packet: RxPacket) {
        self.log(
            LogLevel::Info,
            format!(
                "{} packet: RSSI={}dBm SNR={}dB Len={}",
                packet.protocol,
                packet.rssi,
                packet.snr,
                packet.data.len()
            ),
        );
        self.device
            .apply_packet(packet.clone(), Instant::now().into_std());
        self.events.emit(SessionEvent::PacketReceived(packet));
    }

    // ── Outbound and teardown ─────────────────────────────────────────────

    /// Encodes and writes one command.  A write failure tears the link down;
    /// returns whether the link is still up afterwards.
    async fn send(&mut self, command: Command) -> bool {
        if self.phase != ConnectionPhase::Connected {
            return false;
        }
        let bytes = match encode_command(&command) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(?command, "failed to encode command: {e}");
                return true;
            }
        };
        trace!(?command, "sending command");
        match self.transport.write(&bytes).await {
            Ok(()) => true,
            Err(e) => {
                self.fail(e).await;
                false
            }
        }
    }

    async fn fail(&mut self, e: TransportError) {
        if self.phase == ConnectionPhase::Disconnected {
            return;
        }
        error!("transport failure: {e}");
        self.log(LogLevel::Error, format!("Error: {e}"));
        self.events.emit(SessionEvent::TransportFailed(e.to_string()));
        self.teardown().await;
    }

    /// Stops all timers, closes the transport, and resets per-connection
    /// state.  Idempotent.
    async fn teardown(&mut self) {
        if self.phase == ConnectionPhase::Disconnected {
            return;
        }
        self.handshake = None;
        self.stats_timer = None;
        self.status_timer = None;
        self.confirm_at = None;
        self.inbound = None;
        self.connected_at = None;
        self.info_received = false;
        self.form_dirty = false;
        self.ready_logged = false;
        self.codec.reset();

        if let Err(e) = self.transport.close().await {
            debug!("ignoring error while closing transport: {e}");
        }

        info!("disconnected");
        self.set_phase(ConnectionPhase::Disconnected);
        self.log(LogLevel::Info, "Disconnected");
    }

    fn set_phase(&mut self, phase: ConnectionPhase) {
        self.phase = phase;
        self.events.emit(SessionEvent::ConnectionChanged(phase));
    }

    fn log(&self, level: LogLevel, text: impl Into<String>) {
        let text = text.into();
        trace!(?level, "{text}");
        self.events.emit(SessionEvent::LogLine { level, text });
    }
}

// ── select! helpers ───────────────────────────────────────────────────────────
//
// Each resolves only when its source exists, so absent sources simply never
// win the select.

async fn next_chunk(
    inbound: &mut Option<InboundChunks>,
) -> Option<Result<Vec<u8>, TransportError>> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn tick_opt(timer: &mut Option<Interval>) {
    match timer {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// An interval whose first tick is one period from `now`.
fn periodic(now: Instant, period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut timer = time::interval_at(now + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::MockEventSink;
    use crate::infrastructure::transport::mock::{MockDevice, MockTransport};
    use meshproxy_core::protocol::framer::encode_frame;

    fn info_frame(current: u8) -> Vec<u8> {
        let mut payload = vec![1, 0];
        payload.extend_from_slice(&910_525_000u32.to_le_bytes());
        payload.extend_from_slice(&906_875_000u32.to_le_bytes());
        payload.extend_from_slice(&[0, 0, current, 6, 8, current, 0, 0]);
        encode_frame(0x81, &payload).expect("encode")
    }

    fn start(sink: MockEventSink) -> (SessionHandle, JoinHandle<()>, MockDevice) {
        let (transport, device) = MockTransport::new();
        let session = LinkSession::new(
            Box::new(transport),
            FrameCodec::new(),
            Box::new(sink),
            SessionConfig::default(),
        );
        let (handle, task) = session.spawn();
        (handle, task, device)
    }

    async fn settle() {
        time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dirty_form_is_not_reset_by_info_reply() {
        // Arrange: exactly one FormReset (the handshake reply), never a second.
        let mut sink = MockEventSink::new();
        sink.expect_emit()
            .withf(|e| matches!(e, SessionEvent::FormReset(_)))
            .times(1)
            .return_const(());
        sink.expect_emit()
            .withf(|e| !matches!(e, SessionEvent::FormReset(_)))
            .return_const(());
        let (handle, task, device) = start(sink);

        handle.connect().await.expect("connect");
        time::sleep(Duration::from_millis(200)).await;
        device.push(&info_frame(0)).await;
        settle().await;

        let mut edited = handle.snapshot().await.expect("view").form;
        edited.slots[0].frequency_hz = 915_000_000;
        handle.update_form(edited.clone()).await.expect("update");

        // Act
        device.push(&info_frame(1)).await;
        settle().await;

        // Assert
        let view = handle.snapshot().await.expect("view");
        assert!(view.form_dirty);
        assert_eq!(view.form, edited);
        assert_eq!(view.device.current_protocol, Some(meshproxy_core::ProtocolId::MESHTASTIC));

        handle.shutdown().await;
        task.await.expect("session task panicked");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rx_tx_debug_lines_are_debug_level() {
        // Arrange
        let mut sink = MockEventSink::new();
        sink.expect_emit()
            .withf(|e| {
                matches!(e, SessionEvent::LogLine { level: LogLevel::Debug, text } if text == "RX: MeshCore 12")
            })
            .times(1)
            .return_const(());
        sink.expect_emit()
            .withf(|e| {
                matches!(e, SessionEvent::LogLine { level: LogLevel::Info, text } if text == "boot ok")
            })
            .times(1)
            .return_const(());
        sink.expect_emit()
            .withf(|e| {
                !matches!(e, SessionEvent::LogLine { text, .. } if text == "RX: MeshCore 12" || text == "boot ok")
            })
            .return_const(());
        let (handle, task, device) = start(sink);
        handle.connect().await.expect("connect");

        // Act
        device
            .push(&encode_frame(0x85, b"RX: MeshCore 12").expect("encode"))
            .await;
        device.push(&encode_frame(0x85, b"boot ok").expect("encode")).await;
        settle().await;

        // Assert: expectations are verified when the sink drops with the task.
        handle.shutdown().await;
        task.await.expect("session task panicked");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_error_frame_gets_default_text() {
        let mut sink = MockEventSink::new();
        sink.expect_emit()
            .withf(|e| {
                matches!(e, SessionEvent::LogLine { level: LogLevel::Error, text } if text == "Error from device (no details)")
            })
            .times(1)
            .return_const(());
        sink.expect_emit()
            .withf(|e| matches!(e, SessionEvent::ErrorReceived(text) if text.is_empty()))
            .times(1)
            .return_const(());
        sink.expect_emit()
            .withf(|e| {
                !matches!(e, SessionEvent::ErrorReceived(_))
                    && !matches!(e, SessionEvent::LogLine { level: LogLevel::Error, .. })
            })
            .return_const(());
        let (handle, task, device) = start(sink);
        handle.connect().await.expect("connect");

        device.push(&[0x84, 0x00]).await;
        settle().await;

        handle.shutdown().await;
        task.await.expect("session task panicked");
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_require_connection() {
        let mut sink = MockEventSink::new();
        sink.expect_emit().return_const(());
        let (handle, task, _device) = start(sink);

        assert!(matches!(handle.save_settings().await, Err(SessionError::NotConnected)));
        assert!(matches!(handle.reset_stats().await, Err(SessionError::NotConnected)));
        assert!(matches!(
            handle.send_test(TestTarget::All).await,
            Err(SessionError::NotConnected)
        ));
        tokio_test::assert_ok!(handle.disconnect().await);

        handle.shutdown().await;
        task.await.expect("session task panicked");
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_connect_is_rejected() {
        let mut sink = MockEventSink::new();
        sink.expect_emit().return_const(());
        let (handle, task, device) = start(sink);

        tokio_test::assert_ok!(handle.connect().await);
        assert!(matches!(handle.connect().await, Err(SessionError::AlreadyConnected)));
        assert_eq!(device.open_count(), 1);

        handle.shutdown().await;
        task.await.expect("session task panicked");
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_reports_closed_session() {
        let mut sink = MockEventSink::new();
        sink.expect_emit().return_const(());
        let (handle, task, _device) = start(sink);

        handle.shutdown().await;
        task.await.expect("session task panicked");

        assert!(matches!(handle.connect().await, Err(SessionError::SessionClosed)));
    }
}
