//! Connect-time `GetInfo` handshake.
//!
//! # Why a handshake at all? (for beginners)
//!
//! Opening a USB-serial port usually resets the board.  For a moment after
//! that the firmware is still booting and silently drops whatever the host
//! sends.  So the host waits a short settle delay, sends `GetInfo`, and keeps
//! checking whether an InfoReply has arrived.  If one does not show up within
//! the attempt timeout it backs off briefly and tries again, up to a fixed
//! number of attempts.
//!
//! # Shape
//!
//! [`Handshake`] is a pure state machine.  It owns no timers and does no
//! I/O: the session asks it [`Handshake::wake_at`] when to call back, then
//! calls [`Handshake::poll`] with the current time and whether an InfoReply
//! has been seen.  The returned [`HandshakeStep`] tells the session what to
//! do.  Success is checked first on every poll, so the session may also call
//! `poll` as soon as an InfoReply lands instead of waiting for the next tick.
//!
//! With the default configuration an unanswered handshake gives up after
//! `150 ms + 5 × 1.5 s + 4 × 200 ms = 8.45 s`.

use std::time::Duration;

use tokio::time::Instant;

/// Timing knobs for the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    pub max_attempts: u32,
    /// How long each attempt waits for an InfoReply.
    pub attempt_timeout: Duration,
    /// How often an attempt re-checks for an InfoReply.
    pub poll_interval: Duration,
    /// Pause before every attempt after the first.
    pub backoff: Duration,
    /// Pause between opening the port and the first attempt.
    pub settle_delay: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            attempt_timeout: Duration::from_millis(1500),
            poll_interval: Duration::from_millis(100),
            backoff: Duration::from_millis(200),
            settle_delay: Duration::from_millis(150),
        }
    }
}

/// What the session should do after a [`Handshake::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    /// Write a `GetInfo`.  `attempt` counts from 1.
    SendGetInfo { attempt: u32 },
    /// Nothing to do until [`Handshake::wake_at`].
    Wait,
    /// An InfoReply arrived during attempt `attempts` (0 if it arrived before
    /// the first request went out).
    Succeeded { attempts: u32 },
    /// Every attempt timed out.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Settling { until: Instant },
    Waiting { attempt: u32, started: Instant, next_poll: Instant },
    Backoff { attempt: u32, until: Instant },
    Done,
}

/// One run of the connect-time handshake.
#[derive(Debug, Clone)]
pub struct Handshake {
    config: HandshakeConfig,
    phase: Phase,
}

impl Handshake {
    /// Starts a handshake whose settle delay begins at `now`.
    pub fn start(config: HandshakeConfig, now: Instant) -> Self {
        let until = now + config.settle_delay;
        Self {
            config,
            phase: Phase::Settling { until },
        }
    }

    /// When the session should next call [`poll`](Self::poll); `None` once
    /// finished.
    pub fn wake_at(&self) -> Option<Instant> {
        match self.phase {
            Phase::Settling { until } | Phase::Backoff { until, .. } => Some(until),
            Phase::Waiting { next_poll, .. } => Some(next_poll),
            Phase::Done => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Done
    }

    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    /// Advances the machine to `now`.
    pub fn poll(&mut self, now: Instant, info_received: bool) -> HandshakeStep {
        match self.phase {
            Phase::Done => HandshakeStep::Wait,

            Phase::Settling { .. } if info_received => self.finish_ok(0),
            Phase::Settling { until } if now < until => HandshakeStep::Wait,
            Phase::Settling { .. } => self.begin_attempt(1, now),

            Phase::Waiting { attempt, .. } | Phase::Backoff { attempt, .. } if info_received => {
                self.finish_ok(attempt)
            }

            Phase::Waiting { next_poll, .. } if now < next_poll => HandshakeStep::Wait,
            Phase::Waiting { attempt, started, next_poll } => {
                if next_poll.duration_since(started) < self.config.attempt_timeout {
                    self.phase = Phase::Waiting {
                        attempt,
                        started,
                        next_poll: next_poll + self.config.poll_interval,
                    };
                    HandshakeStep::Wait
                } else if attempt >= self.config.max_attempts {
                    self.phase = Phase::Done;
                    HandshakeStep::Exhausted
                } else {
                    self.phase = Phase::Backoff {
                        attempt: attempt + 1,
                        until: now + self.config.backoff,
                    };
                    HandshakeStep::Wait
                }
            }

            Phase::Backoff { until, .. } if now < until => HandshakeStep::Wait,
            Phase::Backoff { attempt, .. } => self.begin_attempt(attempt, now),
        }
    }

    fn begin_attempt(&mut self, attempt: u32, now: Instant) -> HandshakeStep {
        self.phase = Phase::Waiting {
            attempt,
            started: now,
            next_poll: now + self.config.poll_interval,
        };
        HandshakeStep::SendGetInfo { attempt }
    }

    fn finish_ok(&mut self, attempts: u32) -> HandshakeStep {
        self.phase = Phase::Done;
        HandshakeStep::Succeeded { attempts }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Drives `hs` by jumping straight to each wake-up time, collecting every
    /// non-`Wait` step with the offset from `t0` it happened at.
    fn run_unanswered(hs: &mut Handshake, t0: Instant) -> Vec<(HandshakeStep, Duration)> {
        let mut steps = Vec::new();
        while let Some(at) = hs.wake_at() {
            let step = hs.poll(at, false);
            if step != HandshakeStep::Wait {
                steps.push((step, at.duration_since(t0)));
            }
        }
        steps
    }

    #[test]
    fn test_waits_for_settle_delay_before_first_request() {
        // Arrange
        let t0 = Instant::now();
        let mut hs = Handshake::start(HandshakeConfig::default(), t0);

        // Act / Assert
        assert_eq!(hs.poll(t0 + Duration::from_millis(100), false), HandshakeStep::Wait);
        assert_eq!(
            hs.poll(t0 + Duration::from_millis(150), false),
            HandshakeStep::SendGetInfo { attempt: 1 }
        );
    }

    #[test]
    fn test_unanswered_handshake_sends_five_requests_then_gives_up() {
        // Arrange
        let t0 = Instant::now();
        let mut hs = Handshake::start(HandshakeConfig::default(), t0);

        // Act
        let steps = run_unanswered(&mut hs, t0);

        // Assert
        let ms = |n| Duration::from_millis(n);
        assert_eq!(
            steps,
            vec![
                (HandshakeStep::SendGetInfo { attempt: 1 }, ms(150)),
                (HandshakeStep::SendGetInfo { attempt: 2 }, ms(1850)),
                (HandshakeStep::SendGetInfo { attempt: 3 }, ms(3550)),
                (HandshakeStep::SendGetInfo { attempt: 4 }, ms(5250)),
                (HandshakeStep::SendGetInfo { attempt: 5 }, ms(6950)),
                (HandshakeStep::Exhausted, ms(8450)),
            ]
        );
        assert!(hs.is_finished());
        assert_eq!(hs.wake_at(), None);
    }

    #[test]
    fn test_info_during_attempt_succeeds_immediately() {
        let t0 = Instant::now();
        let mut hs = Handshake::start(HandshakeConfig::default(), t0);
        hs.poll(t0 + Duration::from_millis(150), false);

        let step = hs.poll(t0 + Duration::from_millis(170), true);

        assert_eq!(step, HandshakeStep::Succeeded { attempts: 1 });
        assert!(hs.is_finished());
    }

    #[test]
    fn test_info_before_first_request_skips_sending() {
        let t0 = Instant::now();
        let mut hs = Handshake::start(HandshakeConfig::default(), t0);

        let step = hs.poll(t0 + Duration::from_millis(150), true);

        assert_eq!(step, HandshakeStep::Succeeded { attempts: 0 });
    }

    #[test]
    fn test_info_during_backoff_counts_next_attempt() {
        let t0 = Instant::now();
        let mut hs = Handshake::start(HandshakeConfig::default(), t0);
        // Run attempt 1 to its timeout; the machine is now backing off.
        while hs.wake_at() < Some(t0 + Duration::from_millis(1650)) {
            let at = hs.wake_at().expect("still running");
            hs.poll(at, false);
        }
        hs.poll(t0 + Duration::from_millis(1650), false);

        assert_eq!(
            hs.poll(t0 + Duration::from_millis(1700), true),
            HandshakeStep::Succeeded { attempts: 2 }
        );
    }

    #[test]
    fn test_poll_after_done_is_inert() {
        let t0 = Instant::now();
        let mut hs = Handshake::start(HandshakeConfig::default(), t0);
        hs.poll(t0, true);
        assert_eq!(hs.poll(t0 + Duration::from_secs(60), false), HandshakeStep::Wait);
    }

    #[test]
    fn test_single_attempt_config() {
        let t0 = Instant::now();
        let config = HandshakeConfig {
            max_attempts: 1,
            ..HandshakeConfig::default()
        };
        let mut hs = Handshake::start(config, t0);

        let steps = run_unanswered(&mut hs, t0);

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1], (HandshakeStep::Exhausted, Duration::from_millis(1650)));
    }
}
