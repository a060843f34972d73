//! Stats polling cadence.
//!
//! Once the handshake finishes the session sends `GetStats` on a fixed
//! interval.  Device info changes far less often, so a `GetInfo` rides along
//! on every Nth stats tick, where N is chosen so info is refreshed roughly
//! every `info_cadence` regardless of the stats interval.

use std::time::Duration;

/// Stats intervals below this are raised to it.
pub const MIN_STATS_INTERVAL: Duration = Duration::from_millis(10);

/// What a stats tick should send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollAction {
    Stats,
    StatsAndInfo,
}

/// Counts stats ticks and decides when to add a `GetInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSchedule {
    interval: Duration,
    info_every: u32,
    ticks: u32,
}

impl StatsSchedule {
    pub fn new(requested: Duration, info_cadence: Duration) -> Self {
        let interval = requested.max(MIN_STATS_INTERVAL);
        let ratio = info_cadence.as_millis() / interval.as_millis();
        let info_every = u32::try_from(ratio).unwrap_or(u32::MAX).max(1);
        Self {
            interval,
            info_every,
            ticks: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of stats ticks per piggy-backed `GetInfo`.
    pub fn info_every(&self) -> u32 {
        self.info_every
    }

    pub fn on_tick(&mut self) -> PollAction {
        self.ticks += 1;
        if self.ticks >= self.info_every {
            self.ticks = 0;
            PollAction::StatsAndInfo
        } else {
            PollAction::Stats
        }
    }

    /// Restarts the tick count, e.g. when polling restarts.
    pub fn reset(&mut self) {
        self.ticks = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CADENCE: Duration = Duration::from_millis(5000);

    #[test]
    fn test_default_rate_sends_info_every_fifth_tick() {
        // Arrange
        let mut schedule = StatsSchedule::new(Duration::from_millis(1000), CADENCE);

        // Act
        let actions: Vec<PollAction> = (0..10).map(|_| schedule.on_tick()).collect();

        // Assert
        let info_ticks: Vec<usize> = actions
            .iter()
            .enumerate()
            .filter(|(_, a)| **a == PollAction::StatsAndInfo)
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(info_ticks, vec![5, 10]);
    }

    #[test]
    fn test_interval_is_raised_to_minimum() {
        let schedule = StatsSchedule::new(Duration::from_millis(1), CADENCE);
        assert_eq!(schedule.interval(), Duration::from_millis(10));
        assert_eq!(schedule.info_every(), 500);
    }

    #[test]
    fn test_slow_polling_sends_info_every_tick() {
        let mut schedule = StatsSchedule::new(Duration::from_millis(10_000), CADENCE);
        assert_eq!(schedule.info_every(), 1);
        assert_eq!(schedule.on_tick(), PollAction::StatsAndInfo);
        assert_eq!(schedule.on_tick(), PollAction::StatsAndInfo);
    }

    #[test]
    fn test_ratio_rounds_down() {
        let schedule = StatsSchedule::new(Duration::from_millis(3000), CADENCE);
        assert_eq!(schedule.info_every(), 1);
        let schedule = StatsSchedule::new(Duration::from_millis(2400), CADENCE);
        assert_eq!(schedule.info_every(), 2);
    }

    #[test]
    fn test_reset_restarts_count() {
        let mut schedule = StatsSchedule::new(Duration::from_millis(2500), CADENCE);
        assert_eq!(schedule.on_tick(), PollAction::Stats);
        schedule.reset();
        assert_eq!(schedule.on_tick(), PollAction::Stats);
        assert_eq!(schedule.on_tick(), PollAction::StatsAndInfo);
    }
}
