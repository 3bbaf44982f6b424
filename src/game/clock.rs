//! Game clock with authoritative server snapshots
//!
//! The server owns the clock. Every [`ClockSnapshot`] it sends replaces both
//! sides' remaining time; between snapshots the client counts the side to
//! move down once per second so the display does not freeze. The local
//! countdown is advisory only and never ends a game by itself.
//!
//! # Unlimited Games
//!
//! Games without a time control have no remaining time. They display a
//! waiting message for the side to move instead of `mm:ss`.

use crate::game::types::Color;
use shared::protocol::ClockSnapshot;

/// Remaining seconds at which the low-time warning fires
pub const LOW_TIME_SECONDS: u64 = 59;

const WAITING_TEXT: &str = "Waiting for player!";

/// Both sides' remaining time, in whole seconds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameClock {
    white_remaining: Option<u64>,
    black_remaining: Option<u64>,
    white_warned: bool,
    black_warned: bool,
}

impl GameClock {
    /// Clock with the same starting time for both sides
    pub fn new(seconds: u64) -> Self {
        Self {
            white_remaining: Some(seconds),
            black_remaining: Some(seconds),
            ..Self::default()
        }
    }

    /// Clock for a game without time control
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn is_unlimited(&self) -> bool {
        self.white_remaining.is_none() && self.black_remaining.is_none()
    }

    /// Replace both sides' time with the server's values
    pub fn apply_snapshot(&mut self, snapshot: ClockSnapshot) {
        self.white_remaining = Some(snapshot.white_remaining_seconds);
        self.black_remaining = Some(snapshot.black_remaining_seconds);
    }

    pub fn remaining(&self, color: Color) -> Option<u64> {
        match color {
            Color::White => self.white_remaining,
            Color::Black => self.black_remaining,
        }
    }

    /// Count `color` down by one second.
    ///
    /// Returns `true` the first time that side's clock passes through the
    /// low-time threshold, so the caller can play its warning once.
    pub fn tick(&mut self, color: Color) -> bool {
        let (remaining, warned) = match color {
            Color::White => (&mut self.white_remaining, &mut self.white_warned),
            Color::Black => (&mut self.black_remaining, &mut self.black_warned),
        };

        let Some(seconds) = remaining.as_mut() else {
            return false;
        };

        let low_time = *seconds == LOW_TIME_SECONDS && !*warned;
        if low_time {
            *warned = true;
        }
        *seconds = seconds.saturating_sub(1);
        low_time
    }

    /// Text shown for one side's clock.
    ///
    /// `active` marks the side to move; an unlimited clock only shows the
    /// waiting message for that side.
    pub fn display(&self, color: Color, active: bool) -> String {
        match self.remaining(color) {
            Some(seconds) => format_clock(seconds),
            None if active => WAITING_TEXT.to_owned(),
            None => String::new(),
        }
    }
}

/// Format seconds as `mm:ss`; hours are not shown
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", (seconds % 3600) / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(white: u64, black: u64) -> ClockSnapshot {
        ClockSnapshot {
            white_remaining_seconds: white,
            black_remaining_seconds: black,
        }
    }

    #[test]
    fn test_snapshot_replaces_local_countdown() {
        //! Server time always wins over the advisory countdown
        let mut clock = GameClock::new(300);
        clock.tick(Color::White);
        clock.tick(Color::White);
        assert_eq!(clock.remaining(Color::White), Some(298));

        clock.apply_snapshot(snapshot(305, 290));

        assert_eq!(clock.remaining(Color::White), Some(305));
        assert_eq!(clock.remaining(Color::Black), Some(290));
    }

    #[test]
    fn test_tick_only_touches_one_side() {
        let mut clock = GameClock::new(120);
        clock.tick(Color::Black);

        assert_eq!(clock.remaining(Color::White), Some(120));
        assert_eq!(clock.remaining(Color::Black), Some(119));
    }

    #[test]
    fn test_tick_stops_at_zero() {
        let mut clock = GameClock::new(1);
        clock.tick(Color::White);
        clock.tick(Color::White);
        assert_eq!(clock.remaining(Color::White), Some(0));
    }

    #[test]
    fn test_low_time_reported_once_per_side() {
        let mut clock = GameClock::new(60);

        assert!(!clock.tick(Color::White), "60 -> 59 is not yet low");
        assert!(clock.tick(Color::White), "59 -> 58 sounds the warning");
        assert!(!clock.tick(Color::White));

        // A snapshot back above the threshold does not re-arm the warning
        clock.apply_snapshot(snapshot(59, 59));
        assert!(!clock.tick(Color::White));
        assert!(clock.tick(Color::Black), "black has its own warning");
    }

    #[test]
    fn test_display_format() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(65), "01:05");
        assert_eq!(format_clock(600), "10:00");
        assert_eq!(format_clock(3725), "02:05", "hours wrap");
    }

    #[test]
    fn test_unlimited_clock_display() {
        let mut clock = GameClock::unlimited();

        assert!(clock.is_unlimited());
        assert!(!clock.tick(Color::White));
        assert_eq!(clock.display(Color::White, true), "Waiting for player!");
        assert_eq!(clock.display(Color::Black, false), "");

        clock.apply_snapshot(snapshot(10, 20));
        assert!(!clock.is_unlimited());
        assert_eq!(clock.display(Color::Black, false), "00:20");
    }
}
