//! World calendar.
//!
//! Game time is a pure function of wall time, the world's creation time and
//! its `add_time` offset. One game day lasts `86400 / GAME_ONE_SECOND` real
//! seconds and is divided into `GAME_DAY_SECONDS` day-time units.

use serde::{Deserialize, Serialize};
use strata_shared::constants::{GAME_DAY_SECONDS, REAL_SECONDS_PER_GAME_DAY};

/// Day counter and time of day.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldCalendar {
    /// Whole game days since creation
    pub age: i64,
    /// Time of day in `0..GAME_DAY_SECONDS`
    pub day_time: u32,
}

impl WorldCalendar {
    /// Day-time at which night starts.
    pub const NIGHT_START: u32 = 12_541;
    /// Day-time at which night ends.
    pub const NIGHT_END: u32 = 23_458;

    /// Computes the calendar at `now_sec` for a world created at `dt_sec`.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn compute(now_sec: u64, dt_sec: u64, add_time: i64) -> Self {
        let diff_sec = now_sec.saturating_sub(dt_sec) as f64;
        let age = diff_sec / REAL_SECONDS_PER_GAME_DAY as f64
            + add_time as f64 / GAME_DAY_SECONDS as f64;
        let whole = age.floor();
        let mut day_time = ((age - whole) * GAME_DAY_SECONDS as f64).round() as u32;
        let mut age = whole as i64;
        // Rounding can land exactly on the next day.
        if u64::from(day_time) >= GAME_DAY_SECONDS {
            day_time = 0;
            age += 1;
        }
        Self { age, day_time }
    }

    /// Whether beds can be used.
    #[must_use]
    pub const fn is_night(&self) -> bool {
        self.day_time >= Self::NIGHT_START && self.day_time <= Self::NIGHT_END
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_world_starts_at_add_time() {
        let c = WorldCalendar::compute(1_000, 1_000, 7_000);
        assert_eq!(c, WorldCalendar { age: 0, day_time: 7_000 });
    }

    #[test]
    fn test_one_real_game_day_advances_age() {
        let c = WorldCalendar::compute(1_200, 0, 0);
        assert_eq!(c.age, 1);
        assert_eq!(c.day_time, 0);
    }

    #[test]
    fn test_half_day() {
        // 600 real seconds is half a game day
        let c = WorldCalendar::compute(600, 0, 6_000);
        assert_eq!(c.age, 0);
        assert_eq!(c.day_time, 18_000);
    }

    #[test]
    fn test_clock_before_creation_is_clamped() {
        let c = WorldCalendar::compute(10, 1_000, 0);
        assert_eq!(c, WorldCalendar::default());
    }

    #[test]
    fn test_night_window() {
        assert!(!WorldCalendar { age: 0, day_time: 7_000 }.is_night());
        assert!(WorldCalendar { age: 0, day_time: 18_000 }.is_night());
    }
}
