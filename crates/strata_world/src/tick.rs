//! # World Tick Loop
//!
//! Fixed-cadence scheduler for the world phases.
//!
//! ## Design
//!
//! Each tick runs every [`TickPhase`] in declaration order, measures the
//! wall time spent and then sleeps `max(0, target - elapsed)`. A late tick
//! is counted, never made up for: the next tick starts immediately.

use std::fmt;
use std::time::{Duration, Instant};

/// Phases of one tick, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TickPhase {
    /// Advance the world calendar.
    Calendar,
    /// Chunk lifecycle, generation hand-off, ticking blocks.
    Chunks,
    /// Mob brains and throttled saves.
    Mobs,
    /// Visibility updates and drop pickup.
    Players,
    /// Drop item motion.
    DropItems,
    /// Drain player intents.
    Inbound,
    /// Flush queued packets.
    Outbound,
    /// Apply deferred world actions that fell due.
    ActionQueue,
    /// Cache pruning and journal checkpoints.
    Maintenance,
}

impl TickPhase {
    /// Every phase in execution order.
    pub const ALL: [Self; 9] = [
        Self::Calendar,
        Self::Chunks,
        Self::Mobs,
        Self::Players,
        Self::DropItems,
        Self::Inbound,
        Self::Outbound,
        Self::ActionQueue,
        Self::Maintenance,
    ];

    /// Name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Calendar => "calendar",
            Self::Chunks => "chunks",
            Self::Mobs => "mobs",
            Self::Players => "players",
            Self::DropItems => "drop_items",
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
            Self::ActionQueue => "action_queue",
            Self::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for TickPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tick timing statistics.
#[derive(Clone, Debug, Default)]
pub struct TickStats {
    /// Minimum tick duration observed.
    pub min_tick_us: u64,
    /// Maximum tick duration observed.
    pub max_tick_us: u64,
    /// Average tick duration (rolling).
    pub avg_tick_us: u64,
    /// Number of late ticks (took longer than budget).
    pub late_ticks: u64,
    /// Total ticks measured.
    pub total_ticks: u64,
    /// Per-phase durations of the last tick, in execution order.
    pub last_phases: Vec<(TickPhase, u64)>,
}

impl TickStats {
    fn fresh(tick_duration: Duration) -> Self {
        Self {
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            avg_tick_us: micros(tick_duration),
            late_ticks: 0,
            total_ticks: 0,
            last_phases: Vec::with_capacity(TickPhase::ALL.len()),
        }
    }
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// Fixed-timestep tick loop controller.
pub struct TickLoop {
    /// Target tick duration.
    tick_duration: Duration,
    /// Start of the running tick.
    tick_start: Instant,
    /// Total ticks started.
    tick_count: u64,
    /// Phase timings collected during the running tick.
    phases: Vec<(TickPhase, u64)>,
    /// Frame time statistics.
    stats: TickStats,
}

impl TickLoop {
    /// Creates a loop with the given target tick duration.
    #[must_use]
    pub fn new(tick_duration: Duration) -> Self {
        Self {
            tick_duration,
            tick_start: Instant::now(),
            tick_count: 0,
            phases: Vec::with_capacity(TickPhase::ALL.len()),
            stats: TickStats::fresh(tick_duration),
        }
    }

    /// Creates a loop from a millisecond interval.
    #[must_use]
    pub fn from_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }

    /// Marks the start of a tick. Returns the new tick number.
    pub fn begin_tick(&mut self) -> u64 {
        self.tick_start = Instant::now();
        self.tick_count += 1;
        self.phases.clear();
        self.tick_count
    }

    /// Records how long a phase of the running tick took.
    pub fn record_phase(&mut self, phase: TickPhase, elapsed: Duration) {
        self.phases.push((phase, micros(elapsed)));
    }

    /// Marks the end of a tick and updates the statistics.
    ///
    /// Returns the time left until the next tick is due.
    pub fn end_tick(&mut self) -> Duration {
        let duration = self.tick_start.elapsed();
        let duration_us = micros(duration);

        self.stats.total_ticks += 1;
        self.stats.min_tick_us = self.stats.min_tick_us.min(duration_us);
        self.stats.max_tick_us = self.stats.max_tick_us.max(duration_us);

        // Rolling average
        self.stats.avg_tick_us = (self.stats.avg_tick_us * 15 + duration_us) / 16;

        if duration > self.tick_duration {
            self.stats.late_ticks += 1;
            tracing::debug!(
                "tick {} took {}us, budget {}us",
                self.tick_count,
                duration_us,
                micros(self.tick_duration)
            );
        }
        self.stats.last_phases.clone_from(&self.phases);
        self.tick_duration.saturating_sub(duration)
    }

    /// Sleeps until the next tick is due.
    pub fn wait_for_next_tick(&self) {
        let remaining = self.tick_duration.saturating_sub(self.tick_start.elapsed());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
    }

    /// Returns the current tick count.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Returns tick statistics.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Returns the target tick duration.
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    /// Resets statistics.
    pub fn reset_stats(&mut self) {
        self.stats = TickStats::fresh(self.tick_duration);
    }
}
