//! Deterministic simulation clock
//!
//! The simulation advances in fixed ticks. Wall-clock time never feeds into
//! system updates, so a run replays identically at any frame rate.

use std::time::Duration;

/// Default fixed simulation tick rate (60 Hz = ~16.666ms per tick)
pub const TICK_RATE_HZ: u32 = 60;
pub const TICK_DURATION: Duration = Duration::from_micros(16_666);

/// Simulation time tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationTime {
    tick_count: u64,
    tick_duration: Duration,
    accumulated_time: Duration,
}

impl SimulationTime {
    pub fn new() -> Self {
        Self::with_tick_duration(TICK_DURATION)
    }

    /// Clock ticking `hz` times per simulated second. `hz == 0` is treated
    /// as the default rate; settings validation rejects it earlier.
    pub fn with_rate(hz: u32) -> Self {
        if hz == 0 {
            return Self::new();
        }
        Self::with_tick_duration(Duration::from_secs(1) / hz)
    }

    pub fn with_tick_duration(tick_duration: Duration) -> Self {
        Self {
            tick_count: 0,
            tick_duration,
            accumulated_time: Duration::ZERO,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Fixed step between ticks.
    pub fn delta(&self) -> Duration {
        self.tick_duration
    }

    /// Fixed step in seconds, for integrating velocities.
    pub fn delta_secs(&self) -> f32 {
        self.tick_duration.as_secs_f32()
    }

    pub fn advance_tick(&mut self) {
        self.tick_count += 1;
        self.accumulated_time += self.tick_duration;
    }

    pub fn total_time(&self) -> Duration {
        self.accumulated_time
    }
}

impl Default for SimulationTime {
    fn default() -> Self {
        Self::new()
    }
}
