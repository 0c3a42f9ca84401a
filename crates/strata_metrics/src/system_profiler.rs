//! Per-system update timing

use crate::SystemTiming;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub struct SystemProfiler {
    timings: HashMap<String, SystemTiming>,
}

impl SystemProfiler {
    pub fn new() -> Self {
        Self {
            timings: HashMap::new(),
        }
    }

    pub fn time_system<F, R>(&mut self, name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();

        let timing = self.timings.entry(name.to_string()).or_default();
        timing.total += elapsed;
        timing.last = elapsed;
        timing.calls += 1;
        result
    }

    /// Accumulated time spent in `name` since the last reset.
    pub fn get_timing(&self, name: &str) -> Duration {
        self.timings
            .get(name)
            .map_or(Duration::ZERO, |timing| timing.total)
    }

    pub fn calls(&self, name: &str) -> u64 {
        self.timings.get(name).map_or(0, |timing| timing.calls)
    }

    pub fn reset(&mut self) {
        self.timings.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SystemTiming)> {
        self.timings.iter()
    }
}

impl Default for SystemProfiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_system_returns_result_and_counts_calls() {
        let mut profiler = SystemProfiler::new();
        let value = profiler.time_system("movement", || 7);
        profiler.time_system("movement", || ());
        assert_eq!(value, 7);
        assert_eq!(profiler.calls("movement"), 2);
        assert_eq!(profiler.calls("render"), 0);
        assert_eq!(profiler.get_timing("render"), Duration::ZERO);

        profiler.reset();
        assert_eq!(profiler.iter().count(), 0);
    }
}
