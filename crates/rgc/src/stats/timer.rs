//! Phase Timer - Timing Utilities
//!
//! Utility for timing collection phases.

use std::time::{Duration, Instant};

/// PhaseTimer - records the duration of named phases in order
#[derive(Debug)]
pub struct PhaseTimer {
    start: Instant,
    phase_start: Instant,
    phases: Vec<(&'static str, Duration)>,
}

impl PhaseTimer {
    /// Start timing
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            phase_start: now,
            phases: Vec::new(),
        }
    }

    /// Close the current phase under `name` and start the next one
    pub fn phase(&mut self, name: &'static str) -> Duration {
        let now = Instant::now();
        let duration = now - self.phase_start;
        self.phases.push((name, duration));
        self.phase_start = now;
        log::trace!("Phase {} took {:?}", name, duration);
        duration
    }

    /// Time since the timer was created
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed milliseconds
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }

    /// Recorded phases
    pub fn phases(&self) -> &[(&'static str, Duration)] {
        &self.phases
    }
}

impl Default for PhaseTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phases_recorded_in_order() {
        let mut timer = PhaseTimer::new();
        timer.phase("mark");
        timer.phase("evacuate");
        let names: Vec<_> = timer.phases().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["mark", "evacuate"]);
        assert!(timer.elapsed() >= timer.phases()[0].1);
    }
}
