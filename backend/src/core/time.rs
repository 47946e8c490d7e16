//! Time management for the simulation
//!
//! All configured durations are simulated seconds. A run is paced against
//! the wall clock through a time scale: `time_scale` wall seconds elapse
//! per simulated second. A scale of 1.0 runs in real time, 0.01 runs a
//! one-hour shift in 36 wall seconds.

use std::time::{Duration, Instant};

/// Longest wall delay a single suspension can ask for (about 136 years)
pub const MAX_WALL_DELAY: Duration = Duration::from_secs(u32::MAX as u64);

/// Converts between simulated seconds and wall-clock time for one run
///
/// # Example
/// ```
/// use chip_simulator_core_rs::SimClock;
/// use std::time::Duration;
///
/// let clock = SimClock::new(0.5);
/// assert_eq!(clock.to_wall(4.0), Duration::from_secs(2));
/// assert_eq!(clock.to_sim(Duration::from_secs(2)), 4.0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SimClock {
    /// Wall instant at which the run started
    started_at: Instant,
    /// Wall seconds per simulated second
    time_scale: f64,
}

impl SimClock {
    /// Create a clock starting now
    ///
    /// # Panics
    /// Panics if `time_scale` is not finite and positive.
    pub fn new(time_scale: f64) -> Self {
        assert!(
            time_scale.is_finite() && time_scale > 0.0,
            "time_scale must be positive"
        );
        Self {
            started_at: Instant::now(),
            time_scale,
        }
    }

    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Wall-clock duration of `sim_secs` simulated seconds
    ///
    /// Negative or non-finite inputs map to zero; results are capped at
    /// [`MAX_WALL_DELAY`].
    pub fn to_wall(&self, sim_secs: f64) -> Duration {
        let wall = sim_secs * self.time_scale;
        if wall.is_finite() && wall > 0.0 {
            Duration::from_secs_f64(wall.min(MAX_WALL_DELAY.as_secs_f64()))
        } else {
            Duration::ZERO
        }
    }

    /// Simulated seconds represented by a wall-clock duration
    pub fn to_sim(&self, wall: Duration) -> f64 {
        wall.as_secs_f64() / self.time_scale
    }

    /// Simulated seconds between two wall instants (0 if `to` precedes `from`)
    pub fn sim_between(&self, from: Instant, to: Instant) -> f64 {
        self.to_sim(to.saturating_duration_since(from))
    }

    /// Simulated seconds elapsed since the run started
    pub fn elapsed_sim(&self) -> f64 {
        self.to_sim(self.started_at.elapsed())
    }
}
