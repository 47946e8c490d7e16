//! Bounded-uniform random durations
//!
//! A [`Variate`] is the `mean ± deviation` pair used by every stochastic
//! step of a run: inter-arrival delays, per-machine service times and
//! per-gap transfer times. All values are simulated seconds.

use super::RngManager;
use serde::{Deserialize, Serialize};

/// A duration distributed uniformly over `[mean - deviation, mean + deviation]`
///
/// # Example
/// ```
/// use chip_simulator_core_rs::{RngManager, Variate};
///
/// let service = Variate::new(12.0, 1.0);
/// let mut rng = RngManager::new(1);
/// let secs = service.sample(&mut rng);
/// assert!((11.0..=13.0).contains(&secs));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Variate {
    /// Centre of the interval in simulated seconds
    pub mean: f64,
    /// Half-width of the interval in simulated seconds (must be ≥ 0)
    pub deviation: f64,
}

impl Variate {
    pub const fn new(mean: f64, deviation: f64) -> Self {
        Self { mean, deviation }
    }

    /// A variate that always yields `secs`
    pub const fn fixed(secs: f64) -> Self {
        Self::new(secs, 0.0)
    }

    /// Draw one duration in simulated seconds
    ///
    /// Negative draws (possible when `deviation > mean`) are clamped to 0.
    pub fn sample(&self, rng: &mut RngManager) -> f64 {
        rng.uniform(self.mean, self.deviation).max(0.0)
    }

    /// Check the parameters are usable
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if !self.mean.is_finite() || self.mean < 0.0 {
            return Err(format!("mean must be finite and non-negative, got {}", self.mean));
        }
        if !self.deviation.is_finite() || self.deviation < 0.0 {
            return Err(format!(
                "deviation must be finite and non-negative, got {}",
                self.deviation
            ));
        }
        Ok(())
    }
}

impl From<(f64, f64)> for Variate {
    fn from((mean, deviation): (f64, f64)) -> Self {
        Self::new(mean, deviation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_is_deterministic() {
        let mut rng = RngManager::new(5);
        let v = Variate::fixed(1.0);
        for _ in 0..10 {
            assert_eq!(v.sample(&mut rng), 1.0);
        }
    }

    #[test]
    fn test_zero_mean_zero_deviation() {
        let mut rng = RngManager::new(5);
        assert_eq!(Variate::new(0.0, 0.0).sample(&mut rng), 0.0);
    }

    #[test]
    fn test_negative_draws_clamped() {
        let mut rng = RngManager::new(5);
        let v = Variate::new(0.5, 2.0);
        for _ in 0..500 {
            assert!(v.sample(&mut rng) >= 0.0);
        }
    }

    #[test]
    fn test_validate_rejects_negative_deviation() {
        assert!(Variate::new(1.0, -0.1).validate().is_err());
        assert!(Variate::new(f64::NAN, 0.0).validate().is_err());
        assert!(Variate::new(0.0, 0.0).validate().is_ok());
    }
}
