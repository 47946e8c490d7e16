//! xorshift64* random number generator
//!
//! A fast PRNG with 64-bit state. It is not thread-safe by itself: each
//! stochastic stream owns its own `RngManager`, and independent streams
//! are split off a master seed with [`RngManager::derive`].
//!
//! # Determinism
//!
//! Same seed → same sequence of random numbers. Tests rely on this to
//! reproduce a dispatch order or a sampled schedule.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seedable random number generator using xorshift64*
///
/// # Example
/// ```
/// use chip_simulator_core_rs::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let value = rng.next();
/// let line = rng.range(0, 3); // [0, 3)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngManager {
    /// Internal state (64-bit)
    state: u64,
}

impl RngManager {
    /// Create a new RNG with given seed
    ///
    /// # Example
    /// ```
    /// use chip_simulator_core_rs::RngManager;
    ///
    /// let rng = RngManager::new(12345);
    /// ```
    pub fn new(seed: u64) -> Self {
        // Ensure seed is never zero (xorshift requirement)
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Create an RNG seeded from the system clock
    ///
    /// Used when a run is started without an explicit seed.
    pub fn from_entropy() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9E37_79B9_7F4A_7C15);
        Self::new(splitmix64(nanos))
    }

    /// Split off an independent generator for a numbered stream
    ///
    /// The child seed is a SplitMix64 scramble of the parent state mixed
    /// with `stream`, so two streams derived from the same parent never
    /// share a sequence. The parent is not advanced.
    ///
    /// # Example
    /// ```
    /// use chip_simulator_core_rs::RngManager;
    ///
    /// let master = RngManager::new(42);
    /// let mut arrivals = master.derive(0);
    /// let mut dispatch = master.derive(1);
    /// assert_ne!(arrivals.next(), dispatch.next());
    /// ```
    pub fn derive(&self, stream: u64) -> Self {
        let mixed = self.state ^ stream.wrapping_mul(0xD1B5_4A32_D192_ED03);
        Self::new(splitmix64(mixed))
    }

    /// Generate next random u64 value
    pub fn next(&mut self) -> u64 {
        // xorshift64* algorithm
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Generate random value in range [min, max)
    ///
    /// # Panics
    /// Panics if min >= max
    pub fn range(&mut self, min: i64, max: i64) -> i64 {
        assert!(min < max, "min must be less than max");

        let value = self.next();
        let range_size = (max - min) as u64;
        min + (value % range_size) as i64
    }

    /// Get current RNG state
    pub fn get_state(&self) -> u64 {
        self.state
    }

    /// Generate random f64 in range [0.0, 1.0)
    ///
    /// # Example
    /// ```
    /// use chip_simulator_core_rs::RngManager;
    ///
    /// let mut rng = RngManager::new(12345);
    /// let probability = rng.next_f64();
    /// assert!(probability >= 0.0 && probability < 1.0);
    /// ```
    pub fn next_f64(&mut self) -> f64 {
        let value = self.next();
        // Convert to [0.0, 1.0) by dividing by 2^53
        (value >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Draw uniformly from `[mean - deviation, mean + deviation]`
    ///
    /// A zero deviation returns `mean` exactly and does not advance the
    /// generator.
    pub fn uniform(&mut self, mean: f64, deviation: f64) -> f64 {
        if deviation <= 0.0 {
            return mean;
        }
        mean - deviation + self.next_f64() * (2.0 * deviation)
    }
}

fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
