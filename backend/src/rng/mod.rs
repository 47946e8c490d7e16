//! Random number generation for the stochastic steps of a run
//!
//! Uses xorshift64* for fast, seedable generation. Every arrival delay,
//! service time and transfer time is drawn through this module.

mod variate;
mod xorshift;

pub use variate::Variate;
pub use xorshift::RngManager;
