//! Time and cancellation primitives shared by every worker of a run

pub mod signal;
pub mod time;
