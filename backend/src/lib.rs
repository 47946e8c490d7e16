//! Chip Simulator Core - Rust Engine
//!
//! Concurrent simulation of a chip manufacturing shift: chips arrive at
//! random intervals, are dispatched to parallel production lines and move
//! through each line's machines in order, waiting in a FIFO queue at every
//! machine and spending a random service time on it.
//!
//! # Architecture
//!
//! - **core**: Simulated-time clock and the interruptible stop signal
//! - **models**: Domain types (Chip, Machine, ProductionLine, Event)
//! - **arrivals**: Arrival generation and line dispatch
//! - **orchestrator**: Engine lifecycle, workers and statistics
//! - **rng**: Seedable random number generation
//!
//! # Critical Invariants
//!
//! 1. Each machine serves at most one chip at a time, in FIFO order
//! 2. A chip visits the machines of its line in order, never skipping one
//! 3. Statistics never count a chip twice, even while the run is active
//! 4. After `stop`, every arrived chip is completed or waiting in a queue

// Module declarations
pub mod arrivals;
pub mod core;
pub mod models;
pub mod orchestrator;
pub mod rng;

// Re-exports for convenience
pub use arrivals::DispatchPolicy;
pub use core::{signal::StopSignal, time::SimClock};
pub use models::{
    chip::{Chip, ChipId, StageTiming},
    event::{Event, EventListener, EventLog},
};
pub use orchestrator::{
    EngineConfig, LineStatistics, MachineStatistics, RunInfo, ShiftConfig, SimulationEngine,
    SimulationError, SimulationStatsResponse, StartOutcome, Topology,
};
pub use rng::{RngManager, Variate};

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn chip_simulator_core_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::engine::PyEngine>()?;
    Ok(())
}
