//! Orchestrator module - simulation lifecycle and statistics

pub mod engine;
pub mod fingerprint;
pub mod stats;
mod workers;

pub use engine::{
    EngineConfig, ShiftConfig, SimulationEngine, SimulationError, StartOutcome, Topology,
    MAX_MACHINES, MAX_POLL_INTERVAL_MS,
};
pub use fingerprint::{compute_config_hash, RunInfo};
pub use stats::{LineStatistics, MachineStatistics, SimulationStatsResponse, StatsAggregator};
