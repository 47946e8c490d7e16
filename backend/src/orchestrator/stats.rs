//! Statistics rollup
//!
//! Builds the [`SimulationStatsResponse`] returned by
//! `SimulationEngine::get_stats`. The rollup reads every counter while the
//! workers keep running, one short lock at a time; it never holds a lock
//! that spans more than one machine.
//!
//! # Read order
//!
//! Chips only move forward (pending → machine 0 → transit → machine 1 →
//! … → completed), so the aggregator reads each line back to front and the
//! arrival counter last. A chip that moves during the read can then be
//! missed but never counted twice, which keeps
//! `completed + inQueue + inService + inTransit + pending ≤ totalArrived`
//! at every observation.

use crate::models::line::ProductionLine;
use crate::models::machine::MachineSnapshot;
use serde::{Deserialize, Serialize};

/// Per-machine figures (times in simulated seconds)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatistics {
    /// 0-based position in the line
    pub machine_index: usize,
    /// Busy time over shift duration, in [0, 1]
    pub utilization: f64,
    pub average_queue_time: f64,
    pub average_service_time: f64,
    pub max_queue_length: usize,
    pub processed_count: u64,
}

impl MachineStatistics {
    pub fn from_snapshot(machine_index: usize, snapshot: &MachineSnapshot, shift_secs: f64) -> Self {
        let counters = &snapshot.counters;
        Self {
            machine_index,
            utilization: counters.utilization(shift_secs),
            average_queue_time: counters.average_queue_time(),
            average_service_time: counters.average_service_time(),
            max_queue_length: counters.max_queue_length,
            processed_count: counters.processed_count,
        }
    }
}

/// Per-line figures
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineStatistics {
    /// 1-based line number
    pub line_number: usize,
    /// Chips that left the last machine
    pub completed_count: u64,
    /// Chips waiting in any machine queue of this line
    pub in_queue_count: usize,
    /// Chips currently being serviced on this line
    pub in_service_count: usize,
    /// Chips on the conveyor between two machines
    #[serde(default)]
    pub in_transit_count: usize,
    pub machines: Vec<MachineStatistics>,
}

/// Snapshot of a run, safe to take while the run is active
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationStatsResponse {
    pub total_arrived: u64,
    /// Sum of `completed_count` over all lines
    pub total_processed: u64,
    /// `total_arrived - total_processed`
    pub total_unprocessed: u64,
    /// Chips parked by smart dispatch, not yet assigned to a line
    #[serde(default)]
    pub pending_count: usize,
    pub lines: Vec<LineStatistics>,
}

impl SimulationStatsResponse {
    /// The response returned before any run has started
    pub fn empty() -> Self {
        Self::default()
    }

    /// Chips visible anywhere in the system or completed
    pub fn accounted_chips(&self) -> u64 {
        let in_lines: u64 = self
            .lines
            .iter()
            .map(|l| (l.in_queue_count + l.in_service_count + l.in_transit_count) as u64)
            .sum();
        self.total_processed + in_lines + self.pending_count as u64
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Rolls per-machine and per-line counters up into a response
pub struct StatsAggregator;

impl StatsAggregator {
    /// Build a response from live lines
    ///
    /// `pending` and `total_arrived` are closures so that they are read
    /// after the lines, in the order described in the module docs.
    pub fn collect<P, A>(
        lines: &[ProductionLine],
        shift_secs: f64,
        pending: P,
        total_arrived: A,
    ) -> SimulationStatsResponse
    where
        P: FnOnce() -> usize,
        A: FnOnce() -> u64,
    {
        let lines: Vec<LineStatistics> = lines
            .iter()
            .map(|line| line.collect_statistics(line.index() + 1, shift_secs))
            .collect();
        let pending_count = pending();
        let total_arrived = total_arrived();

        Self::assemble(lines, pending_count, total_arrived)
    }

    /// Compute the run-level totals from already collected lines
    pub fn assemble(
        lines: Vec<LineStatistics>,
        pending_count: usize,
        total_arrived: u64,
    ) -> SimulationStatsResponse {
        let total_processed: u64 = lines.iter().map(|l| l.completed_count).sum();
        SimulationStatsResponse {
            total_arrived,
            total_processed,
            total_unprocessed: total_arrived.saturating_sub(total_processed),
            pending_count,
            lines,
        }
    }
}
