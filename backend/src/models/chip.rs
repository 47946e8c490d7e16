//! Chip model
//!
//! A chip is the unit of work flowing through a production line. Each chip
//! carries:
//! - A unique identifier (UUID v4)
//! - Its arrival instant and arrival ordinal within the run
//! - The line it was dispatched to
//! - A per-machine schedule of service and transfer durations, sampled
//!   once at dispatch
//! - Per-machine enter/leave queue stamps
//!
//! A chip is moved, never shared: whichever queue or worker holds it owns it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

/// Opaque chip identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChipId(Uuid);

impl ChipId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ChipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Sampled durations for one stage of a chip's traversal (simulated seconds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    /// Time the machine at this stage spends on the chip
    pub service_secs: f64,
    /// Transfer delay to the next machine (0 for the last stage)
    pub transfer_secs: f64,
}

/// A work item travelling through one production line
///
/// # Example
/// ```
/// use chip_simulator_core_rs::{Chip, StageTiming};
///
/// let schedule = vec![
///     StageTiming { service_secs: 12.0, transfer_secs: 2.0 },
///     StageTiming { service_secs: 13.0, transfer_secs: 0.0 },
/// ];
/// let chip = Chip::new(1, 0, schedule);
/// assert_eq!(chip.stage_count(), 2);
/// assert_eq!(chip.service_secs(1), 13.0);
/// ```
#[derive(Debug, Clone)]
pub struct Chip {
    id: ChipId,

    /// 1-based arrival ordinal within the run
    ordinal: u64,

    /// Index of the line this chip was dispatched to
    line: usize,

    arrived_at: Instant,

    schedule: Vec<StageTiming>,

    enter_queue_at: Vec<Option<Instant>>,

    leave_queue_at: Vec<Option<Instant>>,
}

impl Chip {
    /// Create a chip stamped with the current instant
    pub fn new(ordinal: u64, line: usize, schedule: Vec<StageTiming>) -> Self {
        let stages = schedule.len();
        Self {
            id: ChipId::new(),
            ordinal,
            line,
            arrived_at: Instant::now(),
            schedule,
            enter_queue_at: vec![None; stages],
            leave_queue_at: vec![None; stages],
        }
    }

    pub fn id(&self) -> ChipId {
        self.id
    }

    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn arrived_at(&self) -> Instant {
        self.arrived_at
    }

    pub fn schedule(&self) -> &[StageTiming] {
        &self.schedule
    }

    pub fn stage_count(&self) -> usize {
        self.schedule.len()
    }

    /// Sampled service time at `stage`, 0 if the stage does not exist
    pub fn service_secs(&self, stage: usize) -> f64 {
        self.schedule.get(stage).map_or(0.0, |t| t.service_secs)
    }

    /// Sampled transfer time leaving `stage`, 0 if the stage does not exist
    pub fn transfer_secs(&self, stage: usize) -> f64 {
        self.schedule.get(stage).map_or(0.0, |t| t.transfer_secs)
    }

    /// Assign the chip to a line
    ///
    /// Used when a chip parked by smart dispatch is finally given a line.
    /// All lines of a run share one shape, so the schedule stays valid.
    pub(crate) fn assign_line(&mut self, line: usize) {
        self.line = line;
    }

    pub(crate) fn mark_enter_queue(&mut self, stage: usize, at: Instant) {
        if let Some(slot) = self.enter_queue_at.get_mut(stage) {
            *slot = Some(at);
        }
    }

    pub(crate) fn mark_leave_queue(&mut self, stage: usize, at: Instant) {
        if let Some(slot) = self.leave_queue_at.get_mut(stage) {
            *slot = Some(at);
        }
    }

    pub(crate) fn clear_leave_queue(&mut self, stage: usize) {
        if let Some(slot) = self.leave_queue_at.get_mut(stage) {
            *slot = None;
        }
    }

    pub fn entered_queue_at(&self, stage: usize) -> Option<Instant> {
        self.enter_queue_at.get(stage).copied().flatten()
    }

    pub fn left_queue_at(&self, stage: usize) -> Option<Instant> {
        self.leave_queue_at.get(stage).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(n: usize) -> Vec<StageTiming> {
        vec![
            StageTiming {
                service_secs: 1.0,
                transfer_secs: 0.5,
            };
            n
        ]
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Chip::new(1, 0, schedule(2));
        let b = Chip::new(2, 0, schedule(2));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_out_of_range_stage_is_zero() {
        let chip = Chip::new(1, 0, schedule(1));
        assert_eq!(chip.service_secs(5), 0.0);
        assert_eq!(chip.transfer_secs(5), 0.0);
        assert_eq!(chip.entered_queue_at(5), None);
    }

    #[test]
    fn test_assign_line_keeps_schedule() {
        let mut chip = Chip::new(1, 0, schedule(2));
        chip.assign_line(2);
        assert_eq!(chip.line(), 2);
        assert_eq!(chip.stage_count(), 2);
    }
}
