//! Arrival generation and dispatch
//!
//! New chips arrive at random intervals and are assigned to a line by a
//! [`DispatchPolicy`]. Each chip's full schedule (service time per machine,
//! transfer time per gap) is sampled once, at arrival.
//!
//! # Dispatch policies
//!
//! 1. **RoundRobin** (default): chip `n` (1-based) goes to line `(n - 1) % lines`
//! 2. **Random**: uniform line choice
//! 3. **Smart**: the first line (scanning from a rotating cursor) whose
//!    first machine is idle with an empty queue; otherwise the chip is
//!    parked in a [`PendingBuffer`] that idle lines drain as they free up
//!
//! # Example
//!
//! ```
//! use chip_simulator_core_rs::arrivals::{ArrivalGenerator, DispatchPolicy, PendingBuffer};
//! use chip_simulator_core_rs::models::{EventSink, ProductionLine, TimingTables};
//! use chip_simulator_core_rs::{RngManager, Variate};
//! use std::sync::Arc;
//!
//! let tables = Arc::new(TimingTables::new(vec![Variate::fixed(1.0)], vec![]));
//! let lines: Vec<_> = (0..2).map(|i| ProductionLine::new(i, 1, Arc::clone(&tables))).collect();
//! let pending = PendingBuffer::new();
//!
//! let mut generator = ArrivalGenerator::new(
//!     Variate::new(2.5, 0.5),
//!     DispatchPolicy::RoundRobin,
//!     RngManager::new(42),
//! );
//! generator.arrive(1, &lines, &pending, &EventSink::none());
//! generator.arrive(2, &lines, &pending, &EventSink::none());
//! assert_eq!(lines[0].in_queue_count(), 1);
//! assert_eq!(lines[1].in_queue_count(), 1);
//! ```

use crate::models::chip::Chip;
use crate::models::event::{Event, EventSink};
use crate::models::line::ProductionLine;
use crate::rng::{RngManager, Variate};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Rule assigning a newly arrived chip to a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    #[default]
    RoundRobin,
    Random,
    Smart,
}

impl std::str::FromStr for DispatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "round_robin" | "roundrobin" => Ok(DispatchPolicy::RoundRobin),
            "random" => Ok(DispatchPolicy::Random),
            "smart" => Ok(DispatchPolicy::Smart),
            other => Err(format!("unknown dispatch policy '{}'", other)),
        }
    }
}

/// Where an arriving chip ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Queued at the first machine of this line (0-based)
    Assigned(usize),
    /// Held in the pending buffer
    Parked,
}

/// Chips that arrived while no line could take them (smart dispatch only)
#[derive(Debug, Default)]
pub struct PendingBuffer {
    chips: Mutex<VecDeque<Chip>>,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn park(&self, chip: Chip) {
        self.chips.lock().push_back(chip);
    }

    pub fn len(&self) -> usize {
        self.chips.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chips.lock().is_empty()
    }

    /// Give the oldest parked chip to `line` if its first machine is free
    ///
    /// Returns `true` if a chip was handed over. The buffer stays locked
    /// until the chip is queued, so a concurrent arrival cannot slip into
    /// the same free line.
    pub fn claim_for(&self, line: &ProductionLine, events: &EventSink) -> bool {
        let mut chips = self.chips.lock();
        if chips.is_empty() || !line.is_accepting() {
            return false;
        }
        let Some(chip) = chips.pop_front() else {
            return false;
        };
        tracing::debug!(line = line.index(), chip = %chip.id(), "pending chip claimed");
        assign(chip, line, events);
        true
    }

    /// Smart dispatch of a new chip
    ///
    /// Assigns the chip to the first free line scanning from `cursor`, or
    /// parks it. A newcomer never jumps the backlog: while any chip is
    /// parked, new chips are parked behind it.
    pub fn admit_or_park(
        &self,
        chip: Chip,
        lines: &[ProductionLine],
        cursor: &mut usize,
        events: &EventSink,
    ) -> Dispatch {
        let mut chips = self.chips.lock();
        let count = lines.len();
        if chips.is_empty() && count > 0 {
            let start = *cursor;
            let found = (0..count)
                .map(|offset| (start + offset) % count)
                .find(|&idx| lines[idx].is_accepting());
            if let Some(idx) = found {
                *cursor = (idx + 1) % count;
                tracing::debug!(line = idx, chip = %chip.id(), "chip dispatched to free line");
                assign(chip, &lines[idx], events);
                return Dispatch::Assigned(idx);
            }
        }
        tracing::debug!(chip = %chip.id(), backlog = chips.len(), "no free line, chip parked");
        chips.push_back(chip);
        Dispatch::Parked
    }

    /// Assign every parked chip round-robin across `lines`, oldest first
    ///
    /// Used on shutdown so no arrived chip stays outside a line. Returns the
    /// number of chips moved.
    pub fn drain_into(&self, lines: &[ProductionLine], events: &EventSink) -> usize {
        if lines.is_empty() {
            return 0;
        }
        let chips: Vec<Chip> = self.chips.lock().drain(..).collect();
        let count = chips.len();
        for (i, chip) in chips.into_iter().enumerate() {
            assign(chip, &lines[i % lines.len()], events);
        }
        count
    }
}

/// Put a chip on a line: announce it, then queue it at the first machine
///
/// The event goes out before the enqueue so observers always see
/// `Arrival` ahead of the chip's `QueueToService`.
pub fn assign(mut chip: Chip, line: &ProductionLine, events: &EventSink) -> usize {
    chip.assign_line(line.index());
    events.emit(|| Event::Arrival {
        line_idx: line.index(),
        chip_id: chip.id(),
        service_times: chip.schedule().iter().map(|s| s.service_secs).collect(),
        transfer_times: chip
            .schedule()
            .iter()
            .take(chip.stage_count().saturating_sub(1))
            .map(|s| s.transfer_secs)
            .collect(),
    });
    line.admit(chip)
}

/// Produces chips and dispatches them to lines
pub struct ArrivalGenerator {
    /// Inter-arrival delay distribution (simulated seconds)
    interval: Variate,

    policy: DispatchPolicy,

    /// Stream for inter-arrival delays
    interval_rng: RngManager,

    /// Stream for line choice (random policy)
    dispatch_rng: RngManager,

    /// Stream for per-chip service/transfer schedules
    schedule_rng: RngManager,

    /// Starting point of the smart-dispatch scan
    cursor: usize,
}

impl ArrivalGenerator {
    /// Create a generator; independent streams are derived from `rng`
    pub fn new(interval: Variate, policy: DispatchPolicy, rng: RngManager) -> Self {
        Self {
            interval,
            policy,
            interval_rng: rng.derive(0),
            dispatch_rng: rng.derive(1),
            schedule_rng: rng.derive(2),
            cursor: 0,
        }
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    /// Sample the delay before the next arrival (simulated seconds)
    pub fn next_interval(&mut self) -> f64 {
        self.interval.sample(&mut self.interval_rng)
    }

    /// Create chip number `ordinal` (1-based) and dispatch it
    pub fn arrive(
        &mut self,
        ordinal: u64,
        lines: &[ProductionLine],
        pending: &PendingBuffer,
        events: &EventSink,
    ) -> Dispatch {
        let schedule = match lines.first() {
            Some(line) => line.sample_schedule(&mut self.schedule_rng),
            None => Vec::new(),
        };
        let chip = Chip::new(ordinal, 0, schedule);

        let count = lines.len();
        let idx = match self.policy {
            _ if count == 0 => None,
            DispatchPolicy::RoundRobin => Some((ordinal.saturating_sub(1) % count as u64) as usize),
            DispatchPolicy::Random => Some(self.dispatch_rng.range(0, count as i64) as usize),
            DispatchPolicy::Smart => {
                let outcome = pending.admit_or_park(chip, lines, &mut self.cursor, events);
                if outcome == Dispatch::Parked {
                    // Idle first machines re-check the backlog
                    for line in lines {
                        if let Some(first) = line.machine(0) {
                            first.wake();
                        }
                    }
                }
                return outcome;
            }
        };

        match idx {
            Some(idx) => {
                tracing::debug!(line = idx, chip = %chip.id(), ordinal, "chip dispatched");
                assign(chip, &lines[idx], events);
                Dispatch::Assigned(idx)
            }
            None => {
                tracing::warn!(chip = %chip.id(), ordinal, "no lines to dispatch to, chip parked");
                pending.park(chip);
                Dispatch::Parked
            }
        }
    }
}
