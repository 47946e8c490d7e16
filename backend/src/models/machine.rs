//! Machine model
//!
//! One processing stage of a production line. A machine owns:
//! - A FIFO queue of chips waiting for this stage
//! - An in-service slot (at most one chip at a time)
//! - Its running statistics
//!
//! # Critical Invariants
//!
//! 1. A chip is either in the queue, in service, or owned by the caller of
//!    [`Machine::service_next`], never two of those at once
//! 2. `max_queue_length` never decreases
//! 3. `processed_count` grows by exactly one per completed service, and
//!    the running totals are only committed together with that increment
//! 4. An interrupted service commits nothing and puts the chip back at the
//!    head of the queue
//!
//! Queue and counters sit behind one short-lived lock; statistics readers
//! copy them out and never hold the lock across a suspension.

use crate::core::signal::StopSignal;
use crate::core::time::SimClock;
use crate::models::chip::Chip;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Committed statistics of one machine (simulated seconds)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineCounters {
    /// Total time spent servicing chips
    pub busy_secs: f64,
    /// Sum of per-chip queue waits at this machine
    pub total_queue_secs: f64,
    /// Sum of per-chip service times at this machine
    pub total_service_secs: f64,
    /// Chips fully serviced
    pub processed_count: u64,
    /// Deepest queue observed
    pub max_queue_length: usize,
}

impl MachineCounters {
    /// Running mean of queue time over `processed_count` samples
    pub fn average_queue_time(&self) -> f64 {
        if self.processed_count == 0 {
            0.0
        } else {
            self.total_queue_secs / self.processed_count as f64
        }
    }

    /// Running mean of service time over `processed_count` samples
    pub fn average_service_time(&self) -> f64 {
        if self.processed_count == 0 {
            0.0
        } else {
            self.total_service_secs / self.processed_count as f64
        }
    }

    /// Busy time over shift time, clamped to [0, 1]; 0 for a non-positive shift
    pub fn utilization(&self, shift_secs: f64) -> f64 {
        if shift_secs <= 0.0 || !shift_secs.is_finite() {
            return 0.0;
        }
        (self.busy_secs / shift_secs).clamp(0.0, 1.0)
    }
}

/// Point-in-time view of a machine
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MachineSnapshot {
    pub queue_len: usize,
    pub in_service: bool,
    pub counters: MachineCounters,
}

/// Result of asking a machine to service its next chip
#[derive(Debug)]
pub enum ServiceOutcome {
    /// The head chip was fully serviced and is handed back to the caller
    Completed(Chip),
    /// Nothing was queued
    Empty,
    /// The stop signal fired; the chip (if any) is back at the queue head
    Interrupted,
}

#[derive(Debug, Default)]
struct MachineState {
    queue: VecDeque<Chip>,
    in_service: bool,
    counters: MachineCounters,
}

/// One processing stage with its own queue and statistics
#[derive(Debug)]
pub struct Machine {
    line: usize,
    index: usize,
    state: Mutex<MachineState>,
    work_ready: Condvar,
}

impl Machine {
    /// Create an idle machine at position `index` of line `line` (both 0-based)
    pub fn new(line: usize, index: usize) -> Self {
        Self {
            line,
            index,
            state: Mutex::new(MachineState::default()),
            work_ready: Condvar::new(),
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Append a chip to the queue tail and stamp its enter-queue time
    ///
    /// Returns the queue depth after the append.
    pub fn enqueue(&self, mut chip: Chip) -> usize {
        chip.mark_enter_queue(self.index, Instant::now());
        let mut state = self.state.lock();
        state.queue.push_back(chip);
        let depth = state.queue.len();
        if depth > state.counters.max_queue_length {
            state.counters.max_queue_length = depth;
        }
        self.work_ready.notify_one();
        depth
    }

    /// Pop the head chip, service it, and hand it back
    ///
    /// The service time is the chip's own sampled duration for this stage.
    /// The calling worker is suspended for that duration on `signal`; if the
    /// signal fires first, no service statistics are committed, the chip
    /// returns to the head of the queue and `Interrupted` is returned.
    pub fn service_next(&self, clock: &SimClock, signal: &StopSignal) -> ServiceOutcome {
        self.service_next_with(clock, signal, |_| {})
    }

    /// [`Machine::service_next`] with a hook run once the chip has left the
    /// queue and service is about to begin
    pub fn service_next_with<F>(
        &self,
        clock: &SimClock,
        signal: &StopSignal,
        on_start: F,
    ) -> ServiceOutcome
    where
        F: FnOnce(&Chip),
    {
        if signal.is_triggered() {
            return ServiceOutcome::Interrupted;
        }

        let (mut chip, queue_secs) = {
            let mut state = self.state.lock();
            let Some(mut chip) = state.queue.pop_front() else {
                return ServiceOutcome::Empty;
            };
            let now = Instant::now();
            chip.mark_leave_queue(self.index, now);
            let entered = chip.entered_queue_at(self.index).unwrap_or(now);
            state.in_service = true;
            (chip, clock.sim_between(entered, now))
        };

        on_start(&chip);
        let service_secs = chip.service_secs(self.index);
        let finished = signal.sleep(clock.to_wall(service_secs));

        let mut state = self.state.lock();
        state.in_service = false;
        if finished {
            let counters = &mut state.counters;
            counters.total_queue_secs += queue_secs;
            counters.total_service_secs += service_secs;
            counters.busy_secs += service_secs;
            counters.processed_count += 1;
            ServiceOutcome::Completed(chip)
        } else {
            chip.clear_leave_queue(self.index);
            state.queue.push_front(chip);
            let depth = state.queue.len();
            if depth > state.counters.max_queue_length {
                state.counters.max_queue_length = depth;
            }
            ServiceOutcome::Interrupted
        }
    }

    /// Block until a chip is queued, the signal fires, or `timeout` passes
    ///
    /// Returns `true` if the queue is non-empty on return.
    pub fn wait_for_work(&self, signal: &StopSignal, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if !state.queue.is_empty() {
            return true;
        }
        if signal.is_triggered() {
            return false;
        }
        self.work_ready.wait_for(&mut state, timeout);
        !state.queue.is_empty()
    }

    /// Wake any worker blocked in [`Machine::wait_for_work`]
    pub fn wake(&self) {
        let _state = self.state.lock();
        self.work_ready.notify_all();
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn in_service(&self) -> bool {
        self.state.lock().in_service
    }

    /// Nothing queued and nothing in service
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.queue.is_empty() && !state.in_service
    }

    /// Copy of the committed counters
    pub fn counters(&self) -> MachineCounters {
        self.state.lock().counters
    }

    /// Queue depth, service flag and counters read under one lock
    pub fn snapshot(&self) -> MachineSnapshot {
        let state = self.state.lock();
        MachineSnapshot {
            queue_len: state.queue.len(),
            in_service: state.in_service,
            counters: state.counters,
        }
    }

    pub fn utilization(&self, shift_secs: f64) -> f64 {
        self.counters().utilization(shift_secs)
    }

    pub fn average_queue_time(&self) -> f64 {
        self.counters().average_queue_time()
    }

    pub fn average_service_time(&self) -> f64 {
        self.counters().average_service_time()
    }

    pub fn max_queue_length(&self) -> usize {
        self.counters().max_queue_length
    }

    pub fn processed_count(&self) -> u64 {
        self.counters().processed_count
    }
}
