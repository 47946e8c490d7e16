//! Production line model
//!
//! An ordered sequence of machines plus the conveyor that carries chips
//! between them. A line owns its machines exclusively; chips cross from
//! machine `m` to machine `m + 1` only through an explicit handoff, never
//! by touching another machine's counters.
//!
//! Durations come from [`TimingTables`], looked up with index clamping: a
//! line longer than a table reuses the table's last entry.

use crate::core::signal::StopSignal;
use crate::core::time::SimClock;
use crate::models::chip::{Chip, StageTiming};
use crate::models::event::{Event, EventSink};
use crate::models::machine::{Machine, ServiceOutcome};
use crate::orchestrator::stats::{LineStatistics, MachineStatistics};
use crate::rng::{RngManager, Variate};
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Service and transfer parameter tables shared by every line of a run
#[derive(Debug, Clone, PartialEq)]
pub struct TimingTables {
    service: Vec<Variate>,
    transfer: Vec<Variate>,
}

impl TimingTables {
    pub fn new(service: Vec<Variate>, transfer: Vec<Variate>) -> Self {
        Self { service, transfer }
    }

    /// Service parameters for machine `index`, clamped to the table length
    ///
    /// An empty table yields a zero-length service.
    pub fn service_for(&self, index: usize) -> Variate {
        clamped(&self.service, index)
    }

    /// Transfer parameters for the gap `index → index + 1`, clamped
    pub fn transfer_for(&self, gap: usize) -> Variate {
        clamped(&self.transfer, gap)
    }

    /// Sample a full schedule for a chip on a line of `machines` machines
    ///
    /// The last stage has no transfer.
    pub fn sample_schedule(&self, machines: usize, rng: &mut RngManager) -> Vec<StageTiming> {
        (0..machines)
            .map(|m| StageTiming {
                service_secs: self.service_for(m).sample(rng),
                transfer_secs: if m + 1 < machines {
                    self.transfer_for(m).sample(rng)
                } else {
                    0.0
                },
            })
            .collect()
    }
}

fn clamped(table: &[Variate], index: usize) -> Variate {
    match table.len() {
        0 => Variate::fixed(0.0),
        len => table[index.min(len - 1)],
    }
}

/// What a per-line worker achieved in one [`ProductionLine::process_next`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStep {
    /// A chip went through every machine and left the line
    Completed,
    /// The first machine had nothing queued
    Idle,
    /// The stop signal fired mid-traversal; the chip is parked in a queue
    Interrupted,
}

/// A chip travelling between two machines
#[derive(Debug)]
struct InTransit {
    due: Instant,
    seq: u64,
    to: usize,
    chip: Chip,
}

impl PartialEq for InTransit {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for InTransit {}

impl PartialOrd for InTransit {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for InTransit {
    // Reversed so the max-heap pops the earliest due chip first
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
struct Belt {
    items: BinaryHeap<InTransit>,
    next_seq: u64,
}

/// Transfer stage of a line: holds chips until their transfer delay elapses
///
/// Chips are released in due order, so a fast transfer may overtake a slow
/// one on a different gap, but two chips heading for the same machine keep
/// the order their transfers finish in.
#[derive(Debug, Default)]
pub struct Conveyor {
    belt: Mutex<Belt>,
    moved: Condvar,
}

impl Conveyor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a chip on the belt, bound for machine `to`, released at `due`
    pub fn load(&self, chip: Chip, to: usize, due: Instant) {
        let mut belt = self.belt.lock();
        let seq = belt.next_seq;
        belt.next_seq += 1;
        belt.items.push(InTransit { due, seq, to, chip });
        self.moved.notify_all();
    }

    /// Wait for the next chip whose transfer is over
    ///
    /// Returns `None` once `signal` fires. `max_wait` bounds each wait so a
    /// missed wake-up costs at most one interval.
    pub fn take_due(&self, signal: &StopSignal, max_wait: Duration) -> Option<(usize, Chip)> {
        let mut belt = self.belt.lock();
        loop {
            if signal.is_triggered() {
                return None;
            }
            let now = Instant::now();
            let next_due = belt.items.peek().map(|item| item.due);
            match next_due {
                Some(due) if due <= now => {
                    let item = belt.items.pop()?;
                    return Some((item.to, item.chip));
                }
                Some(due) => {
                    self.moved.wait_until(&mut belt, due.min(now + max_wait));
                }
                None => {
                    self.moved.wait_for(&mut belt, max_wait);
                }
            }
        }
    }

    /// Remove every chip regardless of due time, earliest first
    pub fn unload_all(&self) -> Vec<(usize, Chip)> {
        let mut belt = self.belt.lock();
        let mut out = Vec::with_capacity(belt.items.len());
        while let Some(item) = belt.items.pop() {
            out.push((item.to, item.chip));
        }
        out
    }

    /// Chips on the belt heading for machine `to`
    pub fn in_transit_to(&self, to: usize) -> usize {
        self.belt.lock().items.iter().filter(|i| i.to == to).count()
    }

    pub fn len(&self) -> usize {
        self.belt.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wake a worker blocked in [`Conveyor::take_due`]
    pub fn wake(&self) {
        let _belt = self.belt.lock();
        self.moved.notify_all();
    }
}

/// An ordered sequence of machines
///
/// # Example
/// ```
/// use chip_simulator_core_rs::models::{ProductionLine, TimingTables};
/// use chip_simulator_core_rs::{RngManager, Variate};
/// use std::sync::Arc;
///
/// let tables = Arc::new(TimingTables::new(
///     vec![Variate::new(12.0, 1.0), Variate::new(13.0, 3.0)],
///     vec![Variate::new(2.0, 1.0)],
/// ));
/// let line = ProductionLine::new(0, 3, tables);
/// let mut rng = RngManager::new(1);
/// let schedule = line.sample_schedule(&mut rng);
/// assert_eq!(schedule.len(), 3);
/// assert_eq!(schedule[2].transfer_secs, 0.0);
/// ```
#[derive(Debug)]
pub struct ProductionLine {
    index: usize,
    machines: Vec<Machine>,
    conveyor: Conveyor,
    tables: Arc<TimingTables>,
    completed: AtomicU64,
}

impl ProductionLine {
    /// Create line `index` (0-based) with `machine_count` idle machines
    pub fn new(index: usize, machine_count: usize, tables: Arc<TimingTables>) -> Self {
        Self {
            index,
            machines: (0..machine_count).map(|m| Machine::new(index, m)).collect(),
            conveyor: Conveyor::new(),
            tables,
            completed: AtomicU64::new(0),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn machine_count(&self) -> usize {
        self.machines.len()
    }

    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    pub fn machine(&self, index: usize) -> Option<&Machine> {
        self.machines.get(index)
    }

    pub fn conveyor(&self) -> &Conveyor {
        &self.conveyor
    }

    /// Sample a chip schedule sized for this line
    pub fn sample_schedule(&self, rng: &mut RngManager) -> Vec<StageTiming> {
        self.tables.sample_schedule(self.machines.len(), rng)
    }

    /// Queue a chip at the first machine; returns the resulting queue depth
    pub fn admit(&self, chip: Chip) -> usize {
        match self.machines.first() {
            Some(first) => first.enqueue(chip),
            None => 0,
        }
    }

    /// First machine has nothing queued and nothing in service
    pub fn is_accepting(&self) -> bool {
        self.machines.first().is_some_and(Machine::is_idle)
    }

    /// Record a chip leaving the last machine; the chip is dropped
    pub fn complete(&self, chip: Chip, events: &EventSink) {
        self.completed.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(line = self.index, chip = %chip.id(), "chip completed");
        events.emit(|| Event::Completion {
            line_idx: self.index,
            chip_id: chip.id(),
        });
    }

    pub fn completed_count(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Drive the chip at the head of the first machine through the whole line
    ///
    /// This is the per-line (sequential) worker step: service at machine 0,
    /// transfer, enqueue and service at machine 1, and so on. Transfers are
    /// suspensions on `signal`; an interrupted transfer still delivers the
    /// chip to the next queue so no chip is lost.
    pub fn process_next(&self, clock: &SimClock, signal: &StopSignal, events: &EventSink) -> LineStep {
        let mut stage = 0;
        loop {
            let Some(machine) = self.machines.get(stage) else {
                return LineStep::Idle;
            };
            let chip = match self.service_at(machine, clock, signal, events) {
                ServiceOutcome::Completed(chip) => chip,
                ServiceOutcome::Empty => return LineStep::Idle,
                ServiceOutcome::Interrupted => return LineStep::Interrupted,
            };

            let Some(next) = self.machines.get(stage + 1) else {
                self.complete(chip, events);
                return LineStep::Completed;
            };

            self.emit_transfer(&chip, stage, events);
            let arrived = signal.sleep(clock.to_wall(chip.transfer_secs(stage)));
            next.enqueue(chip);
            if !arrived {
                return LineStep::Interrupted;
            }
            stage += 1;
        }
    }

    /// Service the head chip of machine `stage` (per-machine topology)
    ///
    /// `Empty` if `stage` is out of range or its queue is empty.
    pub fn service_stage(
        &self,
        stage: usize,
        clock: &SimClock,
        signal: &StopSignal,
        events: &EventSink,
    ) -> ServiceOutcome {
        match self.machines.get(stage) {
            Some(machine) => self.service_at(machine, clock, signal, events),
            None => ServiceOutcome::Empty,
        }
    }

    fn service_at(
        &self,
        machine: &Machine,
        clock: &SimClock,
        signal: &StopSignal,
        events: &EventSink,
    ) -> ServiceOutcome {
        machine.service_next_with(clock, signal, |chip| {
            if machine.index() == 0 {
                self.emit_queue_to_service(chip, events);
            }
        })
    }

    /// Hand a chip serviced at `stage` to the next stage (per-machine topology)
    ///
    /// The chip goes on the conveyor, or completes if `stage` is the last
    /// machine.
    pub fn forward(&self, chip: Chip, stage: usize, clock: &SimClock, events: &EventSink) {
        if stage + 1 >= self.machines.len() {
            self.complete(chip, events);
            return;
        }
        self.emit_transfer(&chip, stage, events);
        let due = Instant::now() + clock.to_wall(chip.transfer_secs(stage));
        self.conveyor.load(chip, stage + 1, due);
    }

    /// Deliver a chip taken off the conveyor into machine `to`'s queue
    pub fn deliver(&self, to: usize, chip: Chip) {
        match self.machines.get(to) {
            Some(machine) => {
                machine.enqueue(chip);
            }
            None => tracing::warn!(line = self.index, to, "conveyor target out of range"),
        }
    }

    /// Move everything still on the conveyor into its destination queue
    pub fn flush_conveyor(&self) -> usize {
        let items = self.conveyor.unload_all();
        let count = items.len();
        for (to, chip) in items {
            self.deliver(to, chip);
        }
        count
    }

    /// Wake every worker blocked on this line's machines or conveyor
    pub fn wake_all(&self) {
        for machine in &self.machines {
            machine.wake();
        }
        self.conveyor.wake();
    }

    /// Chips waiting in any queue of this line
    pub fn in_queue_count(&self) -> usize {
        self.machines.iter().map(Machine::queue_len).sum()
    }

    /// Chips currently in service on this line
    pub fn in_service_count(&self) -> usize {
        self.machines.iter().filter(|m| m.in_service()).count()
    }

    /// Per-line statistics record
    ///
    /// Reads back to front (completed, last machine, its inbound transfers,
    /// …, first machine) so a chip moving forward during the read is never
    /// counted twice.
    pub fn collect_statistics(&self, line_number: usize, shift_secs: f64) -> LineStatistics {
        let completed_count = self.completed_count();
        let mut in_queue_count = 0;
        let mut in_service_count = 0;
        let mut in_transit_count = 0;
        let mut machines = Vec::with_capacity(self.machines.len());

        for (idx, machine) in self.machines.iter().enumerate().rev() {
            let snapshot = machine.snapshot();
            in_queue_count += snapshot.queue_len;
            in_service_count += usize::from(snapshot.in_service);
            if idx > 0 {
                in_transit_count += self.conveyor.in_transit_to(idx);
            }
            machines.push(MachineStatistics::from_snapshot(idx, &snapshot, shift_secs));
        }
        machines.reverse();

        LineStatistics {
            line_number,
            completed_count,
            in_queue_count,
            in_service_count,
            in_transit_count,
            machines,
        }
    }

    fn emit_queue_to_service(&self, chip: &Chip, events: &EventSink) {
        tracing::trace!(line = self.index, chip = %chip.id(), "chip entered first machine");
        events.emit(|| Event::QueueToService {
            line_idx: self.index,
            chip_id: chip.id(),
        });
    }

    fn emit_transfer(&self, chip: &Chip, stage: usize, events: &EventSink) {
        tracing::trace!(
            line = self.index,
            chip = %chip.id(),
            from = stage,
            to = stage + 1,
            "chip transferred"
        );
        events.emit(|| Event::MachineTransfer {
            line_idx: self.index,
            chip_id: chip.id(),
            from_machine: stage,
            to_machine: stage + 1,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> Arc<TimingTables> {
        Arc::new(TimingTables::new(
            vec![Variate::fixed(1.0), Variate::fixed(2.0)],
            vec![Variate::fixed(0.5)],
        ))
    }

    #[test]
    fn test_tables_clamp_index() {
        let t = tables();
        assert_eq!(t.service_for(0), Variate::fixed(1.0));
        assert_eq!(t.service_for(7), Variate::fixed(2.0));
        assert_eq!(t.transfer_for(3), Variate::fixed(0.5));
    }

    #[test]
    fn test_empty_tables_yield_zero() {
        let t = TimingTables::new(vec![], vec![]);
        let mut rng = RngManager::new(1);
        let schedule = t.sample_schedule(2, &mut rng);
        assert!(schedule.iter().all(|s| s.service_secs == 0.0 && s.transfer_secs == 0.0));
    }

    #[test]
    fn test_conveyor_releases_in_due_order() {
        let conveyor = Conveyor::new();
        let now = Instant::now();
        let late = Chip::new(1, 0, vec![]);
        let early = Chip::new(2, 0, vec![]);
        let early_id = early.id();
        conveyor.load(late, 1, now + Duration::from_millis(30));
        conveyor.load(early, 2, now);

        let signal = StopSignal::new();
        let (to, chip) = conveyor.take_due(&signal, Duration::from_millis(10)).unwrap();
        assert_eq!(to, 2);
        assert_eq!(chip.id(), early_id);
        assert_eq!(conveyor.in_transit_to(1), 1);
    }

    #[test]
    fn test_conveyor_take_due_stops_on_signal() {
        let conveyor = Conveyor::new();
        conveyor.load(
            Chip::new(1, 0, vec![]),
            1,
            Instant::now() + Duration::from_secs(60),
        );
        let signal = StopSignal::new();
        signal.trigger();
        assert!(conveyor.take_due(&signal, Duration::from_millis(10)).is_none());
        assert_eq!(conveyor.unload_all().len(), 1);
        assert!(conveyor.is_empty());
    }
}
