//! Background workers of a run
//!
//! Every worker is a named OS thread that loops until the run's
//! [`StopSignal`](crate::core::signal::StopSignal) fires. Workers never touch
//! the engine's lifecycle lock, except the deadline timer, which takes it
//! with a bounded wait so it can always yield to an explicit `stop`.

use crate::arrivals::ArrivalGenerator;
use crate::models::line::LineStep;
use crate::models::machine::ServiceOutcome;
use crate::orchestrator::engine::{EngineShared, RunState, SimulationError, Topology};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long the deadline timer waits for the lifecycle lock per attempt
const LIFECYCLE_RETRY: Duration = Duration::from_millis(10);

fn spawn<F>(name: String, body: F) -> Result<JoinHandle<()>, SimulationError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn(body)
        .map_err(|e| SimulationError::WorkerSpawn(format!("{}: {}", name, e)))
}

/// Spawn the arrival worker plus the line, machine and conveyor workers the
/// run's topology needs
///
/// Handles are pushed as they are spawned, so on error the caller can still
/// join whatever did start.
pub(crate) fn spawn_workers(
    state: &Arc<RunState>,
    generator: ArrivalGenerator,
    handles: &mut Vec<JoinHandle<()>>,
) -> Result<(), SimulationError> {
    for line in 0..state.lines.len() {
        match state.topology {
            Topology::PerLine => {
                let st = Arc::clone(state);
                handles.push(spawn(format!("line-{}", line + 1), move || {
                    run_line_worker(&st, line)
                })?);
            }
            Topology::PerMachine => {
                for stage in 0..state.shift.machines_per_line {
                    let st = Arc::clone(state);
                    handles.push(spawn(
                        format!("line-{}-machine-{}", line + 1, stage),
                        move || run_machine_worker(&st, line, stage),
                    )?);
                }
                if state.shift.machines_per_line > 1 {
                    let st = Arc::clone(state);
                    handles.push(spawn(format!("line-{}-conveyor", line + 1), move || {
                        run_conveyor(&st, line)
                    })?);
                }
            }
        }
    }

    // Arrivals last: no chip is created before every consumer exists
    let st = Arc::clone(state);
    handles.push(spawn("arrivals".to_string(), move || {
        run_arrivals(&st, generator)
    })?);
    Ok(())
}

/// Arm the timer that ends the run once the shift is over
pub(crate) fn spawn_deadline_timer(
    shared: Weak<EngineShared>,
    state: Arc<RunState>,
) -> Result<JoinHandle<()>, SimulationError> {
    spawn("shift-timer".to_string(), move || {
        run_deadline_timer(shared, state)
    })
}

/// Chips arrive at the run start and then after every sampled interval
///
/// Arrival instants are scheduled on the simulated timeline (sum of the
/// sampled intervals) rather than measured after each sleep, so oversleeping
/// neither drifts later arrivals nor drops the last one of the shift.
fn run_arrivals(state: &RunState, mut generator: ArrivalGenerator) {
    let shift_secs = state.shift.shift_duration_secs;
    let mut scheduled_secs = 0.0;
    while scheduled_secs < shift_secs {
        let due = state.clock.started_at() + state.clock.to_wall(scheduled_secs);
        if !state.signal.sleep(due.saturating_duration_since(Instant::now())) {
            return;
        }
        let ordinal = state.total_arrived.fetch_add(1, Ordering::AcqRel) + 1;
        generator.arrive(ordinal, &state.lines, &state.pending, &state.events);
        scheduled_secs += generator.next_interval();
    }
    tracing::debug!(run_id = %state.info.run_id, "shift over, arrivals closed");
}

fn run_line_worker(state: &RunState, line_idx: usize) {
    let line = &state.lines[line_idx];
    let Some(first) = line.machine(0) else {
        return;
    };
    loop {
        if state.signal.is_triggered() {
            return;
        }
        state.pending.claim_for(line, &state.events);
        if !first.wait_for_work(&state.signal, state.poll) {
            continue;
        }
        if line.process_next(&state.clock, &state.signal, &state.events) == LineStep::Interrupted {
            return;
        }
    }
}

fn run_machine_worker(state: &RunState, line_idx: usize, stage: usize) {
    let line = &state.lines[line_idx];
    let Some(machine) = line.machine(stage) else {
        return;
    };
    loop {
        if state.signal.is_triggered() {
            return;
        }
        if stage == 0 {
            state.pending.claim_for(line, &state.events);
        }
        if !machine.wait_for_work(&state.signal, state.poll) {
            continue;
        }
        match line.service_stage(stage, &state.clock, &state.signal, &state.events) {
            ServiceOutcome::Completed(chip) => {
                line.forward(chip, stage, &state.clock, &state.events)
            }
            ServiceOutcome::Empty => {}
            ServiceOutcome::Interrupted => return,
        }
    }
}

fn run_conveyor(state: &RunState, line_idx: usize) {
    let line = &state.lines[line_idx];
    while let Some((to, chip)) = line.conveyor().take_due(&state.signal, state.poll) {
        line.deliver(to, chip);
    }
}

fn run_deadline_timer(shared: Weak<EngineShared>, state: Arc<RunState>) {
    let shift = state.clock.to_wall(state.shift.shift_duration_secs);
    let deadline = state.clock.started_at() + shift;
    let remaining = deadline.saturating_duration_since(Instant::now());
    if !state.signal.sleep(remaining) {
        return;
    }

    loop {
        // An explicit stop holds the lifecycle lock while it joins us
        if state.signal.is_triggered() {
            return;
        }
        let Some(shared) = shared.upgrade() else {
            return;
        };
        let Some(mut lifecycle) = shared.lifecycle.try_lock_for(LIFECYCLE_RETRY) else {
            continue;
        };
        let ours = lifecycle
            .as_ref()
            .is_some_and(|run| run.state.info.run_id == state.info.run_id);
        if ours {
            if let Some(run) = lifecycle.take() {
                tracing::info!(run_id = %state.info.run_id, "shift complete");
                shared.finish(run, false);
            }
        }
        return;
    }
}
