//! Simulation Engine
//!
//! Owns one simulation session at a time and exposes the four operations a
//! host needs: `start`, `stop`, `is_running` and `get_stats`.
//!
//! # Architecture
//!
//! ```text
//! start(lines, machines, shift)
//!   ├── arrival worker      sleep(interval) → create chip → dispatch
//!   ├── per-line workers    (Topology::PerLine)    one chip at a time, machine 0..N-1
//!   │   or
//!   ├── per-machine workers (Topology::PerMachine) take → service → conveyor
//!   ├── per-line conveyors  (Topology::PerMachine) transfer delays
//!   └── deadline timer      sleep(shift) → stop
//! ```
//!
//! Lifecycle is `Idle → Running → Idle`. Every suspension sleeps on the
//! run's `StopSignal`, so `stop` interrupts workers mid-delay instead of
//! waiting out a service or transfer.
//!
//! # Example
//!
//! ```rust
//! use chip_simulator_core_rs::{EngineConfig, SimulationEngine, StartOutcome, Variate};
//!
//! let config = EngineConfig {
//!     arrival: Variate::fixed(1.0),
//!     service_times: vec![Variate::fixed(1.0)],
//!     time_scale: 0.01, // 1 simulated second = 10ms
//!     rng_seed: Some(12345),
//!     ..Default::default()
//! };
//!
//! let engine = SimulationEngine::new(config).unwrap();
//! assert_eq!(engine.start(2, 3, 60.0).unwrap(), StartOutcome::Started);
//! assert!(engine.is_running());
//!
//! engine.stop();
//! assert!(!engine.is_running());
//! let stats = engine.get_stats();
//! assert_eq!(stats.lines.len(), 2);
//! ```

use crate::arrivals::{ArrivalGenerator, DispatchPolicy, PendingBuffer};
use crate::core::signal::StopSignal;
use crate::core::time::SimClock;
use crate::models::event::{EventListener, EventSink};
use crate::models::line::{ProductionLine, TimingTables};
use crate::orchestrator::fingerprint::RunInfo;
use crate::orchestrator::stats::{SimulationStatsResponse, StatsAggregator};
use crate::orchestrator::workers;
use crate::rng::{RngManager, Variate};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on `lines_count * machines_per_line`
pub const MAX_MACHINES: usize = 4096;

/// Upper bound on the queue-wait polling interval
pub const MAX_POLL_INTERVAL_MS: u64 = 200;

// ============================================================================
// Configuration Types
// ============================================================================

/// Worker layout of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// One worker per line, driving each chip through every machine before
    /// taking the next
    PerLine,
    /// One worker per machine plus a conveyor per line; several chips can
    /// be in flight on one line
    #[default]
    PerMachine,
}

impl std::str::FromStr for Topology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "per_line" | "line" | "a" => Ok(Topology::PerLine),
            "per_machine" | "machine" | "b" => Ok(Topology::PerMachine),
            other => Err(format!("unknown topology '{}'", other)),
        }
    }
}

/// Timing and behaviour parameters shared by every run of an engine
///
/// All durations are simulated seconds; `time_scale` converts them to wall
/// time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Inter-arrival delay
    pub arrival: Variate,

    /// Service time per machine position (index-clamped)
    pub service_times: Vec<Variate>,

    /// Transfer time per gap between machines (index-clamped)
    pub transfer_times: Vec<Variate>,

    pub dispatch: DispatchPolicy,

    pub topology: Topology,

    /// Wall seconds per simulated second (1.0 = real time)
    pub time_scale: f64,

    /// Bound on each queue wait, in wall milliseconds
    pub poll_interval_ms: u64,

    /// Seed for all random streams; `None` seeds from the clock
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            arrival: Variate::new(2.5, 0.5),
            service_times: vec![
                Variate::new(12.0, 1.0),
                Variate::new(13.0, 3.0),
                Variate::new(7.0, 1.0),
                Variate::new(8.0, 3.0),
            ],
            transfer_times: vec![
                Variate::new(2.0, 1.0),
                Variate::new(1.0, 1.0),
                Variate::new(3.0, 1.0),
            ],
            dispatch: DispatchPolicy::default(),
            topology: Topology::default(),
            time_scale: 1.0,
            poll_interval_ms: 50,
            rng_seed: None,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, SimulationError> {
        serde_json::from_str(json)
            .map_err(|e| SimulationError::Serialization(format!("Invalid engine config: {}", e)))
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        self.arrival
            .validate()
            .map_err(|e| SimulationError::InvalidConfig(format!("arrival: {}", e)))?;
        if self.arrival.mean <= 0.0 {
            return Err(SimulationError::InvalidConfig(
                "arrival mean must be positive".to_string(),
            ));
        }

        if self.service_times.is_empty() {
            return Err(SimulationError::InvalidConfig(
                "service_times must not be empty".to_string(),
            ));
        }
        if self.transfer_times.is_empty() {
            return Err(SimulationError::InvalidConfig(
                "transfer_times must not be empty".to_string(),
            ));
        }
        for (idx, v) in self.service_times.iter().enumerate() {
            v.validate()
                .map_err(|e| SimulationError::InvalidConfig(format!("service_times[{}]: {}", idx, e)))?;
        }
        for (idx, v) in self.transfer_times.iter().enumerate() {
            v.validate().map_err(|e| {
                SimulationError::InvalidConfig(format!("transfer_times[{}]: {}", idx, e))
            })?;
        }

        if !self.time_scale.is_finite() || self.time_scale <= 0.0 {
            return Err(SimulationError::InvalidConfig(format!(
                "time_scale must be positive, got {}",
                self.time_scale
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(SimulationError::InvalidConfig(
                "poll_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Queue-wait bound, capped at [`MAX_POLL_INTERVAL_MS`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.clamp(1, MAX_POLL_INTERVAL_MS))
    }
}

/// Shape and length of one run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftConfig {
    pub lines_count: usize,
    pub machines_per_line: usize,
    /// Shift length in simulated seconds
    pub shift_duration_secs: f64,
}

impl ShiftConfig {
    pub fn new(lines_count: usize, machines_per_line: usize, shift_duration_secs: f64) -> Self {
        Self {
            lines_count,
            machines_per_line,
            shift_duration_secs,
        }
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.lines_count == 0 {
            return Err(SimulationError::InvalidConfig(
                "lines_count must be positive".to_string(),
            ));
        }
        if self.machines_per_line == 0 {
            return Err(SimulationError::InvalidConfig(
                "machines_per_line must be positive".to_string(),
            ));
        }
        if !self.shift_duration_secs.is_finite() || self.shift_duration_secs <= 0.0 {
            return Err(SimulationError::InvalidConfig(format!(
                "shift_duration_secs must be positive, got {}",
                self.shift_duration_secs
            )));
        }
        let machines = self.lines_count.saturating_mul(self.machines_per_line);
        if machines > MAX_MACHINES {
            return Err(SimulationError::InvalidConfig(format!(
                "{} machines requested, at most {} supported",
                machines, MAX_MACHINES
            )));
        }
        Ok(())
    }
}

/// Result of a `start` call that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new run is now active
    Started,
    /// A run was already active; nothing changed
    AlreadyRunning,
}

/// Simulation errors
#[derive(Debug, Error, PartialEq)]
pub enum SimulationError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Failed to spawn worker: {0}")]
    WorkerSpawn(String),
}

// ============================================================================
// Run State
// ============================================================================

/// Everything the workers of one run share
///
/// Outlives the run itself: after `stop` the engine keeps the last
/// `RunState` so statistics stay readable until the next `start`.
pub(crate) struct RunState {
    pub(crate) info: RunInfo,
    pub(crate) shift: ShiftConfig,
    pub(crate) topology: Topology,
    pub(crate) clock: SimClock,
    pub(crate) signal: StopSignal,
    pub(crate) poll: Duration,
    pub(crate) lines: Vec<ProductionLine>,
    pub(crate) pending: PendingBuffer,
    pub(crate) total_arrived: AtomicU64,
    pub(crate) events: EventSink,
}

impl RunState {
    fn new(config: &EngineConfig, shift: ShiftConfig, info: RunInfo, events: EventSink) -> Self {
        let tables = Arc::new(TimingTables::new(
            config.service_times.clone(),
            config.transfer_times.clone(),
        ));
        let lines = (0..shift.lines_count)
            .map(|idx| ProductionLine::new(idx, shift.machines_per_line, Arc::clone(&tables)))
            .collect();

        Self {
            info,
            shift,
            topology: config.topology,
            clock: SimClock::new(config.time_scale),
            signal: StopSignal::new(),
            poll: config.poll_interval(),
            lines,
            pending: PendingBuffer::new(),
            total_arrived: AtomicU64::new(0),
            events,
        }
    }

    pub(crate) fn stats(&self) -> SimulationStatsResponse {
        StatsAggregator::collect(
            &self.lines,
            self.shift.shift_duration_secs,
            || self.pending.len(),
            || self.total_arrived.load(Ordering::Acquire),
        )
    }
}

/// Handles of an active run
pub(crate) struct ActiveRun {
    pub(crate) state: Arc<RunState>,
    pub(crate) workers: Vec<JoinHandle<()>>,
    pub(crate) timer: Option<JoinHandle<()>>,
}

pub(crate) struct EngineShared {
    config: EngineConfig,
    events: EventSink,
    running: AtomicBool,
    /// Held for the whole of a start or stop; never taken by workers
    pub(crate) lifecycle: Mutex<Option<ActiveRun>>,
    /// Most recent run, kept after stop for statistics
    current: RwLock<Option<Arc<RunState>>>,
}

impl EngineShared {
    /// Stop the active run, if any. Returns whether one was stopped.
    fn stop(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.take() {
            Some(run) => {
                self.finish(run, true);
                true
            }
            None => false,
        }
    }

    /// Tear a run down: signal, wake, join, settle in-flight chips
    ///
    /// Must be called with the lifecycle lock held. `join_timer` is false
    /// when the deadline timer itself is finishing the run.
    pub(crate) fn finish(&self, run: ActiveRun, join_timer: bool) {
        let ActiveRun {
            state,
            workers,
            timer,
        } = run;

        state.signal.trigger();
        for line in &state.lines {
            line.wake_all();
        }

        for handle in workers {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                tracing::error!(run_id = %state.info.run_id, worker = %name, "worker panicked");
            }
        }

        let in_transit: usize = state.lines.iter().map(ProductionLine::flush_conveyor).sum();
        let parked = state.pending.drain_into(&state.lines, &state.events);

        if join_timer {
            if let Some(timer) = timer {
                if timer.join().is_err() {
                    tracing::error!(run_id = %state.info.run_id, "deadline timer panicked");
                }
            }
        }

        self.running.store(false, Ordering::Release);

        let stats = state.stats();
        tracing::info!(
            run_id = %state.info.run_id,
            elapsed_secs = state.clock.elapsed_sim(),
            total_arrived = stats.total_arrived,
            total_processed = stats.total_processed,
            in_transit_settled = in_transit,
            pending_settled = parked,
            "simulation stopped"
        );
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Owner of all simulation state, one run at a time
///
/// The engine is `Send + Sync`; hosts share it behind an `Arc`. Several
/// engines can run side by side without interfering.
pub struct SimulationEngine {
    shared: Arc<EngineShared>,
}

impl SimulationEngine {
    /// Create an idle engine
    ///
    /// # Errors
    /// `InvalidConfig` if any timing parameter is unusable.
    pub fn new(config: EngineConfig) -> Result<Self, SimulationError> {
        Self::build(config, EventSink::none())
    }

    /// Create an idle engine that reports chip movements to `listener`
    pub fn with_listener(
        config: EngineConfig,
        listener: Arc<dyn EventListener>,
    ) -> Result<Self, SimulationError> {
        Self::build(config, EventSink::new(listener))
    }

    fn build(config: EngineConfig, events: EventSink) -> Result<Self, SimulationError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(EngineShared {
                config,
                events,
                running: AtomicBool::new(false),
                lifecycle: Mutex::new(None),
                current: RwLock::new(None),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Start a run in the background and return immediately
    ///
    /// A no-op returning `AlreadyRunning` if a run is active. Otherwise all
    /// counters start from zero, `lines_count` lines of `machines_per_line`
    /// machines are built, the workers are spawned and a timer is armed to
    /// stop the run after `shift_duration_secs` simulated seconds.
    ///
    /// # Errors
    /// `InvalidConfig` for a non-positive count or duration; the engine
    /// stays idle.
    pub fn start(
        &self,
        lines_count: usize,
        machines_per_line: usize,
        shift_duration_secs: f64,
    ) -> Result<StartOutcome, SimulationError> {
        self.start_shift(ShiftConfig::new(
            lines_count,
            machines_per_line,
            shift_duration_secs,
        ))
    }

    /// [`SimulationEngine::start`] with a prepared [`ShiftConfig`]
    pub fn start_shift(&self, shift: ShiftConfig) -> Result<StartOutcome, SimulationError> {
        shift.validate()?;

        let mut lifecycle = self.shared.lifecycle.lock();
        if lifecycle.is_some() {
            tracing::debug!("start ignored, simulation already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let config = &self.shared.config;
        let seed = config
            .rng_seed
            .unwrap_or_else(|| RngManager::from_entropy().next());
        let info = RunInfo::new(config, &shift, seed)?;
        let state = Arc::new(RunState::new(
            config,
            shift,
            info,
            self.shared.events.clone(),
        ));
        let generator = ArrivalGenerator::new(config.arrival, config.dispatch, RngManager::new(seed));

        let mut handles = Vec::new();
        if let Err(e) = workers::spawn_workers(&state, generator, &mut handles) {
            tracing::error!(error = %e, "aborting start");
            state.signal.trigger();
            for line in &state.lines {
                line.wake_all();
            }
            for handle in handles {
                let name = handle.thread().name().unwrap_or("worker").to_string();
                if handle.join().is_err() {
                    tracing::error!(worker = %name, "worker panicked during aborted start");
                }
            }
            return Err(e);
        }

        let timer = workers::spawn_deadline_timer(Arc::downgrade(&self.shared), Arc::clone(&state))
            .map_err(|e| {
                tracing::warn!(error = %e, "deadline timer unavailable, run will need an explicit stop");
            })
            .ok();

        tracing::info!(
            run_id = %state.info.run_id,
            lines = shift.lines_count,
            machines_per_line = shift.machines_per_line,
            shift_secs = shift.shift_duration_secs,
            topology = ?config.topology,
            dispatch = ?config.dispatch,
            seed,
            "simulation started"
        );

        *self.shared.current.write() = Some(Arc::clone(&state));
        self.shared.running.store(true, Ordering::Release);
        *lifecycle = Some(ActiveRun {
            state,
            workers: handles,
            timer,
        });

        Ok(StartOutcome::Started)
    }

    /// Stop the active run and wait for every worker to exit
    ///
    /// Idempotent; a no-op before the first `start` or after the shift
    /// timer already stopped the run. Returns whether a run was stopped.
    pub fn stop(&self) -> bool {
        self.shared.stop()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Statistics of the active or most recent run
    ///
    /// All-zero before the first `start`. Never waits on a running worker
    /// for longer than one machine's counter update.
    pub fn get_stats(&self) -> SimulationStatsResponse {
        let state = self.shared.current.read().clone();
        match state {
            Some(state) => state.stats(),
            None => SimulationStatsResponse::empty(),
        }
    }

    /// Identity of the active or most recent run
    pub fn run_info(&self) -> Option<RunInfo> {
        self.shared
            .current
            .read()
            .as_ref()
            .map(|state| state.info.clone())
    }
}

impl Drop for SimulationEngine {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

impl std::fmt::Debug for SimulationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationEngine")
            .field("config", &self.shared.config)
            .field("running", &self.is_running())
            .finish()
    }
}
