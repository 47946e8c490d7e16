//! Tests for start/stop/is_running/get_stats lifecycle rules

use chip_simulator_core_rs::{
    EngineConfig, ShiftConfig, SimulationEngine, SimulationError, StartOutcome, Topology, Variate,
};
use std::thread;
use std::time::{Duration, Instant};

fn quiet_config() -> EngineConfig {
    // Only the chip arriving at the shift start shows up within a test
    EngineConfig {
        arrival: Variate::fixed(10_000.0),
        rng_seed: Some(1),
        ..Default::default()
    }
}

fn wait_until_idle(engine: &SimulationEngine, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while engine.is_running() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
    true
}

#[test]
fn test_stop_before_start_is_noop() {
    let engine = SimulationEngine::new(quiet_config()).unwrap();
    assert!(!engine.stop());
    assert!(!engine.is_running());
}

#[test]
fn test_stats_before_start_are_empty() {
    let engine = SimulationEngine::new(quiet_config()).unwrap();
    let stats = engine.get_stats();
    assert_eq!(stats.total_arrived, 0);
    assert_eq!(stats.total_processed, 0);
    assert_eq!(stats.total_unprocessed, 0);
    assert!(stats.lines.is_empty());
    assert!(engine.run_info().is_none());
}

#[test]
fn test_start_builds_requested_shape() {
    let engine = SimulationEngine::new(quiet_config()).unwrap();
    assert_eq!(engine.start(3, 4, 480.0), Ok(StartOutcome::Started));
    assert!(engine.is_running());

    let stats = engine.get_stats();
    assert_eq!(stats.lines.len(), 3);
    for (idx, line) in stats.lines.iter().enumerate() {
        assert_eq!(line.line_number, idx + 1);
        assert_eq!(line.machines.len(), 4);
    }
    assert!(engine.stop());
    assert!(!engine.is_running());
}

#[test]
fn test_second_start_is_ignored() {
    let engine = SimulationEngine::new(quiet_config()).unwrap();
    engine.start(2, 2, 480.0).unwrap();
    let first = engine.run_info().unwrap();

    assert_eq!(engine.start(5, 5, 10.0), Ok(StartOutcome::AlreadyRunning));
    let again = engine.run_info().unwrap();
    assert_eq!(first.run_id, again.run_id);
    assert_eq!(first.config_hash, again.config_hash);
    assert_eq!(engine.get_stats().lines.len(), 2);

    engine.stop();
}

#[test]
fn test_invalid_start_leaves_engine_idle() {
    let engine = SimulationEngine::new(quiet_config()).unwrap();
    for (lines, machines, shift) in [(0, 4, 60.0), (3, 0, 60.0), (3, 4, 0.0), (3, 4, -5.0)] {
        assert!(matches!(
            engine.start(lines, machines, shift),
            Err(SimulationError::InvalidConfig(_))
        ));
        assert!(!engine.is_running());
    }
    assert!(engine
        .start_shift(ShiftConfig::new(3, 4, f64::INFINITY))
        .is_err());
}

#[test]
fn test_invalid_engine_config_is_rejected() {
    let config = EngineConfig {
        time_scale: -1.0,
        ..Default::default()
    };
    assert!(matches!(
        SimulationEngine::new(config),
        Err(SimulationError::InvalidConfig(_))
    ));
}

#[test]
fn test_stop_is_idempotent_and_restart_resets_counters() {
    let config = EngineConfig {
        arrival: Variate::fixed(1.0),
        service_times: vec![Variate::fixed(1.0)],
        transfer_times: vec![Variate::fixed(0.0)],
        time_scale: 0.005,
        rng_seed: Some(3),
        ..Default::default()
    };
    let engine = SimulationEngine::new(config).unwrap();
    engine.start(1, 1, 10_000.0).unwrap();
    thread::sleep(Duration::from_millis(60));
    assert!(engine.stop());
    assert!(!engine.stop());
    let first = engine.run_info().unwrap();
    assert!(engine.get_stats().total_arrived > 0);

    engine.start(1, 1, 10_000.0).unwrap();
    let second = engine.run_info().unwrap();
    assert_ne!(first.run_id, second.run_id);
    // One arrival takes 5ms, the counters were just reset
    assert!(engine.get_stats().total_arrived <= 2);
    engine.stop();
}

#[test]
fn test_stop_interrupts_long_service() {
    let config = EngineConfig {
        arrival: Variate::fixed(0.01),
        service_times: vec![Variate::fixed(3_600.0)],
        time_scale: 1.0,
        rng_seed: Some(11),
        ..Default::default()
    };
    for topology in [Topology::PerLine, Topology::PerMachine] {
        let engine = SimulationEngine::new(EngineConfig {
            topology,
            ..config.clone()
        })
        .unwrap();
        engine.start(2, 3, 7_200.0).unwrap();
        thread::sleep(Duration::from_millis(100));

        let bound = 2 * engine.config().poll_interval();
        let started = Instant::now();
        engine.stop();
        assert!(
            started.elapsed() < bound,
            "{:?} stop took {:?}",
            topology,
            started.elapsed()
        );
        let stats = engine.get_stats();
        assert!(stats.total_arrived > 0);
        assert_eq!(stats.total_processed, 0);
        assert_eq!(stats.accounted_chips(), stats.total_arrived);
    }
}

#[test]
fn test_immediate_stop_after_start() {
    let engine = SimulationEngine::new(EngineConfig {
        time_scale: 0.001,
        rng_seed: Some(5),
        ..Default::default()
    })
    .unwrap();
    for _ in 0..5 {
        engine.start(3, 4, 480.0).unwrap();
        engine.stop();
        assert!(!engine.is_running());
    }
}

#[test]
fn test_shift_timer_stops_run() {
    let engine = SimulationEngine::new(EngineConfig {
        time_scale: 0.01,
        ..quiet_config()
    })
    .unwrap();
    // 5 simulated seconds = 50ms
    engine.start(2, 2, 5.0).unwrap();
    assert!(wait_until_idle(&engine, Duration::from_secs(3)));
    assert!(!engine.stop());
    assert_eq!(engine.get_stats().lines.len(), 2);
}

#[test]
fn test_engine_drop_stops_workers() {
    let engine = SimulationEngine::new(EngineConfig {
        time_scale: 0.001,
        rng_seed: Some(2),
        ..Default::default()
    })
    .unwrap();
    engine.start(2, 2, 10_000.0).unwrap();
    thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    drop(engine);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_independent_engines_do_not_interfere() {
    let a = SimulationEngine::new(quiet_config()).unwrap();
    let b = SimulationEngine::new(quiet_config()).unwrap();
    a.start(1, 1, 480.0).unwrap();
    b.start(4, 2, 480.0).unwrap();
    a.stop();
    assert!(!a.is_running());
    assert!(b.is_running());
    assert_eq!(b.get_stats().lines.len(), 4);
    b.stop();
}
