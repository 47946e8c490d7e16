//! Cancelable suspension
//!
//! Every suspension point of a run (inter-arrival delay, service delay,
//! transfer delay, the shift deadline) sleeps on a [`StopSignal`]. Triggering
//! the signal wakes all sleepers at once instead of letting them run out
//! their delay.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// One-shot stop flag with interruptible sleeps
///
/// # Example
/// ```
/// use chip_simulator_core_rs::StopSignal;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let signal = Arc::new(StopSignal::new());
/// let sleeper = {
///     let signal = Arc::clone(&signal);
///     std::thread::spawn(move || signal.sleep(Duration::from_secs(60)))
/// };
/// signal.trigger();
/// assert!(!sleeper.join().unwrap(), "sleep was interrupted");
/// ```
#[derive(Debug, Default)]
pub struct StopSignal {
    triggered: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake every sleeper. Idempotent.
    pub fn trigger(&self) {
        let mut triggered = self.triggered.lock();
        if !*triggered {
            *triggered = true;
            self.wake.notify_all();
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.triggered.lock()
    }

    /// Sleep for `duration` unless the signal fires first
    ///
    /// Returns `true` when the full duration elapsed and `false` when the
    /// sleep was cut short (or the signal had already fired).
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut triggered = self.triggered.lock();
        while !*triggered {
            if self.wake.wait_until(&mut triggered, deadline).timed_out() {
                return !*triggered;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sleep_runs_to_completion_when_untriggered() {
        let signal = StopSignal::new();
        let start = Instant::now();
        assert!(signal.sleep(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_sleep_after_trigger_returns_immediately() {
        let signal = StopSignal::new();
        signal.trigger();
        let start = Instant::now();
        assert!(!signal.sleep(Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_trigger_wakes_all_sleepers() {
        let signal = Arc::new(StopSignal::new());
        let sleepers: Vec<_> = (0..4)
            .map(|_| {
                let signal = Arc::clone(&signal);
                thread::spawn(move || signal.sleep(Duration::from_secs(30)))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        signal.trigger();
        for sleeper in sleepers {
            assert!(!sleeper.join().unwrap());
        }
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(signal.is_triggered());
    }
}
