//! Event feed for run observers
//!
//! The engine emits one [`Event`] per visible chip movement. Per chip the
//! order is causal: `Arrival`, `QueueToService`, zero or more
//! `MachineTransfer`, `Completion`. Across chips and lines no global order
//! is promised.
//!
//! Consumers are optional. An [`EventListener`] is called synchronously on
//! the worker thread that caused the event, so implementations must be
//! quick and must not call back into the engine's `stop`.
//!
//! # Example
//!
//! ```rust
//! use chip_simulator_core_rs::models::{Event, EventListener, EventLog};
//! use chip_simulator_core_rs::ChipId;
//!
//! let log = EventLog::new();
//! log.on_event(&Event::Completion { line_idx: 0, chip_id: ChipId::new() });
//! assert_eq!(log.len(), 1);
//! assert_eq!(log.drain()[0].event_type(), "Completion");
//! ```

use crate::models::chip::ChipId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A visible chip movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Event {
    /// Chip arrived and was assigned to a line (queued at its first machine)
    Arrival {
        line_idx: usize,
        chip_id: ChipId,
        /// Sampled service time per machine (simulated seconds)
        service_times: Vec<f64>,
        /// Sampled transfer time per gap (simulated seconds)
        transfer_times: Vec<f64>,
    },

    /// Chip left the line's inbound queue and entered the first machine
    QueueToService { line_idx: usize, chip_id: ChipId },

    /// Chip left `from_machine` towards `to_machine`
    MachineTransfer {
        line_idx: usize,
        chip_id: ChipId,
        from_machine: usize,
        to_machine: usize,
    },

    /// Chip finished the last machine of its line and left the system
    Completion { line_idx: usize, chip_id: ChipId },
}

impl Event {
    pub fn line_idx(&self) -> usize {
        match self {
            Event::Arrival { line_idx, .. } => *line_idx,
            Event::QueueToService { line_idx, .. } => *line_idx,
            Event::MachineTransfer { line_idx, .. } => *line_idx,
            Event::Completion { line_idx, .. } => *line_idx,
        }
    }

    pub fn chip_id(&self) -> ChipId {
        match self {
            Event::Arrival { chip_id, .. } => *chip_id,
            Event::QueueToService { chip_id, .. } => *chip_id,
            Event::MachineTransfer { chip_id, .. } => *chip_id,
            Event::Completion { chip_id, .. } => *chip_id,
        }
    }

    /// Get a short description of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Arrival { .. } => "Arrival",
            Event::QueueToService { .. } => "QueueToService",
            Event::MachineTransfer { .. } => "MachineTransfer",
            Event::Completion { .. } => "Completion",
        }
    }
}

/// Push-style receiver of run events
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &Event);
}

impl<F> EventListener for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn on_event(&self, event: &Event) {
        self(event)
    }
}

/// Pollable listener that buffers every event it receives
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Copy of every buffered event, oldest first
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Take every buffered event, leaving the log empty
    pub fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Events concerning one chip, in emission order
    pub fn events_for_chip(&self, chip_id: ChipId) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.chip_id() == chip_id)
            .cloned()
            .collect()
    }
}

impl EventListener for EventLog {
    fn on_event(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}

/// Optional listener handle carried by every worker of a run
#[derive(Clone, Default)]
pub struct EventSink {
    listener: Option<Arc<dyn EventListener>>,
}

impl EventSink {
    pub fn new(listener: Arc<dyn EventListener>) -> Self {
        Self {
            listener: Some(listener),
        }
    }

    /// A sink that drops everything
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.listener.is_some()
    }

    /// Deliver an event; the event is only built when a listener is attached
    pub fn emit<F>(&self, build: F)
    where
        F: FnOnce() -> Event,
    {
        if let Some(listener) = &self.listener {
            listener.on_event(&build());
        }
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("attached", &self.is_attached())
            .finish()
    }
}
