//! Domain models for the chip line simulator

pub mod chip;
pub mod event;
pub mod line;
pub mod machine;

// Re-exports
pub use chip::{Chip, ChipId, StageTiming};
pub use event::{Event, EventListener, EventLog, EventSink};
pub use line::{Conveyor, LineStep, ProductionLine, TimingTables};
pub use machine::{Machine, MachineCounters, MachineSnapshot, ServiceOutcome};
