//! takt — a discrete-event simulation engine.
//!
//! A [`Simulation`](sim::Simulation) advances a virtual clock by jumping
//! between scheduled events. Entity scripts are async procedures that suspend
//! on three primitives (`delay`, `enter_queue`, `wait_signal`) and resume
//! when the scheduler dispatches their wait; queues gate progress through
//! finite capacity and accumulate time-weighted statistics along the way.

// === Public Modules (The Canonical Paths) ===
pub mod entity;
pub mod error;
pub mod queue;
pub mod random;
pub mod report;
pub mod sim;
pub mod tally;

// === Private Implementation Details ===
mod fec;
mod macros;

// === Facades (Re-exporting internals) ===
pub use crate::entity::{AnimationPosition, Entity, EntityId, Point, Process, QueuePath, Signal};
pub use crate::error::{SimError, SimResult};
pub use crate::queue::Queue;
pub use crate::random::Sampler;
pub use crate::report::{QueueReport, SimReport, TallySummary};
pub use crate::sim::{
    DelayOptions, GeneratorOptions, Model, ScriptCtx, SimConfig, SimStatus, Simulation, Time,
};
pub use crate::tally::{HistogramBin, HistogramSpec, Tally};
