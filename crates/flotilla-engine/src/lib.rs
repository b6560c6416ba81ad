//! flotilla-engine — the decision core of the autoscaler.
//!
//! Two pieces: demand aggregation over pending tasks, and the
//! per-cycle scale-up/scale-down state machine. Both are pure functions
//! of the fleet snapshot (plus the clock handle), which is what makes
//! the engine testable without any collaborator in sight.

pub mod demand;
pub mod engine;

pub use demand::{DemandSummary, aggregate};
pub use engine::{EnginePlan, plan};
