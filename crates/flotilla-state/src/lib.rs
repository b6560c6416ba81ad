//! flotilla-state — domain model for the Flotilla fleet autoscaler.
//!
//! Holds the compact types the decision engine operates on (agents,
//! cloud instances, task demand, fleet snapshots, scale actions), the
//! validated process configuration, the cross-cycle phase clocks, and
//! the per-cycle fault report.
//!
//! Nothing here touches the network or disk except `Config::load`; the
//! autoscaler carries no persistent state beyond the in-memory clocks.

pub mod clocks;
pub mod config;
pub mod error;
pub mod report;
pub mod types;

pub use clocks::{FleetClocks, PhaseClock};
pub use config::Config;
pub use error::{StateError, StateResult};
pub use report::{CycleReport, Fault, SnapshotSource};
pub use types::*;
