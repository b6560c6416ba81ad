//! Per-cycle fault reporting.
//!
//! No fault aborts the process. Every fault is scoped to the smallest
//! unit possible — one snapshot source, one action, one agent — and is
//! accumulated into a `CycleReport` that the reconcile loop logs at cycle
//! end. The next cycle always gets a fresh attempt.

use serde::{Deserialize, Serialize};

use crate::types::{ResourceVector, ScaleAction};

/// Which of the three snapshot sources failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    SchedulerMaster,
    CloudInventory,
    TaskSource,
}

impl std::fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotSource::SchedulerMaster => write!(f, "scheduler-master"),
            SnapshotSource::CloudInventory => write!(f, "cloud-inventory"),
            SnapshotSource::TaskSource => write!(f, "task-source"),
        }
    }
}

/// A scoped fault observed during one reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fault", rename_all = "snake_case")]
pub enum Fault {
    /// A snapshot source failed or timed out; the cycle made no decisions.
    Snapshot {
        source: SnapshotSource,
        error: String,
    },
    /// Demand exists but no allow-listed type (or fallback) satisfies it.
    /// Reported every cycle until configuration or demand changes.
    SelectionStall {
        arch: String,
        demand: ResourceVector,
    },
    /// One Launch/Deactivate/Terminate call failed; the unit's clock was
    /// not advanced and the action retries next cycle.
    Action { action: ScaleAction, error: String },
    /// used > capacity on an agent, or a negative resource value in a
    /// demand entry. Clamped for computation, reported for operators.
    InvariantViolation { subject: String, detail: String },
    /// A Terminating instance outlived the terminate wait without leaving
    /// the inventory. Surfaced for operator action, not retried.
    StuckTermination { instance_id: String, waited_secs: u64 },
}

/// Everything one cycle decided and observed, for structured logging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Monotonic cycle counter.
    pub cycle: u64,
    pub actions: Vec<ScaleAction>,
    pub faults: Vec<Fault>,
    /// Demand entries whose negative values were clamped to zero.
    pub clamped_demand_entries: u32,
    /// Whether decision-making was skipped (partial snapshot).
    pub skipped: bool,
}

impl CycleReport {
    pub fn new(cycle: u64) -> Self {
        Self {
            cycle,
            ..Self::default()
        }
    }

    pub fn fault(&mut self, fault: Fault) {
        self.faults.push(fault);
    }

    /// True when a snapshot fault forced the cycle to skip decisions.
    pub fn has_snapshot_fault(&self) -> bool {
        self.faults
            .iter()
            .any(|f| matches!(f, Fault::Snapshot { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_fault_detected() {
        let mut report = CycleReport::new(7);
        assert!(!report.has_snapshot_fault());
        report.fault(Fault::Snapshot {
            source: SnapshotSource::CloudInventory,
            error: "timed out".into(),
        });
        assert!(report.has_snapshot_fault());
    }

    #[test]
    fn report_serializes_with_tagged_faults() {
        let mut report = CycleReport::new(1);
        report.fault(Fault::StuckTermination {
            instance_id: "i-9".into(),
            waited_secs: 700,
        });
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("stuck_termination"));
        assert!(json.contains("i-9"));
    }
}
