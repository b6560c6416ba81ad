//! Demand aggregation.
//!
//! Reduces the pending-task list into per-architecture resource demand
//! plus a tally of explicitly requested instance types. Demand
//! computation must never fail the cycle: malformed entries (negative
//! cpu/mem) are clamped to zero and counted, not rejected.

use std::collections::BTreeMap;

use tracing::debug;

use flotilla_state::{ResourceVector, TaskDemand};

/// Aggregated demand for one cycle. BTreeMaps keep traversal order
/// stable so the engine's output is deterministic for a fixed snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemandSummary {
    /// Summed cpu/mem demand per architecture.
    pub per_arch: BTreeMap<String, ResourceVector>,
    /// arch → requested instance type → number of tasks asking for it.
    pub requested_types: BTreeMap<String, BTreeMap<String, u32>>,
    /// Component-wise maximum single-task demand per architecture. Any
    /// launched type must be able to host at least this much.
    pub max_task: BTreeMap<String, ResourceVector>,
    /// Entries whose negative cpu/mem was clamped to zero.
    pub clamped_entries: u32,
}

impl DemandSummary {
    /// The single most-requested known instance type for `arch`, ties
    /// broken by name order. Used to bias selection toward what tasks
    /// actually asked for.
    pub fn preferred_type(&self, arch: &str) -> Option<&str> {
        let types = self.requested_types.get(arch)?;
        types
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(name, _)| name.as_str())
    }
}

/// Sum pending-task demand per architecture. Tasks without an explicit
/// architecture use `default_arch`. An empty task list yields an empty
/// summary — the steady state with no scale-up pressure.
pub fn aggregate(tasks: &[TaskDemand], default_arch: &str) -> DemandSummary {
    let mut summary = DemandSummary::default();

    for task in tasks {
        let arch = if task.architecture.is_empty() {
            default_arch
        } else {
            task.architecture.as_str()
        };

        let raw = ResourceVector::cpu_mem(task.cpus, task.mem);
        let vector = if raw.has_negative() {
            summary.clamped_entries += 1;
            debug!(
                task_id = %task.task_id,
                cpus = task.cpus,
                mem = task.mem,
                "clamped negative task demand"
            );
            raw.clamped()
        } else {
            raw
        };

        let entry = summary.per_arch.entry(arch.to_string()).or_default();
        *entry = entry.add(&vector);

        let peak = summary.max_task.entry(arch.to_string()).or_default();
        peak.cpus = peak.cpus.max(vector.cpus);
        peak.mem = peak.mem.max(vector.mem);

        if let Some(requested) = &task.requested_instance_type
            && !requested.is_empty()
        {
            *summary
                .requested_types
                .entry(arch.to_string())
                .or_default()
                .entry(requested.clone())
                .or_insert(0) += 1;
        }
    }

    summary
}
