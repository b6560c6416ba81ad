//! Transport-layer DTOs for the external collaborators.
//!
//! The scheduler master and the workflow engine speak deeply nested,
//! heterogeneous JSON. These shapes decode only the fields the core
//! consumes and are mapped into the compact domain types immediately at
//! the boundary — the decision engine never sees them.

use serde::{Deserialize, Serialize};
use tracing::warn;

use flotilla_state::{
    AgentRecord, CloudInstance, CloudInstanceState, ResourceVector, TaskDemand,
};

// ── Scheduler master ──────────────────────────────────────────────

/// Response of the master's agent-state query.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentsResponse {
    #[serde(default)]
    pub slaves: Vec<AgentInfo>,
}

/// One agent entry as the master reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    pub hostname: String,
    #[serde(default)]
    pub resources: ScalarResources,
    #[serde(default)]
    pub used_resources: ScalarResources,
    #[serde(default)]
    pub offered_resources: ScalarResources,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub deactivated: bool,
    /// Fractional Unix timestamp.
    #[serde(default)]
    pub registered_time: f64,
    #[serde(default)]
    pub version: String,
}

/// The scalar resource block the master nests everywhere.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ScalarResources {
    #[serde(default)]
    pub cpus: f64,
    #[serde(default)]
    pub mem: f64,
    #[serde(default)]
    pub disk: f64,
    #[serde(default)]
    pub gpus: f64,
}

impl From<ScalarResources> for ResourceVector {
    fn from(r: ScalarResources) -> Self {
        ResourceVector {
            cpus: r.cpus,
            mem: r.mem,
            disk: r.disk,
            gpus: r.gpus,
        }
    }
}

impl From<AgentInfo> for AgentRecord {
    fn from(info: AgentInfo) -> Self {
        AgentRecord {
            id: info.id,
            hostname: info.hostname,
            capacity: info.resources.into(),
            used: info.used_resources.into(),
            offered: info.offered_resources.into(),
            active: info.active,
            deactivated: info.deactivated,
            registered_at: info.registered_time.max(0.0) as u64,
            version: info.version,
        }
    }
}

/// The master's deactivate-agent command body:
/// `{"type":"DEACTIVATE_AGENT","deactivate_agent":{"agent_id":{"value":<id>}}}`.
#[derive(Debug, Clone, Serialize)]
pub struct DeactivateAgentCall {
    #[serde(rename = "type")]
    pub call_type: &'static str,
    pub deactivate_agent: DeactivateAgentBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeactivateAgentBody {
    pub agent_id: AgentIdValue,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentIdValue {
    pub value: String,
}

impl DeactivateAgentCall {
    pub fn new(agent_id: &str) -> Self {
        Self {
            call_type: "DEACTIVATE_AGENT",
            deactivate_agent: DeactivateAgentBody {
                agent_id: AgentIdValue {
                    value: agent_id.to_string(),
                },
            },
        }
    }
}

// ── Workflow engine ───────────────────────────────────────────────

/// One scheduled-but-unplaced task as the workflow engine reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct PendingTaskRecord {
    pub dag_id: String,
    pub task_id: String,
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub try_number: u32,
    /// Fractional Unix timestamp of task scheduling.
    #[serde(default)]
    pub start_date: f64,
    #[serde(default)]
    pub executor: ExecutorRequirements,
}

/// Resource requirements the task's executor block declares.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutorRequirements {
    #[serde(default)]
    pub cpus: f64,
    /// Memory limit string, e.g. "512m" or "10g".
    #[serde(default)]
    pub mem_limit: String,
    #[serde(default)]
    pub instance_type: Option<String>,
    #[serde(default)]
    pub architecture: String,
}

impl PendingTaskRecord {
    /// Map into the compact demand shape. `now` is the snapshot
    /// timestamp used to derive the task's waiting age.
    pub fn into_demand(self, now: u64) -> TaskDemand {
        let scheduled_at = self.start_date.max(0.0) as u64;
        TaskDemand {
            task_id: format!("{}/{}/{}", self.dag_id, self.task_id, self.run_id),
            architecture: self.executor.architecture,
            cpus: self.executor.cpus,
            mem: parse_mem_limit(&self.executor.mem_limit),
            requested_instance_type: self.executor.instance_type,
            age_secs: now.saturating_sub(scheduled_at),
        }
    }
}

/// Parse a memory-limit string into MiB. Accepts "512m", "10g", bare
/// digits (taken as MiB). Unparseable input yields zero — demand
/// computation must never fail the cycle; the aggregator's clamping
/// diagnostics cover the rest.
pub fn parse_mem_limit(s: &str) -> f64 {
    let s = s.trim().to_ascii_lowercase();
    if s.is_empty() {
        return 0.0;
    }
    let (digits, factor) = if let Some(d) = s.strip_suffix('g') {
        (d.to_string(), 1024.0)
    } else if let Some(d) = s.strip_suffix('m') {
        (d.to_string(), 1.0)
    } else {
        (s, 1.0)
    };
    match digits.parse::<f64>() {
        Ok(v) => v * factor,
        Err(_) => {
            warn!(mem_limit = %digits, "unparseable mem_limit, treating as zero");
            0.0
        }
    }
}

// ── Cloud inventory ───────────────────────────────────────────────

/// One instance as the cloud inventory describes it.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceDescription {
    pub instance_id: String,
    pub instance_type: String,
    /// Unix timestamp (seconds) of launch.
    #[serde(default)]
    pub launch_time: u64,
    /// Lifecycle state name: "pending", "running", "shutting-down",
    /// "terminated".
    pub state: String,
    #[serde(default)]
    pub private_dns_name: Option<String>,
}

impl InstanceDescription {
    /// Map into the domain shape. Returns `None` for states the core
    /// does not model (e.g. "stopped"); callers skip those entries.
    pub fn into_instance(self) -> Option<CloudInstance> {
        let state = match self.state.as_str() {
            "pending" => CloudInstanceState::Pending,
            "running" => CloudInstanceState::Running,
            "shutting-down" => CloudInstanceState::ShuttingDown,
            "terminated" => CloudInstanceState::Terminated,
            other => {
                warn!(
                    instance_id = %self.instance_id,
                    state = %other,
                    "unmodeled instance state, skipping"
                );
                return None;
            }
        };
        Some(CloudInstance {
            id: self.instance_id,
            instance_type: self.instance_type,
            launched_at: self.launch_time,
            state,
            hostname: self.private_dns_name,
            agent_id: None,
        })
    }
}
