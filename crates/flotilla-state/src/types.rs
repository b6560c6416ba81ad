//! Domain types for the Flotilla decision core.
//!
//! These are the compact shapes the decision engine operates on. The raw,
//! deeply nested wire payloads from the scheduler master, the cloud
//! inventory, and the workflow engine are decoded at the collaborator
//! boundary and mapped into these types — the engine never sees wire JSON.

use serde::{Deserialize, Serialize};

/// Unique identifier of an agent as reported by the scheduler master.
pub type AgentId = String;

/// Cloud-side instance identifier (e.g. `i-0abc123`).
pub type InstanceId = String;

// ── Resources ─────────────────────────────────────────────────────

/// A resource quantity over the four scalar dimensions the scheduler
/// master reports. Values are scheduler-native units: fractional CPUs,
/// MiB of memory and disk, whole GPUs.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceVector {
    pub cpus: f64,
    pub mem: f64,
    pub disk: f64,
    pub gpus: f64,
}

impl ResourceVector {
    /// CPU/memory-only vector; disk and gpus zero.
    pub fn cpu_mem(cpus: f64, mem: f64) -> Self {
        Self {
            cpus,
            mem,
            ..Self::default()
        }
    }

    /// Component-wise addition.
    pub fn add(&self, other: &Self) -> Self {
        Self {
            cpus: self.cpus + other.cpus,
            mem: self.mem + other.mem,
            disk: self.disk + other.disk,
            gpus: self.gpus + other.gpus,
        }
    }

    /// Component-wise subtraction, floored at zero.
    pub fn saturating_sub(&self, other: &Self) -> Self {
        Self {
            cpus: (self.cpus - other.cpus).max(0.0),
            mem: (self.mem - other.mem).max(0.0),
            disk: (self.disk - other.disk).max(0.0),
            gpus: (self.gpus - other.gpus).max(0.0),
        }
    }

    /// True if every component is less than or equal to `other`'s.
    pub fn fits_within(&self, other: &Self) -> bool {
        self.cpus <= other.cpus
            && self.mem <= other.mem
            && self.disk <= other.disk
            && self.gpus <= other.gpus
    }

    /// True if every component is zero (or below, after clamping bugs
    /// upstream — treated as zero).
    pub fn is_zero(&self) -> bool {
        self.cpus <= 0.0 && self.mem <= 0.0 && self.disk <= 0.0 && self.gpus <= 0.0
    }

    /// True if any component is negative. Negative values are invariant
    /// violations on input; callers clamp and report them.
    pub fn has_negative(&self) -> bool {
        self.cpus < 0.0 || self.mem < 0.0 || self.disk < 0.0 || self.gpus < 0.0
    }

    /// Clamp every component to be non-negative.
    pub fn clamped(&self) -> Self {
        Self {
            cpus: self.cpus.max(0.0),
            mem: self.mem.max(0.0),
            disk: self.disk.max(0.0),
            gpus: self.gpus.max(0.0),
        }
    }
}

// ── Instance types ────────────────────────────────────────────────

/// An operator-approved instance type from the allow-list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceType {
    pub name: String,
    pub cpus: f64,
    /// Memory in MiB.
    pub mem: f64,
    /// CPU architecture, e.g. "x86_64" or "arm64".
    pub arch: String,
}

impl InstanceType {
    /// The capacity one instance of this type contributes to the fleet.
    pub fn capacity(&self) -> ResourceVector {
        ResourceVector::cpu_mem(self.cpus, self.mem)
    }
}

// ── Task demand ───────────────────────────────────────────────────

/// One scheduled-but-unplaced workflow task, as reported by the workflow
/// engine. Read-only input; one entry per pending task per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDemand {
    /// Opaque task identity, for diagnostics only.
    pub task_id: String,
    /// Target architecture; empty means the configured default applies.
    #[serde(default)]
    pub architecture: String,
    pub cpus: f64,
    /// Memory in MiB.
    pub mem: f64,
    /// Explicit instance-type request carried by the task, if any.
    #[serde(default)]
    pub requested_instance_type: Option<String>,
    /// Seconds the task has been waiting for placement.
    #[serde(default)]
    pub age_secs: u64,
}

// ── Agents ────────────────────────────────────────────────────────

/// A worker node registered with the scheduler master, backed by a cloud
/// instance. Created when first observed in a snapshot, removed once the
/// backing instance disappears from the cloud inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub hostname: String,
    pub capacity: ResourceVector,
    pub used: ResourceVector,
    pub offered: ResourceVector,
    /// Eligible for new work, per the scheduler master.
    pub active: bool,
    /// Deactivation acknowledged by the scheduler master.
    pub deactivated: bool,
    /// Unix timestamp (seconds) of agent registration.
    pub registered_at: u64,
    pub version: String,
}

impl AgentRecord {
    /// Agent age in seconds at time `now`.
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.registered_at)
    }

    /// No running tasks: all used resources at (or clamped to) zero.
    pub fn is_idle(&self) -> bool {
        self.used.is_zero()
    }
}

// ── Cloud instances ───────────────────────────────────────────────

/// Cloud-side lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudInstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
}

/// A cloud instance in the fleet inventory. The cloud provider is the
/// source of truth across cycles; this record is valid for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudInstance {
    pub id: InstanceId,
    pub instance_type: String,
    /// Unix timestamp (seconds) of launch.
    pub launched_at: u64,
    pub state: CloudInstanceState,
    /// Hostname (private DNS name) the cloud collaborator attached for
    /// agent correlation.
    pub hostname: Option<String>,
    /// Backing agent, resolved by hostname match; `None` while the agent
    /// has not yet registered (or never will — a launch in flight).
    pub agent_id: Option<AgentId>,
}

impl CloudInstance {
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.launched_at)
    }
}

// ── Agent lifecycle phase ─────────────────────────────────────────

/// Phase of one managed agent/instance pair in the scale-down state
/// machine. Ordering is the lifecycle order; transitions never go
/// backward within the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    /// Instance exists in the cloud inventory, agent not yet registered.
    Launching,
    /// Registered and eligible for work.
    Active,
    /// Deactivation requested, awaiting scheduler-master acknowledgement.
    Deactivating,
    /// Deactivation acknowledged; existing work draining off.
    Draining,
    /// Instance termination requested.
    Terminating,
    /// Instance no longer present in the cloud inventory.
    Gone,
}

// ── Scale actions ─────────────────────────────────────────────────

/// One fleet mutation decided by the engine. Produced fresh each cycle,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScaleAction {
    /// Launch `count` instances of the named type.
    Launch { instance_type: String, count: u32 },
    /// Ask the scheduler master to stop offering this agent new work.
    Deactivate { agent_id: AgentId },
    /// Terminate the backing cloud instance.
    Terminate { instance_id: InstanceId },
    /// Nothing to do this cycle.
    NoOp,
}

impl ScaleAction {
    /// The agent/instance id this action targets, if any. Actions with
    /// the same target must execute serially.
    pub fn target(&self) -> Option<&str> {
        match self {
            ScaleAction::Deactivate { agent_id } => Some(agent_id),
            ScaleAction::Terminate { instance_id } => Some(instance_id),
            ScaleAction::Launch { .. } | ScaleAction::NoOp => None,
        }
    }
}

// ── Fleet snapshot ────────────────────────────────────────────────

/// The per-cycle aggregate view: one consistent read of agents, cloud
/// inventory, and pending task demand. Built fresh from the three
/// external sources each cycle and discarded at cycle end; decisions
/// derived from it must not outlive the cycle except as clock entries.
#[derive(Debug, Clone, Default)]
pub struct FleetSnapshot {
    pub agents: Vec<AgentRecord>,
    pub instances: Vec<CloudInstance>,
    pub tasks: Vec<TaskDemand>,
    /// Unix timestamp (seconds) when the snapshot was assembled.
    pub taken_at: u64,
}

impl FleetSnapshot {
    /// Correlate instances to agents by hostname and return a snapshot
    /// with `agent_id` filled in where a match exists. Exact hostname/IP
    /// equivalence rules are the collaborators' concern; here the match
    /// is on the strings as delivered.
    pub fn correlated(mut self) -> Self {
        for instance in &mut self.instances {
            if instance.agent_id.is_some() {
                continue;
            }
            let Some(host) = instance.hostname.as_deref() else {
                continue;
            };
            instance.agent_id = self
                .agents
                .iter()
                .find(|a| !a.hostname.is_empty() && a.hostname == host)
                .map(|a| a.id.clone());
        }
        self
    }

    /// The instance backing `agent_id`, if any.
    pub fn instance_for_agent(&self, agent_id: &str) -> Option<&CloudInstance> {
        self.instances
            .iter()
            .find(|i| i.agent_id.as_deref() == Some(agent_id))
    }

    /// Agents sorted by id — the stable traversal order the engine uses.
    pub fn agents_sorted(&self) -> Vec<&AgentRecord> {
        let mut agents: Vec<&AgentRecord> = self.agents.iter().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }
}
