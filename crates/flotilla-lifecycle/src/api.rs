//! External collaborator interfaces.
//!
//! The decision core consumes three independently polled sources and
//! mutates the fleet through two of them. These traits are the whole
//! contract; transport, auth, and retry/backoff live behind them and
//! are no concern of the core.

use async_trait::async_trait;

use flotilla_state::{AgentRecord, CloudInstance, TaskDemand};

use crate::error::LifecycleResult;

/// The cluster scheduler's master API: agent state and drain commands.
#[async_trait]
pub trait SchedulerMaster: Send + Sync {
    /// Current agent states (capacity, used, flags, registration time).
    async fn list_agents(&self) -> LifecycleResult<Vec<AgentRecord>>;

    /// Mark an agent ineligible for new work; existing work keeps
    /// running. Deactivating an already-deactivated agent must succeed.
    async fn deactivate_agent(&self, agent_id: &str) -> LifecycleResult<()>;
}

/// The cloud provider API: instance inventory and launch/terminate.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Inventory of fleet instances, with hostnames attached for agent
    /// correlation.
    async fn list_instances(&self) -> LifecycleResult<Vec<CloudInstance>>;

    /// Launch `count` instances of the named type.
    async fn run_instances(&self, instance_type: &str, count: u32) -> LifecycleResult<()>;

    /// Terminate the listed instances. Terminating an instance that no
    /// longer exists must report `NotFound`, not destroy anything.
    async fn terminate_instances(&self, instance_ids: &[String]) -> LifecycleResult<()>;
}

/// The workflow engine's view of scheduled-but-unplaced tasks.
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn pending_tasks(&self) -> LifecycleResult<Vec<TaskDemand>>;
}
