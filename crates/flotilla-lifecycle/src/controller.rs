//! Action execution.
//!
//! Translates each `ScaleAction` into one collaborator call. Actions
//! targeting different agents/instances dispatch concurrently; actions
//! sharing a target run serially so the state-machine ordering holds.
//! One failed action never aborts the rest of the batch — each is
//! attempted and reported independently, and the reconcile loop only
//! advances clocks for the ones that succeeded.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use flotilla_state::{Fault, ScaleAction};

use crate::api::{CloudProvider, SchedulerMaster};
use crate::error::{LifecycleError, LifecycleResult};

/// Result of executing one batch of actions.
#[derive(Debug, Default)]
pub struct ActionReport {
    /// Actions whose collaborator call succeeded (including idempotent
    /// no-ops); the reconcile loop advances clocks for these.
    pub succeeded: Vec<ScaleAction>,
    /// One `Fault::Action` per failed call.
    pub faults: Vec<Fault>,
}

/// Executes scale actions against the scheduler master and the cloud
/// provider.
pub struct AgentLifecycleController {
    scheduler: Arc<dyn SchedulerMaster>,
    cloud: Arc<dyn CloudProvider>,
}

impl AgentLifecycleController {
    pub fn new(scheduler: Arc<dyn SchedulerMaster>, cloud: Arc<dyn CloudProvider>) -> Self {
        Self { scheduler, cloud }
    }

    /// Execute one action. Idempotent at the action level: `NotFound`
    /// from a Deactivate/Terminate means the work is already done.
    pub async fn execute(&self, action: &ScaleAction) -> LifecycleResult<()> {
        execute_one(self.scheduler.as_ref(), self.cloud.as_ref(), action).await
    }

    /// Execute a batch: concurrent across targets, serial within one.
    pub async fn execute_all(&self, actions: Vec<ScaleAction>) -> ActionReport {
        let mut batches: BTreeMap<String, Vec<ScaleAction>> = BTreeMap::new();
        let mut untargeted: Vec<ScaleAction> = Vec::new();
        for action in actions {
            match action.target() {
                Some(target) => batches.entry(target.to_string()).or_default().push(action),
                None => untargeted.push(action),
            }
        }

        let mut set: JoinSet<Vec<(ScaleAction, LifecycleResult<()>)>> = JoinSet::new();

        for (_, batch) in batches {
            let scheduler = self.scheduler.clone();
            let cloud = self.cloud.clone();
            set.spawn(async move {
                let mut outcomes = Vec::with_capacity(batch.len());
                for action in batch {
                    let result =
                        execute_one(scheduler.as_ref(), cloud.as_ref(), &action).await;
                    outcomes.push((action, result));
                }
                outcomes
            });
        }
        for action in untargeted {
            let scheduler = self.scheduler.clone();
            let cloud = self.cloud.clone();
            set.spawn(async move {
                let result = execute_one(scheduler.as_ref(), cloud.as_ref(), &action).await;
                vec![(action, result)]
            });
        }

        let mut report = ActionReport::default();
        while let Some(joined) = set.join_next().await {
            let outcomes = match joined {
                Ok(outcomes) => outcomes,
                Err(e) => {
                    // A panicked executor task; nothing to attribute the
                    // loss to beyond the log line.
                    warn!(error = %e, "action task failed to join");
                    continue;
                }
            };
            for (action, result) in outcomes {
                match result {
                    Ok(()) => report.succeeded.push(action),
                    Err(e) => {
                        warn!(action = ?action, error = %e, "action failed");
                        report.faults.push(Fault::Action {
                            action,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        // Join order depends on scheduling; keep the report stable.
        report.succeeded.sort_by_key(|a| format!("{a:?}"));
        report
    }
}

async fn execute_one(
    scheduler: &dyn SchedulerMaster,
    cloud: &dyn CloudProvider,
    action: &ScaleAction,
) -> LifecycleResult<()> {
    match action {
        ScaleAction::Launch {
            instance_type,
            count,
        } => cloud.run_instances(instance_type, *count).await,
        ScaleAction::Deactivate { agent_id } => {
            match scheduler.deactivate_agent(agent_id).await {
                Err(LifecycleError::NotFound(_)) => {
                    debug!(agent_id, "agent already gone, deactivate is a no-op");
                    Ok(())
                }
                other => other,
            }
        }
        ScaleAction::Terminate { instance_id } => {
            let ids = [instance_id.clone()];
            match cloud.terminate_instances(&ids).await {
                Err(LifecycleError::NotFound(_)) => {
                    debug!(instance_id, "instance already gone, terminate is a no-op");
                    Ok(())
                }
                other => other,
            }
        }
        ScaleAction::NoOp => Ok(()),
    }
}
