//! The reconciliation loop.
//!
//! One cycle per poll interval: fetch the three snapshot sources in
//! parallel (each bounded by the poll timeout), build the fleet
//! snapshot, run the decision engine, execute the resulting actions,
//! and advance the phase clocks for the actions that succeeded. A
//! partial snapshot — any source failed or timed out — skips
//! decision-making entirely and leaves the clocks untouched rather than
//! deciding on incomplete data. Action execution carries its own bound
//! (the effective wait timeout) so a hung collaborator call cannot
//! stall the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use flotilla_catalog::InstanceCatalog;
use flotilla_lifecycle::{
    AgentLifecycleController, CloudProvider, LifecycleResult, SchedulerMaster, TaskSource,
};
use flotilla_state::{
    Config, CycleReport, Fault, FleetClocks, FleetSnapshot, ScaleAction, SnapshotSource,
};

/// Owns the per-process reconciliation state: the clocks and the cycle
/// counter. Everything else is rebuilt fresh each cycle.
pub struct ReconcileLoop {
    config: Config,
    catalog: InstanceCatalog,
    scheduler: Arc<dyn SchedulerMaster>,
    cloud: Arc<dyn CloudProvider>,
    tasks: Arc<dyn TaskSource>,
    controller: AgentLifecycleController,
    clocks: FleetClocks,
    cycle: u64,
}

impl ReconcileLoop {
    pub fn new(
        config: Config,
        catalog: InstanceCatalog,
        scheduler: Arc<dyn SchedulerMaster>,
        cloud: Arc<dyn CloudProvider>,
        tasks: Arc<dyn TaskSource>,
    ) -> Self {
        let controller = AgentLifecycleController::new(scheduler.clone(), cloud.clone());
        Self {
            config,
            catalog,
            scheduler,
            cloud,
            tasks,
            controller,
            clocks: FleetClocks::new(),
            cycle: 0,
        }
    }

    /// Run until the shutdown signal flips.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.config.poll_interval();
        info!(interval_secs = interval.as_secs(), "reconcile loop started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let report = self.cycle_once().await;
                    log_report(&report);
                }
                _ = shutdown.changed() => {
                    info!("reconcile loop shutting down");
                    break;
                }
            }
        }
    }

    /// One full reconciliation cycle.
    pub async fn cycle_once(&mut self) -> CycleReport {
        self.cycle += 1;
        let mut report = CycleReport::new(self.cycle);
        let bound = self.config.poll_timeout();

        let (agents, instances, tasks) = tokio::join!(
            fetch(
                SnapshotSource::SchedulerMaster,
                bound,
                self.scheduler.list_agents()
            ),
            fetch(
                SnapshotSource::CloudInventory,
                bound,
                self.cloud.list_instances()
            ),
            fetch(SnapshotSource::TaskSource, bound, self.tasks.pending_tasks()),
        );

        let mut sources_ok = true;
        for result in [&agents.1, &instances.1, &tasks.1] {
            if let Some(fault) = result {
                report.fault(fault.clone());
                sources_ok = false;
            }
        }
        if !sources_ok {
            // Incomplete data: no decisions this cycle, prior clocks
            // preserved untouched.
            report.skipped = true;
            return report;
        }

        let snapshot = FleetSnapshot {
            agents: agents.0.unwrap_or_default(),
            instances: instances.0.unwrap_or_default(),
            tasks: tasks.0.unwrap_or_default(),
            taken_at: epoch_secs(),
        }
        .correlated();

        let plan = flotilla_engine::plan(&snapshot, &mut self.clocks, &self.catalog, &self.config);
        report.clamped_demand_entries = plan.clamped_demand_entries;
        report.faults.extend(plan.faults);

        if plan.actions.is_empty() {
            return report;
        }

        report.actions = plan.actions.clone();
        // Action execution gets a hard bound too: a wedged collaborator
        // call must not stall the loop. Nothing is recorded on timeout;
        // the plan retries from the same state next cycle.
        let action_bound = self.config.effective_wait_timeout();
        let outcome = match tokio::time::timeout(
            action_bound,
            self.controller.execute_all(plan.actions),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    waited_secs = action_bound.as_secs(),
                    "action execution timed out"
                );
                for action in &report.actions {
                    report.faults.push(Fault::Action {
                        action: action.clone(),
                        error: format!(
                            "execution timed out after {}s",
                            action_bound.as_secs()
                        ),
                    });
                }
                return report;
            }
        };
        for action in &outcome.succeeded {
            self.record_success(action, &snapshot, snapshot.taken_at);
        }
        report.faults.extend(outcome.faults);
        report
    }

    /// Advance clocks for an action whose collaborator call succeeded.
    /// Failed actions keep their state and retry next cycle.
    fn record_success(&mut self, action: &ScaleAction, snapshot: &FleetSnapshot, now: u64) {
        match action {
            ScaleAction::Deactivate { agent_id } => {
                self.clocks.record_deactivate(agent_id, now);
            }
            ScaleAction::Terminate { instance_id } => {
                // Clocks are keyed by agent id once an agent registered.
                let key = snapshot
                    .instances
                    .iter()
                    .find(|i| &i.id == instance_id)
                    .and_then(|i| i.agent_id.as_deref())
                    .unwrap_or(instance_id.as_str());
                self.clocks.record_terminate(key, now);
            }
            ScaleAction::Launch { .. } | ScaleAction::NoOp => {}
        }
    }

    #[cfg(test)]
    fn clocks(&self) -> &FleetClocks {
        &self.clocks
    }
}

/// Await one snapshot source under the poll timeout. Returns the value
/// and, on failure, the fault to report — shaped as a pair so the three
/// results join uniformly.
async fn fetch<T, F>(source: SnapshotSource, bound: Duration, fut: F) -> (Option<T>, Option<Fault>)
where
    F: Future<Output = LifecycleResult<T>>,
{
    match tokio::time::timeout(bound, fut).await {
        Ok(Ok(value)) => (Some(value), None),
        Ok(Err(e)) => (
            None,
            Some(Fault::Snapshot {
                source,
                error: e.to_string(),
            }),
        ),
        Err(_) => (
            None,
            Some(Fault::Snapshot {
                source,
                error: format!("timed out after {}s", bound.as_secs()),
            }),
        ),
    }
}

fn log_report(report: &CycleReport) {
    if report.skipped {
        warn!(
            cycle = report.cycle,
            faults = report.faults.len(),
            "cycle skipped on partial snapshot"
        );
        return;
    }
    if report.faults.is_empty() && report.actions.is_empty() {
        info!(cycle = report.cycle, "cycle complete, fleet steady");
        return;
    }
    info!(
        cycle = report.cycle,
        actions = report.actions.len(),
        faults = report.faults.len(),
        clamped = report.clamped_demand_entries,
        report = %serde_json::to_string(report).unwrap_or_default(),
        "cycle complete"
    );
}

fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
