//! The scaling decision engine.
//!
//! A pure reduction over one fleet snapshot plus the cross-cycle clocks:
//! `(snapshot, clocks, catalog, config) -> (actions, faults)`. No
//! wall-clock reads, no randomness, no dependence on map iteration
//! order — for a fixed snapshot the action set is identical on every
//! run. All agent traversals are sorted by agent id; demand traversal
//! uses BTreeMap order.
//!
//! Phase advancement for emitted actions is NOT performed here: the
//! reconcile loop advances clocks only for actions that executed
//! successfully, so a failed call retries from the same state next
//! cycle.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use flotilla_catalog::{CatalogError, InstanceCatalog, select_type};
use flotilla_state::{
    AgentPhase, AgentRecord, CloudInstanceState, Config, Fault, FleetClocks, FleetSnapshot,
    InstanceType, ResourceVector, ScaleAction,
};

use crate::demand::{DemandSummary, aggregate};

/// The engine's output for one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnginePlan {
    pub actions: Vec<ScaleAction>,
    pub faults: Vec<Fault>,
    /// Demand entries clamped during aggregation, for the cycle report.
    pub clamped_demand_entries: u32,
}

/// Compute the action set for one snapshot.
///
/// Mutates `clocks` only for observations (first-seen entries, idle
/// windows, snapshot-driven phase advancement like deactivation acks and
/// pruning of vanished units) — never for the actions it emits.
pub fn plan(
    snapshot: &FleetSnapshot,
    clocks: &mut FleetClocks,
    catalog: &InstanceCatalog,
    config: &Config,
) -> EnginePlan {
    let now = snapshot.taken_at;
    let mut plan = EnginePlan::default();

    observe_snapshot(snapshot, clocks, now, &mut plan);

    let summary = aggregate(&snapshot.tasks, &config.default_architecture);
    plan.clamped_demand_entries = summary.clamped_entries;

    if config.launch_enabled {
        scale_up(snapshot, clocks, catalog, config, &summary, now, &mut plan);
    }
    if config.terminate_enabled {
        scale_down(snapshot, clocks, config, now, &mut plan);
    }

    plan
}

/// Fold the snapshot's observations into the clocks: create entries for
/// newly seen units, adopt launch clocks once agents register, apply
/// snapshot-driven transitions, record idle windows, prune vanished
/// units, and report used>capacity violations.
fn observe_snapshot(
    snapshot: &FleetSnapshot,
    clocks: &mut FleetClocks,
    now: u64,
    plan: &mut EnginePlan,
) {
    // Units still present: every agent plus every instance not yet
    // backed by an agent. Anything else has left the inventory and is
    // Gone.
    let mut live: Vec<&str> = snapshot.agents.iter().map(|a| a.id.as_str()).collect();
    for instance in &snapshot.instances {
        match &instance.agent_id {
            Some(agent_id) => live.push(agent_id.as_str()),
            None => live.push(instance.id.as_str()),
        }
    }
    let dead = clocks.prune(live.into_iter());
    for key in dead {
        debug!(key, "unit left inventory, clock dropped");
    }

    for instance in &snapshot.instances {
        match &instance.agent_id {
            Some(agent_id) => clocks.adopt(&instance.id, agent_id),
            None => {
                if matches!(
                    instance.state,
                    CloudInstanceState::Pending | CloudInstanceState::Running
                ) {
                    clocks.observe(&instance.id, AgentPhase::Launching, now);
                }
            }
        }
    }

    for agent in snapshot.agents_sorted() {
        let initial = if agent.deactivated {
            // Deactivation already acknowledged before we first saw the
            // agent; it enters the machine mid-way.
            AgentPhase::Draining
        } else {
            AgentPhase::Active
        };
        clocks.observe(&agent.id, initial, now);

        // An adopted launch clock becomes Active once the scheduler
        // master reports the agent.
        if agent.active {
            clocks.advance(&agent.id, AgentPhase::Active);
        }
        // Deactivation acknowledged: Deactivating → Draining.
        if agent.deactivated {
            clocks.advance(&agent.id, AgentPhase::Draining);
        }

        clocks.observe_utilization(&agent.id, agent.is_idle(), now);

        if !agent.used.clamped().fits_within(&agent.capacity) {
            plan.faults.push(Fault::InvariantViolation {
                subject: agent.id.clone(),
                detail: format!(
                    "used exceeds capacity: used cpus={} mem={}, capacity cpus={} mem={}",
                    agent.used.cpus, agent.used.mem, agent.capacity.cpus, agent.capacity.mem
                ),
            });
        }
    }
}

/// Scale-up check: per architecture, launch enough instances to cover
/// `unmet = demand − active capacity − in-flight launches`.
fn scale_up(
    snapshot: &FleetSnapshot,
    clocks: &FleetClocks,
    catalog: &InstanceCatalog,
    config: &Config,
    summary: &DemandSummary,
    now: u64,
    plan: &mut EnginePlan,
) {
    if summary.per_arch.is_empty() {
        return;
    }

    let default_arch = config.default_architecture.as_str();
    let wait_secs = config.wait_timeout().as_secs();

    // Capacity of agents that are (or are becoming) part of the fleet.
    // Draining and later phases are on their way out and do not count.
    let mut capacity: BTreeMap<&str, ResourceVector> = BTreeMap::new();
    for agent in snapshot.agents_sorted() {
        let phase = clocks.get(&agent.id).map(|c| c.phase);
        if !matches!(phase, Some(AgentPhase::Launching | AgentPhase::Active)) {
            continue;
        }
        let arch = agent_arch(agent, snapshot, catalog, default_arch);
        let entry = capacity.entry(arch).or_default();
        *entry = entry.add(&agent.capacity);
    }

    // Launches already in flight: cloud-side instances with no agent
    // yet, younger than the wait timeout. This is the primary anti-flap
    // guard against double-launching while an instance boots.
    let mut in_flight: BTreeMap<&str, ResourceVector> = BTreeMap::new();
    for instance in &snapshot.instances {
        if instance.agent_id.is_some()
            || !matches!(
                instance.state,
                CloudInstanceState::Pending | CloudInstanceState::Running
            )
            || instance.age_secs(now) >= wait_secs
        {
            continue;
        }
        match catalog.get(&instance.instance_type) {
            Some(itype) => {
                let entry = in_flight.entry(itype.arch.as_str()).or_default();
                *entry = entry.add(&itype.capacity());
            }
            None => {
                // Not in the allow-list (launched by an operator, or the
                // list changed); its capacity cannot be sized.
                debug!(
                    instance_id = %instance.id,
                    instance_type = %instance.instance_type,
                    "in-flight instance type not in catalog, ignoring its capacity"
                );
            }
        }
    }

    for (arch, demand) in &summary.per_arch {
        let have = capacity.get(arch.as_str()).copied().unwrap_or_default();
        let pending = in_flight.get(arch.as_str()).copied().unwrap_or_default();
        let unmet = demand.saturating_sub(&have).saturating_sub(&pending);

        if unmet.cpus <= 0.0 && unmet.mem <= 0.0 {
            continue;
        }

        // Tasks may carry an explicit instance-type request; honor the
        // most-requested known type for this architecture before falling
        // back to smallest-sufficient selection. The hinted type must
        // still host the largest single task — an undersized hint would
        // launch instances the work can never place on.
        let peak = summary.max_task.get(arch).copied().unwrap_or_default();
        let hinted = summary
            .preferred_type(arch)
            .and_then(|name| catalog.get(name))
            .filter(|itype| itype.arch == *arch)
            .filter(|itype| itype.cpus >= peak.cpus && itype.mem >= peak.mem);

        let selected = match hinted {
            Some(itype) => Ok(itype),
            None => select_type(
                catalog,
                &unmet,
                arch,
                config.fallback_instance_type.as_deref(),
            ),
        };

        match selected {
            Ok(itype) => {
                let count = launches_needed(&unmet, itype);
                info!(
                    arch = %arch,
                    instance_type = %itype.name,
                    count,
                    unmet_cpus = unmet.cpus,
                    unmet_mem = unmet.mem,
                    "scale-up"
                );
                plan.actions.push(ScaleAction::Launch {
                    instance_type: itype.name.clone(),
                    count,
                });
            }
            Err(CatalogError::Stall { arch, demand }) => {
                warn!(arch = %arch, cpus = demand.cpus, mem = demand.mem, "selection stall");
                plan.faults.push(Fault::SelectionStall { arch, demand });
            }
            Err(other) => {
                // Catalog construction errors cannot occur here, but the
                // enum is non-exhaustive to callers.
                warn!(error = %other, "unexpected selection error");
            }
        }
    }
}

/// Scale-down check: walk each agent's state machine one step at most.
fn scale_down(
    snapshot: &FleetSnapshot,
    clocks: &FleetClocks,
    config: &Config,
    now: u64,
    plan: &mut EnginePlan,
) {
    let max_age = config.max_instance_age().as_secs();
    let wait = config.effective_wait_timeout().as_secs();
    let idle_window = config.poll_interval().as_secs();
    let terminate_wait = config.terminate_wait().as_secs();

    for agent in snapshot.agents_sorted() {
        let Some(clock) = clocks.get(&agent.id) else {
            continue;
        };

        // Safety invariant: an agent with any used resources gets no
        // Deactivate/Terminate emission this cycle. Guarded per arm so
        // the Terminating arm still reports stuck instances while work
        // runs.
        match clock.phase {
            AgentPhase::Active => {
                let aged_out = agent.age_secs(now) >= max_age;
                let manual_drain = !agent.active;
                if agent.is_idle() && (aged_out || manual_drain) {
                    info!(
                        agent_id = %agent.id,
                        age_secs = agent.age_secs(now),
                        aged_out,
                        manual_drain,
                        "deactivating idle agent"
                    );
                    plan.actions.push(ScaleAction::Deactivate {
                        agent_id: agent.id.clone(),
                    });
                }
            }
            AgentPhase::Deactivating => {
                // Requested but not yet acknowledged by the scheduler
                // master; re-issue (idempotent) until the ack shows up
                // in a snapshot.
                if agent.is_idle() {
                    plan.actions.push(ScaleAction::Deactivate {
                        agent_id: agent.id.clone(),
                    });
                }
            }
            AgentPhase::Draining => {
                let idle_long_enough = agent.is_idle()
                    && clock
                        .idle_since
                        .is_some_and(|since| now.saturating_sub(since) >= idle_window);
                let drained_long_enough = clock
                    .deactivate_requested
                    .map(|since| now.saturating_sub(since) >= wait)
                    // Deactivation happened before we first saw the
                    // agent; count from first observation.
                    .unwrap_or_else(|| now.saturating_sub(clock.first_seen) >= wait);

                if idle_long_enough && drained_long_enough {
                    match snapshot.instance_for_agent(&agent.id) {
                        Some(instance) => {
                            info!(
                                agent_id = %agent.id,
                                instance_id = %instance.id,
                                "drain complete, terminating instance"
                            );
                            plan.actions.push(ScaleAction::Terminate {
                                instance_id: instance.id.clone(),
                            });
                        }
                        None => {
                            debug!(
                                agent_id = %agent.id,
                                "drained agent has no backing instance in inventory"
                            );
                        }
                    }
                }
            }
            AgentPhase::Terminating => {
                let still_present = snapshot.instance_for_agent(&agent.id).is_some_and(|i| {
                    matches!(
                        i.state,
                        CloudInstanceState::Pending | CloudInstanceState::Running
                    )
                });
                let waited = clock
                    .terminate_requested
                    .map(|since| now.saturating_sub(since))
                    .unwrap_or(0);
                if still_present && waited > terminate_wait {
                    // Surfaced for the operator; no further destructive
                    // calls for this instance.
                    if let Some(instance) = snapshot.instance_for_agent(&agent.id) {
                        warn!(
                            agent_id = %agent.id,
                            instance_id = %instance.id,
                            waited_secs = waited,
                            "termination stuck"
                        );
                        plan.faults.push(Fault::StuckTermination {
                            instance_id: instance.id.clone(),
                            waited_secs: waited,
                        });
                    }
                }
            }
            AgentPhase::Launching | AgentPhase::Gone => {}
        }
    }
}

/// Resolve an agent's architecture via its backing instance's type;
/// agents with no resolvable type count toward the default architecture.
fn agent_arch<'a>(
    agent: &AgentRecord,
    snapshot: &'a FleetSnapshot,
    catalog: &'a InstanceCatalog,
    default_arch: &'a str,
) -> &'a str {
    snapshot
        .instance_for_agent(&agent.id)
        .and_then(|i| catalog.get(&i.instance_type))
        .map(|t| t.arch.as_str())
        .unwrap_or(default_arch)
}

/// Instances of `itype` needed to cover `unmet`, rounding up on both
/// dimensions.
fn launches_needed(unmet: &ResourceVector, itype: &InstanceType) -> u32 {
    let by_cpu = if itype.cpus > 0.0 {
        (unmet.cpus / itype.cpus).ceil()
    } else {
        0.0
    };
    let by_mem = if itype.mem > 0.0 {
        (unmet.mem / itype.mem).ceil()
    } else {
        0.0
    };
    by_cpu.max(by_mem).max(1.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_state::{CloudInstance, TaskDemand};

    fn test_config() -> Config {
        Config {
            poll_interval: "30s".into(),
            poll_timeout: "10s".into(),
            wait_timeout: "5m".into(),
            wait_timeout_override: None,
            terminate_wait: "10m".into(),
            max_instance_age: "6h".into(),
            default_architecture: "x86_64".into(),
            fallback_instance_type: None,
            terminate_enabled: true,
            launch_enabled: true,
            instances: Vec::new(),
        }
    }

    fn test_catalog() -> InstanceCatalog {
        InstanceCatalog::new(vec![
            InstanceType {
                name: "t2.small".into(),
                cpus: 1.0,
                mem: 2048.0,
                arch: "x86_64".into(),
            },
            InstanceType {
                name: "t2.large".into(),
                cpus: 4.0,
                mem: 8192.0,
                arch: "x86_64".into(),
            },
        ])
        .unwrap()
    }

    fn idle_agent(id: &str, registered_at: u64) -> AgentRecord {
        AgentRecord {
            id: id.to_string(),
            hostname: format!("{id}.internal"),
            capacity: ResourceVector::cpu_mem(4.0, 8192.0),
            used: ResourceVector::default(),
            offered: ResourceVector::default(),
            active: true,
            deactivated: false,
            registered_at,
            version: "1.11.0".into(),
        }
    }

    fn instance_for(agent_id: &str, instance_id: &str, launched_at: u64) -> CloudInstance {
        CloudInstance {
            id: instance_id.to_string(),
            instance_type: "t2.large".into(),
            launched_at,
            state: CloudInstanceState::Running,
            hostname: Some(format!("{agent_id}.internal")),
            agent_id: Some(agent_id.to_string()),
        }
    }

    fn task(id: &str, cpus: f64, mem: f64) -> TaskDemand {
        TaskDemand {
            task_id: id.to_string(),
            architecture: String::new(),
            cpus,
            mem,
            requested_instance_type: None,
            age_secs: 0,
        }
    }

    fn launches(plan: &EnginePlan) -> Vec<(&str, u32)> {
        plan.actions
            .iter()
            .filter_map(|a| match a {
                ScaleAction::Launch {
                    instance_type,
                    count,
                } => Some((instance_type.as_str(), *count)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn unmet_demand_launches_smallest_sufficient_type() {
        // Demand {cpu:3, mem:5 GiB} with no capacity → Launch(t2.large, 1).
        let snapshot = FleetSnapshot {
            tasks: vec![task("t1", 3.0, 5120.0)],
            taken_at: 1000,
            ..Default::default()
        };
        let mut clocks = FleetClocks::new();
        let plan = plan(&snapshot, &mut clocks, &test_catalog(), &test_config());

        assert_eq!(launches(&plan), vec![("t2.large", 1)]);
        assert!(plan.faults.is_empty());
    }

    #[test]
    fn no_launch_when_demand_met() {
        let agent = idle_agent("agent-1", 0);
        let snapshot = FleetSnapshot {
            agents: vec![agent.clone()],
            instances: vec![instance_for("agent-1", "i-1", 0)],
            tasks: vec![task("t1", 2.0, 4096.0)],
            taken_at: 1000,
        };
        let mut clocks = FleetClocks::new();
        let plan = plan(&snapshot, &mut clocks, &test_catalog(), &test_config());
        assert!(launches(&plan).is_empty());
    }

    #[test]
    fn in_flight_launch_suppresses_duplicate() {
        // A pending instance younger than wait_timeout covers the demand.
        let snapshot = FleetSnapshot {
            instances: vec![CloudInstance {
                id: "i-boot".into(),
                instance_type: "t2.large".into(),
                launched_at: 950,
                state: CloudInstanceState::Pending,
                hostname: None,
                agent_id: None,
            }],
            tasks: vec![task("t1", 3.0, 5120.0)],
            taken_at: 1000,
            ..Default::default()
        };
        let mut clocks = FleetClocks::new();
        let plan = plan(&snapshot, &mut clocks, &test_catalog(), &test_config());
        assert!(launches(&plan).is_empty());
    }

    #[test]
    fn stale_in_flight_launch_no_longer_counts() {
        // The pending instance is older than wait_timeout (5m): its
        // capacity no longer suppresses a fresh launch.
        let snapshot = FleetSnapshot {
            instances: vec![CloudInstance {
                id: "i-stuck".into(),
                instance_type: "t2.large".into(),
                launched_at: 0,
                state: CloudInstanceState::Pending,
                hostname: None,
                agent_id: None,
            }],
            tasks: vec![task("t1", 3.0, 5120.0)],
            taken_at: 1000,
            ..Default::default()
        };
        let mut clocks = FleetClocks::new();
        let plan = plan(&snapshot, &mut clocks, &test_catalog(), &test_config());
        assert_eq!(launches(&plan), vec![("t2.large", 1)]);
    }

    #[test]
    fn stall_reported_every_cycle_without_launch() {
        let snapshot = FleetSnapshot {
            tasks: vec![task("t1", 10.0, 1024.0)],
            taken_at: 1000,
            ..Default::default()
        };
        let catalog = test_catalog();
        let config = test_config();
        let mut clocks = FleetClocks::new();

        for _ in 0..3 {
            let plan = plan(&snapshot, &mut clocks, &catalog, &config);
            assert!(launches(&plan).is_empty());
            assert!(
                plan.faults
                    .iter()
                    .any(|f| matches!(f, Fault::SelectionStall { .. }))
            );
        }
    }

    #[test]
    fn fallback_resolves_stall() {
        let snapshot = FleetSnapshot {
            tasks: vec![task("t1", 10.0, 1024.0)],
            taken_at: 1000,
            ..Default::default()
        };
        let mut config = test_config();
        config.fallback_instance_type = Some("t2.large".into());
        let mut clocks = FleetClocks::new();
        let plan = plan(&snapshot, &mut clocks, &test_catalog(), &config);
        // cpu 10 / 4 per instance → 3 launches of the fallback.
        assert_eq!(launches(&plan), vec![("t2.large", 3)]);
    }

    #[test]
    fn requested_type_hint_wins_over_selector() {
        let mut hinted = task("t1", 0.5, 1024.0);
        hinted.requested_instance_type = Some("t2.large".into());
        let snapshot = FleetSnapshot {
            tasks: vec![hinted],
            taken_at: 1000,
            ..Default::default()
        };
        let mut clocks = FleetClocks::new();
        let plan = plan(&snapshot, &mut clocks, &test_catalog(), &test_config());
        // Smallest sufficient would be t2.small; the hint overrides.
        assert_eq!(launches(&plan), vec![("t2.large", 1)]);
    }

    #[test]
    fn undersized_hint_falls_through_to_selector() {
        // The task asks for t2.small but cannot fit on one; the selector
        // picks a type that can actually host it.
        let mut hinted = task("t1", 3.0, 5120.0);
        hinted.requested_instance_type = Some("t2.small".into());
        let snapshot = FleetSnapshot {
            tasks: vec![hinted],
            taken_at: 1000,
            ..Default::default()
        };
        let mut clocks = FleetClocks::new();
        let plan = plan(&snapshot, &mut clocks, &test_catalog(), &test_config());
        assert_eq!(launches(&plan), vec![("t2.large", 1)]);
    }

    #[test]
    fn launch_disabled_suppresses_scale_up() {
        let snapshot = FleetSnapshot {
            tasks: vec![task("t1", 3.0, 5120.0)],
            taken_at: 1000,
            ..Default::default()
        };
        let mut config = test_config();
        config.launch_enabled = false;
        let mut clocks = FleetClocks::new();
        let plan = plan(&snapshot, &mut clocks, &test_catalog(), &config);
        assert!(plan.actions.is_empty());
    }

    #[test]
    fn aged_out_idle_agent_deactivates_then_terminates() {
        let config = test_config();
        let catalog = test_catalog();
        let mut clocks = FleetClocks::new();

        // Cycle 1: agent aged out (6h max age), idle → Deactivate.
        let t0 = 100_000;
        let agent = idle_agent("agent-1", t0 - 7 * 3600);
        let snapshot = FleetSnapshot {
            agents: vec![agent.clone()],
            instances: vec![instance_for("agent-1", "i-1", t0 - 7 * 3600)],
            taken_at: t0,
            ..Default::default()
        };
        let p1 = plan(&snapshot, &mut clocks, &catalog, &config);
        assert_eq!(
            p1.actions,
            vec![ScaleAction::Deactivate {
                agent_id: "agent-1".into()
            }]
        );

        // The reconcile loop records the successful deactivation.
        clocks.record_deactivate("agent-1", t0);

        // Cycle 2: ack visible, wait timeout (5m) elapsed, still idle →
        // Terminate.
        let t1 = t0 + 400;
        let mut drained = idle_agent("agent-1", t0 - 7 * 3600);
        drained.active = false;
        drained.deactivated = true;
        let snapshot = FleetSnapshot {
            agents: vec![drained],
            instances: vec![instance_for("agent-1", "i-1", t0 - 7 * 3600)],
            taken_at: t1,
            ..Default::default()
        };
        let p2 = plan(&snapshot, &mut clocks, &catalog, &config);
        assert_eq!(
            p2.actions,
            vec![ScaleAction::Terminate {
                instance_id: "i-1".into()
            }]
        );
    }

    #[test]
    fn busy_agent_is_never_deactivated() {
        let config = test_config();
        let mut agent = idle_agent("agent-1", 0);
        agent.used = ResourceVector::cpu_mem(1.0, 512.0);
        let snapshot = FleetSnapshot {
            agents: vec![agent],
            instances: vec![instance_for("agent-1", "i-1", 0)],
            taken_at: 100_000,
            ..Default::default()
        };
        let mut clocks = FleetClocks::new();
        let plan = plan(&snapshot, &mut clocks, &test_catalog(), &config);
        assert!(plan.actions.is_empty());
    }

    #[test]
    fn task_landing_during_drain_resets_idle_window() {
        let config = test_config();
        let catalog = test_catalog();
        let mut clocks = FleetClocks::new();
        let t0 = 100_000;

        let mut drained = idle_agent("agent-1", 0);
        drained.active = false;
        drained.deactivated = true;
        let snapshot = FleetSnapshot {
            agents: vec![drained.clone()],
            instances: vec![instance_for("agent-1", "i-1", 0)],
            taken_at: t0,
            ..Default::default()
        };
        let _ = plan(&snapshot, &mut clocks, &catalog, &config);
        clocks.record_deactivate("agent-1", t0);

        // A task races onto the draining agent.
        let mut busy = drained.clone();
        busy.used = ResourceVector::cpu_mem(1.0, 512.0);
        let snapshot = FleetSnapshot {
            agents: vec![busy],
            instances: vec![instance_for("agent-1", "i-1", 0)],
            taken_at: t0 + 400,
            ..Default::default()
        };
        let p = plan(&snapshot, &mut clocks, &catalog, &config);
        assert!(p.actions.is_empty());

        // Idle again, but the window restarted: one poll interval must
        // elapse before termination.
        let snapshot = FleetSnapshot {
            agents: vec![drained.clone()],
            instances: vec![instance_for("agent-1", "i-1", 0)],
            taken_at: t0 + 410,
            ..Default::default()
        };
        let p = plan(&snapshot, &mut clocks, &catalog, &config);
        assert!(p.actions.is_empty());

        let snapshot = FleetSnapshot {
            agents: vec![drained],
            instances: vec![instance_for("agent-1", "i-1", 0)],
            taken_at: t0 + 450,
            ..Default::default()
        };
        let p = plan(&snapshot, &mut clocks, &catalog, &config);
        assert_eq!(
            p.actions,
            vec![ScaleAction::Terminate {
                instance_id: "i-1".into()
            }]
        );
    }

    #[test]
    fn terminate_disabled_suppresses_scale_down() {
        let mut config = test_config();
        config.terminate_enabled = false;
        let snapshot = FleetSnapshot {
            agents: vec![idle_agent("agent-1", 0)],
            instances: vec![instance_for("agent-1", "i-1", 0)],
            taken_at: 100_000,
            ..Default::default()
        };
        let mut clocks = FleetClocks::new();
        let plan = plan(&snapshot, &mut clocks, &test_catalog(), &config);
        assert!(plan.actions.is_empty());
    }

    #[test]
    fn stuck_termination_reported_not_retried() {
        let config = test_config();
        let catalog = test_catalog();
        let mut clocks = FleetClocks::new();
        let t0 = 100_000;

        let mut gone_agent = idle_agent("agent-1", 0);
        gone_agent.active = false;
        gone_agent.deactivated = true;
        let snapshot = FleetSnapshot {
            agents: vec![gone_agent.clone()],
            instances: vec![instance_for("agent-1", "i-1", 0)],
            taken_at: t0,
            ..Default::default()
        };
        let _ = plan(&snapshot, &mut clocks, &catalog, &config);
        clocks.record_deactivate("agent-1", t0 - 600);
        clocks.record_terminate("agent-1", t0);

        // 11 minutes later the instance is still Running.
        let snapshot = FleetSnapshot {
            agents: vec![gone_agent],
            instances: vec![instance_for("agent-1", "i-1", 0)],
            taken_at: t0 + 660,
            ..Default::default()
        };
        let p = plan(&snapshot, &mut clocks, &catalog, &config);
        assert!(p.actions.is_empty(), "no repeat destructive call");
        assert!(
            p.faults
                .iter()
                .any(|f| matches!(f, Fault::StuckTermination { instance_id, .. } if instance_id == "i-1"))
        );
    }

    #[test]
    fn busy_terminating_agent_still_reports_stuck() {
        let config = test_config();
        let catalog = test_catalog();
        let mut clocks = FleetClocks::new();
        let t0 = 100_000;

        let mut agent = idle_agent("agent-1", 0);
        agent.active = false;
        agent.deactivated = true;
        let snapshot = FleetSnapshot {
            agents: vec![agent.clone()],
            instances: vec![instance_for("agent-1", "i-1", 0)],
            taken_at: t0,
            ..Default::default()
        };
        let _ = plan(&snapshot, &mut clocks, &catalog, &config);
        clocks.record_deactivate("agent-1", t0 - 600);
        clocks.record_terminate("agent-1", t0);

        // 11 minutes later the instance is still Running and a straggler
        // task shows used resources; the stuck report must land anyway.
        let mut busy = agent;
        busy.used = ResourceVector::cpu_mem(1.0, 512.0);
        let snapshot = FleetSnapshot {
            agents: vec![busy],
            instances: vec![instance_for("agent-1", "i-1", 0)],
            taken_at: t0 + 660,
            ..Default::default()
        };
        let p = plan(&snapshot, &mut clocks, &catalog, &config);
        assert!(p.actions.is_empty());
        assert!(
            p.faults
                .iter()
                .any(|f| matches!(f, Fault::StuckTermination { instance_id, .. } if instance_id == "i-1"))
        );
    }

    #[test]
    fn used_over_capacity_reported_as_invariant_violation() {
        let config = test_config();
        let mut agent = idle_agent("agent-1", 0);
        agent.used = ResourceVector::cpu_mem(99.0, 512.0);
        let snapshot = FleetSnapshot {
            agents: vec![agent],
            taken_at: 1000,
            ..Default::default()
        };
        let mut clocks = FleetClocks::new();
        let p = plan(&snapshot, &mut clocks, &test_catalog(), &config);
        assert!(
            p.faults
                .iter()
                .any(|f| matches!(f, Fault::InvariantViolation { subject, .. } if subject == "agent-1"))
        );
    }

    #[test]
    fn plan_is_deterministic_for_fixed_snapshot() {
        let snapshot = FleetSnapshot {
            agents: vec![idle_agent("agent-b", 0), idle_agent("agent-a", 0)],
            instances: vec![
                instance_for("agent-b", "i-b", 0),
                instance_for("agent-a", "i-a", 0),
            ],
            tasks: vec![task("t1", 12.0, 4096.0), task("t2", 1.0, 9000.0)],
            taken_at: 100_000,
        };
        let catalog = test_catalog();
        let config = test_config();

        let reference = plan(
            &snapshot,
            &mut FleetClocks::new(),
            &catalog,
            &config,
        );
        for _ in 0..5 {
            let again = plan(&snapshot, &mut FleetClocks::new(), &catalog, &config);
            assert_eq!(again, reference);
        }
    }
}
