//! Cross-cycle phase clocks.
//!
//! The decision engine is stateless across cycles except for a handful of
//! timestamps: when a unit was first seen, when it went idle, when
//! deactivation/termination was requested. Those live here, in one
//! explicit map owned by the reconcile loop and passed into the engine by
//! handle each cycle — never as ambient global state.
//!
//! Keys are agent ids once an agent has registered, and instance ids for
//! launches that have no agent yet.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::AgentPhase;

/// Timestamps and phase for one managed agent/instance pair. All times
/// are Unix seconds taken from snapshot assembly, not wall-clock reads
/// inside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseClock {
    pub phase: AgentPhase,
    /// First snapshot in which this unit appeared.
    pub first_seen: u64,
    /// Start of the current continuous idle window; cleared whenever the
    /// snapshot shows used resources.
    pub idle_since: Option<u64>,
    /// When a Deactivate action was handed to the lifecycle controller.
    pub deactivate_requested: Option<u64>,
    /// When a Terminate action was handed to the lifecycle controller.
    pub terminate_requested: Option<u64>,
}

impl PhaseClock {
    fn new(phase: AgentPhase, now: u64) -> Self {
        Self {
            phase,
            first_seen: now,
            idle_since: None,
            deactivate_requested: None,
            terminate_requested: None,
        }
    }
}

/// The process-wide clock map. Only the reconcile loop holds it; the
/// engine borrows it mutably for the duration of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetClocks {
    entries: BTreeMap<String, PhaseClock>,
}

impl FleetClocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&PhaseClock> {
        self.entries.get(key)
    }

    /// Fetch the clock for `key`, creating it in `initial` phase on first
    /// observation.
    pub fn observe(&mut self, key: &str, initial: AgentPhase, now: u64) -> &mut PhaseClock {
        self.entries
            .entry(key.to_string())
            .or_insert_with(|| PhaseClock::new(initial, now))
    }

    /// Advance a unit's phase. Transitions are monotonic: a request to
    /// move backward is ignored and logged, never applied.
    pub fn advance(&mut self, key: &str, next: AgentPhase) {
        if let Some(clock) = self.entries.get_mut(key) {
            if next > clock.phase {
                clock.phase = next;
            } else if next < clock.phase {
                warn!(
                    key,
                    current = ?clock.phase,
                    requested = ?next,
                    "ignoring backward phase transition"
                );
            }
        }
    }

    /// Record the idle/busy observation for this cycle. Returns the start
    /// of the continuous idle window, if one is open.
    pub fn observe_utilization(&mut self, key: &str, idle: bool, now: u64) -> Option<u64> {
        let clock = self.entries.get_mut(key)?;
        if idle {
            if clock.idle_since.is_none() {
                clock.idle_since = Some(now);
            }
        } else {
            clock.idle_since = None;
        }
        clock.idle_since
    }

    /// Record a successfully executed Deactivate: enter `Deactivating`
    /// and start the drain-wait clock. The timestamp is kept from the
    /// first successful request; idempotent re-issues do not reset it.
    pub fn record_deactivate(&mut self, key: &str, now: u64) {
        self.advance(key, AgentPhase::Deactivating);
        if let Some(clock) = self.entries.get_mut(key)
            && clock.deactivate_requested.is_none()
        {
            clock.deactivate_requested = Some(now);
        }
    }

    /// Record a successfully executed Terminate: enter `Terminating` and
    /// start the terminate-wait clock.
    pub fn record_terminate(&mut self, key: &str, now: u64) {
        self.advance(key, AgentPhase::Terminating);
        if let Some(clock) = self.entries.get_mut(key)
            && clock.terminate_requested.is_none()
        {
            clock.terminate_requested = Some(now);
        }
    }

    /// Re-key a launch clock once the backing agent registers, carrying
    /// the timestamps over. No-op if the instance key is unknown.
    pub fn adopt(&mut self, instance_key: &str, agent_key: &str) {
        if self.entries.contains_key(agent_key) {
            self.entries.remove(instance_key);
            return;
        }
        if let Some(clock) = self.entries.remove(instance_key) {
            self.entries.insert(agent_key.to_string(), clock);
        }
    }

    /// Drop entries whose unit no longer appears in the snapshot — the
    /// cloud inventory stopped listing the instance, so the unit is Gone.
    pub fn prune<'a>(&mut self, live: impl Iterator<Item = &'a str>) -> Vec<String> {
        let keep: std::collections::BTreeSet<&str> = live.collect();
        let dead: Vec<String> = self
            .entries
            .keys()
            .filter(|k| !keep.contains(k.as_str()))
            .cloned()
            .collect();
        for key in &dead {
            self.entries.remove(key);
        }
        dead
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
