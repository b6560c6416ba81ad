//! HTTP implementations of the collaborator interfaces.
//!
//! The scheduler master speaks its native JSON API directly. Cloud
//! launches and terminations go through the cloud gateway, the internal
//! facade in front of the provider SDK — flotillad never holds cloud
//! credentials itself. All three clients are thin: decode the wire
//! shape and map it at the boundary. Every client carries a per-request
//! timeout, so mutation calls are bounded even though only the snapshot
//! fetches run under the reconcile loop's poll timeout.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;

use flotilla_lifecycle::wire::{
    AgentsResponse, DeactivateAgentCall, InstanceDescription, PendingTaskRecord,
};
use flotilla_lifecycle::{
    CloudProvider, LifecycleError, LifecycleResult, SchedulerMaster, TaskSource,
};
use flotilla_state::{AgentRecord, CloudInstance, TaskDemand};

fn transport(e: reqwest::Error) -> LifecycleError {
    LifecycleError::Transport(e.to_string())
}

fn decode(e: reqwest::Error) -> LifecycleError {
    LifecycleError::Decode(e.to_string())
}

fn client(timeout: Duration) -> LifecycleResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(transport)
}

fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ── Scheduler master ──────────────────────────────────────────────

pub struct HttpSchedulerMaster {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSchedulerMaster {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> LifecycleResult<Self> {
        Ok(Self {
            client: client(timeout)?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl SchedulerMaster for HttpSchedulerMaster {
    async fn list_agents(&self) -> LifecycleResult<Vec<AgentRecord>> {
        let url = format!("{}/master/slaves", self.base_url);
        let response = self.client.get(&url).send().await.map_err(transport)?;
        if !response.status().is_success() {
            return Err(LifecycleError::Transport(format!(
                "{url}: {}",
                response.status()
            )));
        }
        let body: AgentsResponse = response.json().await.map_err(decode)?;
        Ok(body.slaves.into_iter().map(AgentRecord::from).collect())
    }

    async fn deactivate_agent(&self, agent_id: &str) -> LifecycleResult<()> {
        let url = format!("{}/master/api/v1", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&DeactivateAgentCall::new(agent_id))
            .send()
            .await
            .map_err(transport)?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(LifecycleError::NotFound(agent_id.to_string())),
            status => Err(LifecycleError::Rejected(format!(
                "deactivate {agent_id}: {status}"
            ))),
        }
    }
}

// ── Cloud gateway ─────────────────────────────────────────────────

#[derive(Serialize)]
struct RunInstancesRequest<'a> {
    instance_type: &'a str,
    count: u32,
}

#[derive(Serialize)]
struct TerminateInstancesRequest<'a> {
    instance_ids: &'a [String],
}

pub struct HttpCloudProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCloudProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> LifecycleResult<Self> {
        Ok(Self {
            client: client(timeout)?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl CloudProvider for HttpCloudProvider {
    async fn list_instances(&self) -> LifecycleResult<Vec<CloudInstance>> {
        let url = format!("{}/instances", self.base_url);
        let response = self.client.get(&url).send().await.map_err(transport)?;
        if !response.status().is_success() {
            return Err(LifecycleError::Transport(format!(
                "{url}: {}",
                response.status()
            )));
        }
        let body: Vec<InstanceDescription> = response.json().await.map_err(decode)?;
        // Unmodeled states (e.g. "stopped") drop out here.
        Ok(body
            .into_iter()
            .filter_map(InstanceDescription::into_instance)
            .collect())
    }

    async fn run_instances(&self, instance_type: &str, count: u32) -> LifecycleResult<()> {
        let url = format!("{}/instances/run", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&RunInstancesRequest {
                instance_type,
                count,
            })
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(LifecycleError::Rejected(format!(
                "run {count}x {instance_type}: {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn terminate_instances(&self, instance_ids: &[String]) -> LifecycleResult<()> {
        let url = format!("{}/instances/terminate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&TerminateInstancesRequest { instance_ids })
            .send()
            .await
            .map_err(transport)?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                Err(LifecycleError::NotFound(instance_ids.join(",")))
            }
            status => Err(LifecycleError::Rejected(format!(
                "terminate {}: {status}",
                instance_ids.join(",")
            ))),
        }
    }
}

// ── Workflow engine ───────────────────────────────────────────────

pub struct HttpTaskSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTaskSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> LifecycleResult<Self> {
        Ok(Self {
            client: client(timeout)?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl TaskSource for HttpTaskSource {
    async fn pending_tasks(&self) -> LifecycleResult<Vec<TaskDemand>> {
        let url = format!("{}/api/v1/tasks/pending", self.base_url);
        let response = self.client.get(&url).send().await.map_err(transport)?;
        if !response.status().is_success() {
            return Err(LifecycleError::Transport(format!(
                "{url}: {}",
                response.status()
            )));
        }
        let body: Vec<PendingTaskRecord> = response.json().await.map_err(decode)?;
        let now = epoch_secs();
        Ok(body.into_iter().map(|t| t.into_demand(now)).collect())
    }
}
