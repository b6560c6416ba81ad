//! Autoscaler configuration.
//!
//! Loaded once from a TOML file at startup, validated, and immutable
//! thereafter. Durations are human strings ("30s", "5m", "12h"); the
//! instance allow-list is an array of tables:
//!
//! ```toml
//! poll_interval = "30s"
//! terminate_enabled = true
//! max_instance_age = "6h"
//!
//! [[instance]]
//! name = "t2.small"
//! cpus = 1.0
//! mem = 2048.0
//! arch = "x86_64"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{StateError, StateResult};
use crate::types::InstanceType;

/// Process-wide autoscaler configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Time between reconciliation cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
    /// Bound on each snapshot-source fetch within a cycle.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout: String,
    /// Minimum wait between deactivating an agent and terminating its
    /// instance, and the age below which an unregistered launch is still
    /// counted as in-flight capacity.
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout: String,
    /// Hard override for `wait_timeout`; clamps the drain wait when set.
    #[serde(default)]
    pub wait_timeout_override: Option<String>,
    /// How long a terminate request may go unreflected in the cloud
    /// inventory before the instance is flagged as stuck.
    #[serde(default = "default_terminate_wait")]
    pub terminate_wait: String,
    /// Agents older than this become termination candidates once idle.
    #[serde(default = "default_max_instance_age")]
    pub max_instance_age: String,
    /// Architecture assumed for tasks that do not declare one.
    #[serde(default = "default_architecture")]
    pub default_architecture: String,
    /// Instance type used when no allow-list entry satisfies demand.
    #[serde(default)]
    pub fallback_instance_type: Option<String>,
    /// Master switch for scale-down (deactivate + terminate).
    #[serde(default)]
    pub terminate_enabled: bool,
    /// Master switch for scale-up.
    #[serde(default = "default_true")]
    pub launch_enabled: bool,
    /// Operator-approved instance types.
    #[serde(default, rename = "instance")]
    pub instances: Vec<InstanceType>,
}

fn default_poll_interval() -> String {
    "30s".to_string()
}
fn default_poll_timeout() -> String {
    "10s".to_string()
}
fn default_wait_timeout() -> String {
    "5m".to_string()
}
fn default_terminate_wait() -> String {
    "10m".to_string()
}
fn default_max_instance_age() -> String {
    "6h".to_string()
}
fn default_architecture() -> String {
    "x86_64".to_string()
}
fn default_true() -> bool {
    true
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> StateResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StateError::ConfigRead(path.display().to_string(), e.to_string()))?;
        let config: Config =
            toml::from_str(&raw).map_err(|e| StateError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate invariants that serde cannot express.
    pub fn validate(&self) -> StateResult<()> {
        if self.instances.is_empty() && (self.launch_enabled || self.terminate_enabled) {
            return Err(StateError::InvalidConfig(
                "instance allow-list is empty but launch/terminate is enabled".to_string(),
            ));
        }

        let mut names: Vec<&str> = self.instances.iter().map(|i| i.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.instances.len() {
            return Err(StateError::InvalidConfig(
                "instance allow-list contains duplicate names".to_string(),
            ));
        }

        for entry in &self.instances {
            if entry.cpus <= 0.0 || entry.mem <= 0.0 {
                return Err(StateError::InvalidConfig(format!(
                    "instance type {} has non-positive cpus/mem",
                    entry.name
                )));
            }
        }

        if let Some(fallback) = &self.fallback_instance_type
            && !self.instances.iter().any(|i| &i.name == fallback)
        {
            return Err(StateError::InvalidConfig(format!(
                "fallback instance type {fallback} is not in the allow-list"
            )));
        }

        // Parse all duration fields up front so a typo fails at startup,
        // not mid-cycle.
        for (field, value) in [
            ("poll_interval", &self.poll_interval),
            ("poll_timeout", &self.poll_timeout),
            ("wait_timeout", &self.wait_timeout),
            ("terminate_wait", &self.terminate_wait),
            ("max_instance_age", &self.max_instance_age),
        ] {
            parse_duration(value).map_err(|e| {
                StateError::InvalidConfig(format!("{field} = {value:?}: {e}"))
            })?;
        }
        if let Some(value) = &self.wait_timeout_override {
            parse_duration(value).map_err(|e| {
                StateError::InvalidConfig(format!("wait_timeout_override = {value:?}: {e}"))
            })?;
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        parse_duration_or(&self.poll_interval, Duration::from_secs(30))
    }

    pub fn poll_timeout(&self) -> Duration {
        parse_duration_or(&self.poll_timeout, Duration::from_secs(10))
    }

    pub fn wait_timeout(&self) -> Duration {
        parse_duration_or(&self.wait_timeout, Duration::from_secs(300))
    }

    /// The drain wait actually enforced: the override wins when set.
    pub fn effective_wait_timeout(&self) -> Duration {
        match &self.wait_timeout_override {
            Some(value) => parse_duration_or(value, self.wait_timeout()),
            None => self.wait_timeout(),
        }
    }

    pub fn terminate_wait(&self) -> Duration {
        parse_duration_or(&self.terminate_wait, Duration::from_secs(600))
    }

    pub fn max_instance_age(&self) -> Duration {
        parse_duration_or(&self.max_instance_age, Duration::from_secs(6 * 3600))
    }
}

/// Parse a duration string like "90s", "5m", "12h". Bare digits are
/// seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, ""),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration {s:?}"))?;
    let secs = match unit {
        "" | "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        "d" => value * 86_400,
        _ => return Err(format!("unknown duration unit {unit:?}")),
    };
    Ok(Duration::from_secs(secs))
}

fn parse_duration_or(s: &str, fallback: Duration) -> Duration {
    parse_duration(s).unwrap_or(fallback)
}
