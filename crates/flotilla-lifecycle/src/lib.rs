//! flotilla-lifecycle — the boundary between the decision core and the
//! outside world.
//!
//! Defines the three collaborator interfaces (scheduler master, cloud
//! provider, workflow-engine task source), the wire DTOs those
//! collaborators speak plus their mapping into the domain model, and
//! the controller that executes scale actions against them.

pub mod api;
pub mod controller;
pub mod error;
pub mod wire;

pub use api::{CloudProvider, SchedulerMaster, TaskSource};
pub use controller::{ActionReport, AgentLifecycleController};
pub use error::{LifecycleError, LifecycleResult};
