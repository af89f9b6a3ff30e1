//! The Service Instance record and its two independent state axes.

use std::collections::HashMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle position of a service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceState {
    /// Allocated but not yet acted on.
    Unknown,
    /// Waiting on a dependency before creation can begin.
    Waiting,
    /// Create tool invoked, awaiting result.
    Starting,
    /// Create succeeded; the instance is live.
    Running,
    /// Delete tool invoked, awaiting result.
    Stopping,
    /// Delete completed (or was forced); terminal.
    Stopped,
    /// Create tool failed or errored.
    Failed,
    /// Reserved for a future retry policy; unused by the current orchestrator.
    Retrying,
}

/// Liveness of a service instance, independent of [`InstanceState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceHealth {
    /// No health check has run yet.
    Unknown,
    /// The most recent health check succeeded (or none is configured).
    Healthy,
    /// `failureThreshold` consecutive health checks have failed.
    Unhealthy,
}

/// A live or recently-live occurrence of a service created from a service
/// capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Implementation-generated unique identifier.
    pub id: String,
    /// User-supplied unique label.
    pub label: String,
    /// Name of the service capability this instance was created from.
    pub capability_name: String,
    /// `serviceType` of the originating capability, cached for convenience.
    pub capability_type: String,
    /// Current lifecycle position.
    pub state: InstanceState,
    /// Current liveness.
    pub health: InstanceHealth,
    /// Most recent error message, if any.
    pub last_error: Option<String>,
    /// Parameters supplied at creation time. Immutable after creation.
    pub creation_parameters: HashMap<String, Value>,
    /// Aggregate of parsed tool responses (`external_service_id`,
    /// `external_status`, `external_health`, `external_error`, plus
    /// declared metadata).
    pub service_data: HashMap<String, Value>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last time any field changed.
    pub updated_at: SystemTime,
    /// Last time a health check ran, if ever.
    pub last_checked: Option<SystemTime>,
    /// Consecutive health-check failures since the last success.
    pub failure_count: u32,
    /// Consecutive health-check successes since the last failure.
    pub success_count: u32,
}

impl ServiceInstance {
    /// Allocate a new instance in the `Unknown` state with a freshly
    /// generated id.
    #[must_use]
    pub fn new(
        label: String,
        capability_name: String,
        capability_type: String,
        creation_parameters: HashMap<String, Value>,
        now: SystemTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            label,
            capability_name,
            capability_type,
            state: InstanceState::Unknown,
            health: InstanceHealth::Unknown,
            last_error: None,
            creation_parameters,
            service_data: HashMap::new(),
            created_at: now,
            updated_at: now,
            last_checked: None,
            failure_count: 0,
            success_count: 0,
        }
    }
}
