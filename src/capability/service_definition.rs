//! Service capability definition types: a capability plus a lifecycle recipe
//! for instantiable services.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::definition::CapabilityDefinition;

/// A service capability: a [`CapabilityDefinition`] plus the `serviceConfig`
/// sub-record describing how to create, delete, and health-check instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCapabilityDefinition {
    /// The underlying capability (name, type, operations, ...).
    #[serde(flatten)]
    pub capability: CapabilityDefinition,

    /// Service-specific lifecycle and health-check configuration.
    pub service_config: ServiceConfig,
}

impl ServiceCapabilityDefinition {
    /// Every tool name referenced across lifecycle tools and operation
    /// requirements, used to derive availability.
    #[must_use]
    pub fn referenced_tools(&self) -> Vec<String> {
        let mut tools: Vec<String> = self
            .capability
            .operations
            .values()
            .flat_map(|op| op.requires.iter().cloned())
            .collect();

        tools.push(self.service_config.lifecycle_tools.create.tool.clone());
        tools.push(self.service_config.lifecycle_tools.delete.tool.clone());
        if let Some(health) = &self.service_config.lifecycle_tools.health_check {
            tools.push(health.tool.clone());
        }
        if let Some(status) = &self.service_config.lifecycle_tools.status {
            tools.push(status.tool.clone());
        }

        tools.sort();
        tools.dedup();
        tools
    }
}

/// The `serviceConfig` sub-record of a Service Capability Definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Non-empty service type discriminator.
    pub service_type: String,
    /// Template string for the default instance label when the caller
    /// doesn't supply one.
    pub default_label: String,
    /// Labels of services this one depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Create/Delete/HealthCheck/Status tool bindings.
    pub lifecycle_tools: LifecycleTools,
    /// Health-check cadence and thresholds.
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    /// Per-phase timeouts.
    #[serde(default)]
    pub timeout: TimeoutConfig,
    /// User-facing parameter name → tool parameter mapping for `createService`.
    #[serde(default)]
    pub create_parameters: HashMap<String, CreateParameterConfig>,
}

/// The set of lifecycle-phase tool bindings for a service capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleTools {
    /// Tool invoked to bring an instance up.
    pub create: LifecycleTool,
    /// Tool invoked to tear an instance down.
    pub delete: LifecycleTool,
    /// Optional tool invoked periodically to check liveness.
    #[serde(default)]
    pub health_check: Option<LifecycleTool>,
    /// Optional tool invoked to fetch out-of-band status.
    #[serde(default)]
    pub status: Option<LifecycleTool>,
}

/// A single lifecycle-phase tool binding: the tool name, a templated
/// argument map, and a declarative response mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleTool {
    /// Tool name. Expected (but not enforced beyond a validation warning)
    /// to follow the `x_`/`api_` naming convention.
    pub tool: String,
    /// Templated argument map, evaluated against the orchestrator's merged
    /// context before the call.
    #[serde(default)]
    pub arguments: HashMap<String, Value>,
    /// Declarative extraction of fields from the tool's response envelope.
    #[serde(default)]
    pub response_mapping: ResponseMapping,
}

/// Dotted-path extraction rules applied to a [`crate::tool_iface::ToolResponse`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMapping {
    /// Dotted path to the external service identifier.
    pub service_id: Option<String>,
    /// Dotted path to a status string.
    pub status: Option<String>,
    /// Dotted path to a health string.
    pub health: Option<String>,
    /// Dotted path to an error message.
    pub error: Option<String>,
    /// Additional metadata field name → dotted path.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Health-check cadence and failure/success thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Whether health-checking is enabled for instances of this capability.
    #[serde(default)]
    pub enabled: bool,
    /// Interval between checks, in seconds. Must be positive when enabled.
    #[serde(default = "default_health_interval_secs")]
    pub interval_secs: u64,
    /// Consecutive failures required to transition to `Unhealthy`.
    #[serde(default = "default_threshold")]
    pub failure_threshold: u32,
    /// Consecutive successes required to transition back to `Healthy`.
    #[serde(default = "default_threshold")]
    pub success_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_health_interval_secs(),
            failure_threshold: default_threshold(),
            success_threshold: default_threshold(),
        }
    }
}

fn default_health_interval_secs() -> u64 {
    30
}

fn default_threshold() -> u32 {
    3
}

/// Per-phase timeouts, each positive and at most ten minutes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Create timeout, in seconds.
    #[serde(default = "default_create_timeout_secs")]
    pub create_secs: u64,
    /// Delete timeout, in seconds.
    #[serde(default = "default_delete_timeout_secs")]
    pub delete_secs: u64,
    /// Health-check timeout, in seconds.
    #[serde(default = "default_health_timeout_secs")]
    pub health_check_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            create_secs: default_create_timeout_secs(),
            delete_secs: default_delete_timeout_secs(),
            health_check_secs: default_health_timeout_secs(),
        }
    }
}

fn default_create_timeout_secs() -> u64 {
    60
}

fn default_delete_timeout_secs() -> u64 {
    30
}

fn default_health_timeout_secs() -> u64 {
    15
}

/// A single `createParameters` entry: maps a user-facing parameter name onto
/// a tool parameter, with optional default/required/transform behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateParameterConfig {
    /// Name of the parameter as it appears in the Create tool's arguments.
    pub tool_parameter: String,
    /// Default value used when the caller omits this parameter.
    #[serde(default)]
    pub default: Option<Value>,
    /// Whether the caller must supply this parameter.
    #[serde(default)]
    pub required: bool,
    /// Name of a transform applied to the value before templating
    /// (opaque to the core; forwarded as metadata).
    #[serde(default)]
    pub transform: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ServiceCapabilityDefinition {
        serde_yaml::from_str(
            r#"
name: redis
type: database
operations:
  ping:
    requires: [api_database_ping]
    workflow: ping_workflow
service_config:
  service_type: redis
  default_label: "redis-{{index}}"
  lifecycle_tools:
    create:
      tool: x_redis_create
      arguments: {size: "{{size}}"}
    delete:
      tool: x_redis_delete
      arguments: {service_id: "{{service_id}}"}
    health_check:
      tool: x_redis_ping
  health_check:
    enabled: true
    interval_secs: 10
    failure_threshold: 2
    success_threshold: 2
"#,
        )
        .unwrap()
    }

    #[test]
    fn referenced_tools_covers_lifecycle_and_operations() {
        let def = sample();
        let tools = def.referenced_tools();
        assert!(tools.contains(&"api_database_ping".to_string()));
        assert!(tools.contains(&"x_redis_create".to_string()));
        assert!(tools.contains(&"x_redis_delete".to_string()));
        assert!(tools.contains(&"x_redis_ping".to_string()));
    }

    #[test]
    fn health_check_thresholds_parse() {
        let def = sample();
        assert_eq!(def.service_config.health_check.failure_threshold, 2);
        assert_eq!(def.service_config.health_check.success_threshold, 2);
    }
}
