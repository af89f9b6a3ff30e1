//! Structural validation for capability and service-capability definitions.
//!
//! Grounded on the teacher's aggregated-issues-list style in
//! `validator/report.rs`: validation never aborts on the first problem, it
//! collects everything wrong with a definition and returns the list.

use serde::{Deserialize, Serialize};

use super::definition::CapabilityDefinition;
use super::service_definition::ServiceCapabilityDefinition;

/// Severity of a single validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// The definition cannot be loaded.
    Error,
    /// The definition loads but the finding should be fixed.
    Warning,
}

/// A single validation finding against a definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// How serious the finding is.
    pub severity: Severity,
    /// Field path the finding concerns, e.g. `"operations.find.description"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl ValidationIssue {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { severity: Severity::Error, field: field.into(), message: message.into() }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { severity: Severity::Warning, field: field.into(), message: message.into() }
    }
}

/// True if the findings contain no [`Severity::Error`].
#[must_use]
pub fn passed(issues: &[ValidationIssue]) -> bool {
    !issues.iter().any(|i| i.severity == Severity::Error)
}

fn valid_entity_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Validate a plain capability definition per the rules in §4.2.
#[must_use]
pub fn validate_capability(def: &CapabilityDefinition) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if !valid_entity_name(&def.name) {
        issues.push(ValidationIssue::error("name", format!("'{}' is not a valid entity name", def.name)));
    }
    if def.kind.trim().is_empty() {
        issues.push(ValidationIssue::error("type", "type must be non-empty"));
    }
    if def.description.len() > 500 {
        issues.push(ValidationIssue::error("description", "description exceeds 500 characters"));
    }
    if def.operations.is_empty() {
        issues.push(ValidationIssue::error("operations", "at least one operation is required"));
    }
    for (op_name, op) in &def.operations {
        let field = format!("operations.{op_name}");
        if op.description.is_empty() {
            issues.push(ValidationIssue::error(format!("{field}.description"), "operation description is required"));
        } else if op.description.len() > 300 {
            issues.push(ValidationIssue::error(format!("{field}.description"), "description exceeds 300 characters"));
        }
        if op.requires.iter().any(String::is_empty) {
            issues.push(ValidationIssue::error(format!("{field}.requires"), "required-tool list contains an empty entry"));
        }
    }

    issues
}

/// Validate a service capability definition: runs [`validate_capability`]
/// against the embedded capability, plus the service-specific rules.
#[must_use]
pub fn validate_service_capability(def: &ServiceCapabilityDefinition) -> Vec<ValidationIssue> {
    let mut issues = validate_capability(&def.capability);
    let config = &def.service_config;

    if config.service_type.trim().is_empty() {
        issues.push(ValidationIssue::error("service_config.service_type", "serviceType must be non-empty"));
    }
    if config.default_label.trim().is_empty() {
        issues.push(ValidationIssue::error("service_config.default_label", "defaultLabel must be non-empty"));
    }

    for (phase, tool) in [("create", Some(&config.lifecycle_tools.create)), ("delete", Some(&config.lifecycle_tools.delete))] {
        if let Some(tool) = tool {
            check_tool_name(&mut issues, phase, &tool.tool);
        }
    }
    if let Some(tool) = &config.lifecycle_tools.health_check {
        check_tool_name(&mut issues, "health_check", &tool.tool);
    }
    if let Some(tool) = &config.lifecycle_tools.status {
        check_tool_name(&mut issues, "status", &tool.tool);
    }

    const TEN_MINUTES: u64 = 600;
    if config.timeout.create_secs == 0 || config.timeout.create_secs > TEN_MINUTES {
        issues.push(ValidationIssue::error("service_config.timeout.create_secs", "create timeout must be positive and at most 10 minutes"));
    }
    if config.timeout.delete_secs == 0 || config.timeout.delete_secs > TEN_MINUTES {
        issues.push(ValidationIssue::error("service_config.timeout.delete_secs", "delete timeout must be positive and at most 10 minutes"));
    }
    if config.timeout.health_check_secs == 0 || config.timeout.health_check_secs > TEN_MINUTES {
        issues.push(ValidationIssue::error("service_config.timeout.health_check_secs", "health-check timeout must be positive and at most 10 minutes"));
    }

    if config.health_check.enabled {
        if config.health_check.interval_secs == 0 {
            issues.push(ValidationIssue::error("service_config.health_check.interval_secs", "interval must be positive when health checks are enabled"));
        }
        if config.health_check.failure_threshold == 0 {
            issues.push(ValidationIssue::error("service_config.health_check.failure_threshold", "failureThreshold must be positive"));
        }
        if config.health_check.success_threshold == 0 {
            issues.push(ValidationIssue::error("service_config.health_check.success_threshold", "successThreshold must be positive"));
        }
    }

    for (name, param) in &config.create_parameters {
        if param.tool_parameter.trim().is_empty() {
            issues.push(ValidationIssue::error(
                format!("service_config.create_parameters.{name}.tool_parameter"),
                "toolParameter must be non-empty",
            ));
        }
    }

    issues
}

fn check_tool_name(issues: &mut Vec<ValidationIssue>, phase: &str, tool: &str) {
    if tool.trim().is_empty() {
        issues.push(ValidationIssue::error(format!("service_config.lifecycle_tools.{phase}.tool"), "tool name must be non-empty"));
        return;
    }
    if !(tool.starts_with("x_") || tool.starts_with("api_")) {
        issues.push(ValidationIssue::warning(
            format!("service_config.lifecycle_tools.{phase}.tool"),
            format!("tool name '{tool}' does not follow the x_/api_ naming convention"),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn minimal_capability() -> CapabilityDefinition {
        serde_yaml::from_str(
            r"
name: search
type: rest
operations:
  find:
    description: finds things
    requires: [api_search_find]
    workflow: find_workflow
",
        )
        .unwrap()
    }

    #[test]
    fn minimal_capability_passes() {
        let def = minimal_capability();
        let issues = validate_capability(&def);
        assert!(passed(&issues), "{issues:?}");
    }

    #[test]
    fn empty_operations_is_an_error() {
        let mut def = minimal_capability();
        def.operations = HashMap::new();
        let issues = validate_capability(&def);
        assert!(!passed(&issues));
    }

    #[test]
    fn long_description_is_rejected() {
        let mut def = minimal_capability();
        def.description = "x".repeat(501);
        let issues = validate_capability(&def);
        assert!(!passed(&issues));
    }

    #[test]
    fn non_conventional_tool_name_is_only_a_warning() {
        let yaml = r"
name: redis
type: database
operations:
  ping:
    description: pings
    requires: [api_database_ping]
    workflow: ping_workflow
service_config:
  service_type: redis
  default_label: redis
  lifecycle_tools:
    create:
      tool: make_redis
    delete:
      tool: x_redis_delete
";
        let def: ServiceCapabilityDefinition = serde_yaml::from_str(yaml).unwrap();
        let issues = validate_service_capability(&def);
        assert!(passed(&issues), "{issues:?}");
        assert!(issues.iter().any(|i| i.severity == Severity::Warning));
    }
}
