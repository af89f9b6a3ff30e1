//! Capability definition types.
//!
//! These map directly onto the YAML capability definition format. Grounded
//! on the teacher's `CapabilityDefinition`/`SchemaDefinition` shapes in
//! `capability/definition.rs`, generalised from a single REST-call shape to
//! a named bundle of tool-backed operations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A capability definition: a named bundle of operations, each gated by the
/// tools it requires from the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDefinition {
    /// Unique capability name.
    pub name: String,

    /// Free-form, non-empty capability type (e.g. `"rest"`, `"messaging"`).
    #[serde(rename = "type")]
    pub kind: String,

    /// Definition format version.
    #[serde(default = "default_version")]
    pub version: String,

    /// Human-readable description (≤ 500 chars).
    #[serde(default)]
    pub description: String,

    /// Operation name → Operation Definition. Must be non-empty.
    pub operations: HashMap<String, OperationDefinition>,

    /// Free-form metadata, passed through unvalidated.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl CapabilityDefinition {
    /// The canonical synthesised tool name for one of this capability's
    /// operations: `api_<type>_<operation>`.
    #[must_use]
    pub fn tool_name(&self, operation: &str) -> String {
        format!("api_{}_{}", self.kind, operation)
    }
}

fn default_version() -> String {
    "1".to_string()
}

/// A single operation exposed by a capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDefinition {
    /// Human-readable description (≤ 300 chars).
    #[serde(default)]
    pub description: String,

    /// Ordered parameter schema.
    #[serde(default)]
    pub parameters: Vec<ParameterSchema>,

    /// Tool names that must be available for this operation to be callable.
    #[serde(default)]
    pub requires: Vec<String>,

    /// The workflow this operation forwards to.
    pub workflow: WorkflowRef,
}

impl OperationDefinition {
    /// The logical workflow name, whether declared as a bare reference or
    /// embedded inline.
    #[must_use]
    pub fn workflow_name(&self) -> &str {
        match &self.workflow {
            WorkflowRef::Named(name) => name,
            WorkflowRef::Embedded { name, .. } => name,
        }
    }
}

/// A reference to a workflow: either a bare name, or an embedded workflow
/// whose `steps` are opaque to the core and forwarded by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkflowRef {
    /// A bare workflow name.
    Named(String),
    /// An embedded workflow definition; only `name` is interpreted here.
    Embedded {
        /// Workflow name.
        name: String,
        /// Opaque step definitions, forwarded verbatim.
        #[serde(default)]
        steps: Value,
    },
}

/// Schema for a single operation parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name.
    pub name: String,
    /// Parameter type, e.g. `"string"`, `"integer"`.
    #[serde(rename = "type", default = "default_param_type")]
    pub kind: String,
    /// Whether callers must supply this parameter.
    #[serde(default)]
    pub required: bool,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Default value used when the caller omits this parameter.
    #[serde(default)]
    pub default: Option<Value>,
}

fn default_param_type() -> String {
    "string".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_named_workflow() {
        let yaml = r"
name: search
type: rest
operations:
  find:
    requires: [api_search_find]
    workflow: find_workflow
";
        let def: CapabilityDefinition = serde_yaml::from_str(yaml).unwrap();
        let op = def.operations.get("find").unwrap();
        assert_eq!(op.workflow_name(), "find_workflow");
    }

    #[test]
    fn deserializes_embedded_workflow() {
        let yaml = r"
name: search
type: rest
operations:
  find:
    requires: [api_search_find]
    workflow:
      name: inline_find
      steps: [{call: api_search_find}]
";
        let def: CapabilityDefinition = serde_yaml::from_str(yaml).unwrap();
        let op = def.operations.get("find").unwrap();
        assert_eq!(op.workflow_name(), "inline_find");
    }

    #[test]
    fn tool_name_follows_convention() {
        let def = CapabilityDefinition {
            name: "search".into(),
            kind: "rest".into(),
            version: default_version(),
            description: String::new(),
            operations: HashMap::new(),
            metadata: HashMap::new(),
        };
        assert_eq!(def.tool_name("find"), "api_rest_find");
    }
}
