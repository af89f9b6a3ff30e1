//! Capability Execution Adapter: resolves a `(capabilityType, operation)`
//! pair to its backing workflow tool and executes it, and exposes the
//! capability catalogue to outer layers.
//!
//! Grounded on the teacher's `backend::Backend::execute` dispatch (resolve a
//! logical name, check gating, forward to the transport) and
//! `capability::CapabilityManager::list` for the catalogue aggregation.

use std::sync::Arc;

use serde_json::Value;

use crate::capability::{CapabilityDefinition, CapabilityStore, OperationDefinition, ParameterSchema};
use crate::tool_iface::{ToolCaller, ToolResponse};
use crate::{Error, Result};

/// Catalogue entry for a single capability, operations annotated with
/// current availability.
#[derive(Debug, Clone)]
pub struct CapabilityInfo {
    /// Capability name.
    pub name: String,
    /// Capability type.
    pub kind: String,
    /// Capability description.
    pub description: String,
    /// Operations, de-duplicated by name.
    pub operations: Vec<OperationInfo>,
}

/// Catalogue entry for a single operation.
#[derive(Debug, Clone)]
pub struct OperationInfo {
    /// Operation name.
    pub name: String,
    /// Operation description.
    pub description: String,
    /// Ordered parameter schema.
    pub parameters: Vec<ParameterSchema>,
    /// Whether every tool this operation requires is currently available.
    pub available: bool,
}

/// Executes capability operations against the Tool Caller and surfaces the
/// capability catalogue.
pub struct CapabilityExecutionAdapter {
    store: Arc<CapabilityStore>,
    caller: Arc<dyn ToolCaller>,
}

impl CapabilityExecutionAdapter {
    /// Construct an adapter over a Definition Store and Tool Caller.
    #[must_use]
    pub fn new(store: Arc<CapabilityStore>, caller: Arc<dyn ToolCaller>) -> Self {
        Self { store, caller }
    }

    /// Resolve `(capability_type, operation)` to its workflow and invoke it
    /// via the Tool Caller with `params` forwarded verbatim.
    pub async fn execute_capability(&self, capability_type: &str, operation: &str, params: Value) -> Result<ToolResponse> {
        let tool_name = format!("api_{capability_type}_{operation}");
        let (op_name, def) = self
            .store
            .get_operation_for_tool(&tool_name)
            .ok_or_else(|| Error::NotFound(tool_name.clone()))?;

        if !self.store.is_operation_available(&tool_name) {
            return Err(Error::NotAvailable(tool_name));
        }

        let op_def = def
            .operations
            .get(&op_name)
            .ok_or_else(|| Error::Internal(format!("operation '{op_name}' vanished from '{}'", def.name)))?;

        let workflow_tool = format!("action_{}", op_def.workflow_name());
        self.caller.call(&workflow_tool, params).await
    }

    /// Aggregate every loaded capability into a catalogue with live
    /// availability annotations.
    #[must_use]
    pub fn list_capabilities(&self) -> Vec<CapabilityInfo> {
        self.store.list().into_iter().map(|def| self.describe(&def)).collect()
    }

    fn describe(&self, def: &CapabilityDefinition) -> CapabilityInfo {
        let mut operations: Vec<OperationInfo> = def
            .operations
            .iter()
            .map(|(name, op)| self.describe_operation(name, op))
            .collect();
        operations.sort_by(|a, b| a.name.cmp(&b.name));

        CapabilityInfo { name: def.name.clone(), kind: def.kind.clone(), description: def.description.clone(), operations }
    }

    fn describe_operation(&self, name: &str, op: &OperationDefinition) -> OperationInfo {
        OperationInfo {
            name: name.to_string(),
            description: op.description.clone(),
            parameters: op.parameters.clone(),
            available: self.store.operation_available(op),
        }
    }

    /// Create a capability definition (delegates to the Definition Store).
    pub async fn create_capability(&self, def: CapabilityDefinition) -> Result<()> {
        self.store.create(def).await
    }

    /// Replace a capability definition (delegates to the Definition Store).
    pub async fn update_capability(&self, def: CapabilityDefinition) -> Result<()> {
        self.store.update(def).await
    }

    /// Remove a capability definition by name (delegates to the Definition
    /// Store).
    pub async fn delete_capability(&self, name: &str) -> Result<()> {
        self.store.delete(name).await
    }
}
