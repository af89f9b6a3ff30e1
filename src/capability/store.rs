//! The two concrete Definition Store implementations: one over plain
//! capability definitions, one over service capability definitions. Both
//! keep an in-memory index guarded by a single reader-writer lock and
//! derive availability from an injected [`ToolAvailabilityOracle`] rather
//! than storing it, per §4.2.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use super::definition::CapabilityDefinition;
use super::loader::{load_layered, LoadedDefinition};
use super::parser::ParsedDefinition;
use super::service_definition::ServiceCapabilityDefinition;
use super::storage::DefinitionStorage;
use super::validator::{passed, validate_capability, validate_service_capability, ValidationIssue};
use crate::config::StoreConfig;
use crate::tool_iface::ToolAvailabilityOracle;
use crate::{Error, Result};

/// Definition Store over plain capability definitions.
pub struct CapabilityStore {
    defs: RwLock<HashMap<String, CapabilityDefinition>>,
    storage: Arc<dyn DefinitionStorage>,
    oracle: Arc<dyn ToolAvailabilityOracle>,
    config: StoreConfig,
}

impl CapabilityStore {
    /// Construct a store with no definitions loaded yet. Call [`Self::load`]
    /// to populate it from the configured roots.
    #[must_use]
    pub fn new(storage: Arc<dyn DefinitionStorage>, oracle: Arc<dyn ToolAvailabilityOracle>, config: StoreConfig) -> Self {
        Self { defs: RwLock::new(HashMap::new()), storage, oracle, config }
    }

    /// Reload every valid capability definition from the layered roots,
    /// replacing the in-memory set atomically. Returns the number loaded.
    pub async fn load(&self) -> usize {
        let loaded = load_layered(
            self.config.user_dir.as_deref(),
            &self.config.project_dir,
            &self.config.capabilities_subdir,
        )
        .await;

        let mut fresh = HashMap::new();
        for item in loaded {
            match only_capability(item) {
                Some(def) => {
                    let issues = validate_capability(&def);
                    if passed(&issues) {
                        fresh.insert(def.name.clone(), def);
                    } else {
                        warn!(name = %def.name, issues = ?issues, "capability failed validation, skipping");
                    }
                }
                None => continue,
            }
        }

        let count = fresh.len();
        *self.defs.write() = fresh;
        info!(count, "loaded capability definitions");
        count
    }

    /// Look up a capability by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<CapabilityDefinition> {
        self.defs.read().get(name).cloned()
    }

    /// All loaded capabilities.
    #[must_use]
    pub fn list(&self) -> Vec<CapabilityDefinition> {
        self.defs.read().values().cloned().collect()
    }

    /// Capabilities whose every operation is currently available.
    #[must_use]
    pub fn list_available(&self) -> Vec<CapabilityDefinition> {
        self.list().into_iter().filter(|def| self.is_available(&def.name)).collect()
    }

    /// Insert a new capability, persisting it first. Fails with
    /// [`Error::AlreadyExists`] on a name collision and
    /// [`Error::ValidationFailure`] on invalid input.
    pub async fn create(&self, def: CapabilityDefinition) -> Result<()> {
        if self.defs.read().contains_key(&def.name) {
            return Err(Error::AlreadyExists(def.name.clone()));
        }
        self.validate_or_fail(&def)?;
        self.persist(&def).await?;
        self.defs.write().insert(def.name.clone(), def);
        Ok(())
    }

    /// Replace an existing capability. Fails with [`Error::NotFound`] if it
    /// doesn't already exist.
    pub async fn update(&self, def: CapabilityDefinition) -> Result<()> {
        if !self.defs.read().contains_key(&def.name) {
            return Err(Error::NotFound(def.name.clone()));
        }
        self.validate_or_fail(&def)?;
        self.persist(&def).await?;
        self.defs.write().insert(def.name.clone(), def);
        Ok(())
    }

    /// Remove a capability by name.
    pub async fn delete(&self, name: &str) -> Result<()> {
        if !self.defs.read().contains_key(name) {
            return Err(Error::NotFound(name.to_string()));
        }
        self.storage.remove(name).await?;
        self.defs.write().remove(name);
        Ok(())
    }

    /// True iff every one of the capability's operations is currently
    /// available, matching the all-tools-available rule
    /// [`ServiceCapabilityStore::is_available`] applies across a service
    /// capability's lifecycle and operation requirements.
    #[must_use]
    pub fn is_available(&self, name: &str) -> bool {
        let Some(def) = self.get(name) else { return false };
        def.operations.values().all(|op| self.operation_available(op))
    }

    pub(crate) fn operation_available(&self, op: &super::definition::OperationDefinition) -> bool {
        op.requires.iter().all(|tool| self.oracle.is_available(tool))
    }

    /// True iff the operation resolved by a synthesised tool name is
    /// currently available. `false` if the tool name doesn't resolve.
    #[must_use]
    pub fn is_operation_available(&self, tool_name: &str) -> bool {
        match self.get_operation_for_tool(tool_name) {
            Some((op_name, def)) => def.operations.get(&op_name).is_some_and(|op| self.operation_available(op)),
            None => false,
        }
    }

    /// Resolve a synthesised tool name (`api_<type>_<operation>`) back to its
    /// operation name and owning definition.
    #[must_use]
    pub fn get_operation_for_tool(&self, tool_name: &str) -> Option<(String, CapabilityDefinition)> {
        self.defs.read().values().find_map(|def| {
            def.operations
                .keys()
                .find(|op_name| def.tool_name(op_name) == tool_name)
                .map(|op_name| (op_name.clone(), def.clone()))
        })
    }

    fn validate_or_fail(&self, def: &CapabilityDefinition) -> Result<()> {
        let issues = validate_capability(def);
        if passed(&issues) {
            Ok(())
        } else {
            Err(Error::ValidationFailure(issues.into_iter().map(|i| i.message).collect()))
        }
    }

    async fn persist(&self, def: &CapabilityDefinition) -> Result<()> {
        let yaml = serde_yaml::to_string(def)?;
        self.storage.write(&def.name, &yaml).await
    }
}

fn only_capability(item: LoadedDefinition) -> Option<CapabilityDefinition> {
    match item.definition {
        ParsedDefinition::Capability(def) => Some(def),
        ParsedDefinition::Service(_) => {
            warn!(path = %item.source.display(), "service capability found under capabilities root, skipping");
            None
        }
    }
}

/// Definition Store over service capability definitions.
pub struct ServiceCapabilityStore {
    defs: RwLock<HashMap<String, ServiceCapabilityDefinition>>,
    storage: Arc<dyn DefinitionStorage>,
    oracle: Arc<dyn ToolAvailabilityOracle>,
    config: StoreConfig,
}

impl ServiceCapabilityStore {
    /// Construct a store with no definitions loaded yet.
    #[must_use]
    pub fn new(storage: Arc<dyn DefinitionStorage>, oracle: Arc<dyn ToolAvailabilityOracle>, config: StoreConfig) -> Self {
        Self { defs: RwLock::new(HashMap::new()), storage, oracle, config }
    }

    /// Reload every valid service capability definition from the layered
    /// roots, replacing the in-memory set atomically.
    pub async fn load(&self) -> usize {
        let loaded = load_layered(
            self.config.user_dir.as_deref(),
            &self.config.project_dir,
            &self.config.service_capabilities_subdir,
        )
        .await;

        let mut fresh = HashMap::new();
        for item in loaded {
            match only_service(item) {
                Some(def) => {
                    let issues = validate_service_capability(&def);
                    if passed(&issues) {
                        fresh.insert(def.capability.name.clone(), def);
                    } else {
                        warn!(name = %def.capability.name, issues = ?issues, "service capability failed validation, skipping");
                    }
                }
                None => continue,
            }
        }

        let count = fresh.len();
        *self.defs.write() = fresh;
        info!(count, "loaded service capability definitions");
        count
    }

    /// Look up a service capability by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ServiceCapabilityDefinition> {
        self.defs.read().get(name).cloned()
    }

    /// All loaded service capabilities.
    #[must_use]
    pub fn list(&self) -> Vec<ServiceCapabilityDefinition> {
        self.defs.read().values().cloned().collect()
    }

    /// Service capabilities for which every referenced tool is currently
    /// available.
    #[must_use]
    pub fn list_available(&self) -> Vec<ServiceCapabilityDefinition> {
        self.list().into_iter().filter(|def| self.is_available(&def.capability.name)).collect()
    }

    /// Insert a new service capability, persisting it first.
    pub async fn create(&self, def: ServiceCapabilityDefinition) -> Result<()> {
        let name = def.capability.name.clone();
        if self.defs.read().contains_key(&name) {
            return Err(Error::AlreadyExists(name));
        }
        self.validate_or_fail(&def)?;
        self.persist(&def).await?;
        self.defs.write().insert(name, def);
        Ok(())
    }

    /// Replace an existing service capability.
    pub async fn update(&self, def: ServiceCapabilityDefinition) -> Result<()> {
        let name = def.capability.name.clone();
        if !self.defs.read().contains_key(&name) {
            return Err(Error::NotFound(name));
        }
        self.validate_or_fail(&def)?;
        self.persist(&def).await?;
        self.defs.write().insert(def.capability.name.clone(), def);
        Ok(())
    }

    /// Remove a service capability by name.
    pub async fn delete(&self, name: &str) -> Result<()> {
        if !self.defs.read().contains_key(name) {
            return Err(Error::NotFound(name.to_string()));
        }
        self.storage.remove(name).await?;
        self.defs.write().remove(name);
        Ok(())
    }

    /// True iff every tool this service capability references (lifecycle and
    /// operation requirements) is currently available.
    #[must_use]
    pub fn is_available(&self, name: &str) -> bool {
        let Some(def) = self.get(name) else { return false };
        def.referenced_tools().iter().all(|tool| self.oracle.is_available(tool))
    }

    fn validate_or_fail(&self, def: &ServiceCapabilityDefinition) -> Result<()> {
        let issues = validate_service_capability(def);
        if passed(&issues) {
            Ok(())
        } else {
            Err(Error::ValidationFailure(issues.into_iter().map(|i| i.message).collect()))
        }
    }

    async fn persist(&self, def: &ServiceCapabilityDefinition) -> Result<()> {
        let yaml = serde_yaml::to_string(def)?;
        self.storage.write(&def.capability.name, &yaml).await
    }
}

fn only_service(item: LoadedDefinition) -> Option<ServiceCapabilityDefinition> {
    match item.definition {
        ParsedDefinition::Service(def) => Some(def),
        ParsedDefinition::Capability(_) => {
            warn!(path = %item.source.display(), "plain capability found under service capabilities root, skipping");
            None
        }
    }
}
