//! Configuration for the orchestrator and the definition store.

use std::path::PathBuf;
use std::time::Duration;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Top level configuration loaded from file + environment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Orchestrator tuning knobs.
    pub orchestrator: OrchestratorConfig,
    /// Definition store roots.
    pub store: StoreConfig,
}

impl Config {
    /// Load configuration from an optional YAML file, layered under
    /// environment variables prefixed `CORE_`.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Env::prefixed("CORE_").split("__"));
        if let Some(path) = path {
            figment = Figment::from(Yaml::file(path)).merge(Env::prefixed("CORE_").split("__"));
        }
        figment.extract().map_err(|e| crate::Error::Config(e.to_string()))
    }
}

/// Tuning knobs for the [`crate::orchestrator::ServiceOrchestrator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Interval between health-check ticks, in seconds. Zero disables the ticker.
    pub health_check_interval_secs: u64,
    /// Default deadline for `createService` when the capability doesn't override it, in seconds.
    pub default_create_timeout_secs: u64,
    /// Default deadline for `deleteService` when the capability doesn't override it, in seconds.
    pub default_delete_timeout_secs: u64,
    /// Maximum number of create/delete executions running concurrently.
    pub max_concurrent_ops: usize,
    /// Testing aid: suppress the health-check ticker and control worker entirely.
    pub disable_control_loops: bool,
}

impl OrchestratorConfig {
    /// Interval between health-check ticks. Zero disables the ticker.
    #[must_use]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    /// Default deadline for `createService`.
    #[must_use]
    pub fn default_create_timeout(&self) -> Duration {
        Duration::from_secs(self.default_create_timeout_secs)
    }

    /// Default deadline for `deleteService`.
    #[must_use]
    pub fn default_delete_timeout(&self) -> Duration {
        Duration::from_secs(self.default_delete_timeout_secs)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            health_check_interval_secs: 30,
            default_create_timeout_secs: 60,
            default_delete_timeout_secs: 30,
            max_concurrent_ops: 10,
            disable_control_loops: false,
        }
    }
}

/// Roots the definition store loads capability/service-capability YAML from,
/// and writes new/updated definitions back to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// User-level root, e.g. `~/.config/<app>`. Loaded first; project definitions
    /// of the same name shadow it.
    pub user_dir: Option<PathBuf>,
    /// Project-level root, e.g. `.`. Loaded second, takes precedence on name collision.
    pub project_dir: PathBuf,
    /// Subdirectory (under each root) holding plain capability definitions.
    pub capabilities_subdir: String,
    /// Subdirectory (under each root) holding service capability definitions.
    pub service_capabilities_subdir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            user_dir: dirs_next_config_dir(),
            project_dir: PathBuf::from("."),
            capabilities_subdir: "capabilities".to_string(),
            service_capabilities_subdir: "service_capabilities".to_string(),
        }
    }
}

fn dirs_next_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("core"))
}
