//! The persistence collaborator named in the Non-goals: `create`/`update`/
//! `delete` on a store delegate serialisation-to-disk here, rather than the
//! store embedding filesystem concerns directly.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::{Error, Result};

/// Writes and removes serialised definitions by name. Injected into the
/// stores so tests can substitute an in-memory fake.
#[async_trait]
pub trait DefinitionStorage: Send + Sync {
    /// Persist `yaml` under `name`.
    async fn write(&self, name: &str, yaml: &str) -> Result<()>;

    /// Remove the definition previously persisted under `name`.
    async fn remove(&self, name: &str) -> Result<()>;
}

/// Default filesystem-backed storage: one YAML file per definition name
/// under a configured writable root, mirroring the teacher's YAML-file-per-
/// definition convention.
#[derive(Debug, Clone)]
pub struct FsDefinitionStorage {
    root: PathBuf,
}

impl FsDefinitionStorage {
    /// Create a storage collaborator rooted at `root`. The root is created
    /// lazily on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.yaml"))
    }
}

#[async_trait]
impl DefinitionStorage for FsDefinitionStorage {
    async fn write(&self, name: &str, yaml: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.path_for(name), yaml).await?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let path = self.path_for(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}
