//! Layered YAML loader: scans a user root then a project root, recursing
//! into subdirectories, parsing and classifying each file. Grounded on the
//! teacher's `CapabilityLoader::load_directory_recursive` (hidden-entry
//! skipping, `.yaml`/`.yml` filtering, per-file failure tolerance).

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::parser::{parse_definition_file, ParsedDefinition};

/// A definition loaded from disk, paired with the file it came from.
#[derive(Debug, Clone)]
pub struct LoadedDefinition {
    /// Path the definition was parsed from.
    pub source: PathBuf,
    /// The parsed, classified definition.
    pub definition: ParsedDefinition,
}

/// Load every valid definition under `user_root/subdir` then
/// `project_root/subdir`. Files that fail to parse or don't exist as
/// directories are logged and skipped; this never fails the whole load.
pub async fn load_layered(user_root: Option<&Path>, project_root: &Path, subdir: &str) -> Vec<LoadedDefinition> {
    let mut out = Vec::new();

    if let Some(user_root) = user_root {
        collect_root(&user_root.join(subdir), &mut out).await;
    }
    collect_root(&project_root.join(subdir), &mut out).await;

    out
}

async fn collect_root(root: &Path, out: &mut Vec<LoadedDefinition>) {
    if !root.is_dir() {
        debug!(path = %root.display(), "definition root does not exist, skipping");
        return;
    }
    collect_recursive(root, out).await;
}

fn collect_recursive<'a>(
    dir: &'a Path,
    out: &'a mut Vec<LoadedDefinition>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + 'a>> {
    Box::pin(async move {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "failed to read definition directory");
                return;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();

            if path.file_name().is_some_and(|n| n.to_string_lossy().starts_with('.')) {
                continue;
            }

            if path.is_dir() {
                collect_recursive(&path, out).await;
                continue;
            }

            if !path.extension().is_some_and(|ext| ext == "yaml" || ext == "yml") {
                continue;
            }

            match parse_definition_file(&path).await {
                Ok(definition) => {
                    debug!(path = %path.display(), name = %definition.name(), "loaded definition");
                    out.push(LoadedDefinition { source: path, definition });
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load definition, skipping");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn write_file(dir: &Path, name: &str, content: &str) {
        tokio::fs::write(dir.join(name), content).await.unwrap();
    }

    #[tokio::test]
    async fn project_definitions_shadow_user_definitions_by_name() {
        let user_dir = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();
        tokio::fs::create_dir_all(user_dir.path().join("capabilities")).await.unwrap();
        tokio::fs::create_dir_all(project_dir.path().join("capabilities")).await.unwrap();

        let yaml = |description: &str| {
            format!(
                "name: search\ntype: rest\noperations:\n  find:\n    description: {description}\n    requires: [api_search_find]\n    workflow: find_workflow\n"
            )
        };

        write_file(&user_dir.path().join("capabilities"), "search.yaml", &yaml("from user")).await;
        write_file(&project_dir.path().join("capabilities"), "search.yaml", &yaml("from project")).await;

        let loaded = load_layered(Some(user_dir.path()), project_dir.path(), "capabilities").await;
        assert_eq!(loaded.len(), 2);

        let mut by_name = std::collections::HashMap::new();
        for item in loaded {
            by_name.insert(item.definition.name().to_string(), item);
        }
        let winner = &by_name["search"];
        match &winner.definition {
            ParsedDefinition::Capability(def) => {
                assert_eq!(def.operations["find"].description, "from project");
            }
            ParsedDefinition::Service(_) => panic!("expected capability"),
        }
    }

    #[tokio::test]
    async fn missing_root_is_skipped_gracefully() {
        let project_dir = TempDir::new().unwrap();
        let loaded = load_layered(None, project_dir.path(), "capabilities").await;
        assert!(loaded.is_empty());
    }
}
