//! Parsing and classification of capability/service-capability YAML files.

use std::path::Path;

use super::definition::CapabilityDefinition;
use super::service_definition::ServiceCapabilityDefinition;
use crate::{Error, Result};

/// The outcome of parsing a single definition file.
#[derive(Debug, Clone)]
pub enum ParsedDefinition {
    /// A plain capability definition.
    Capability(CapabilityDefinition),
    /// A service capability definition.
    Service(ServiceCapabilityDefinition),
}

impl ParsedDefinition {
    /// The definition's name, regardless of kind.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Capability(def) => &def.name,
            Self::Service(def) => &def.capability.name,
        }
    }
}

/// A file is a service-capability definition if its name is prefixed
/// `service_` or it lives under a path segment containing `service` or
/// `examples`.
#[must_use]
pub fn is_service_capability_path(path: &Path) -> bool {
    let file_is_prefixed = path
        .file_stem()
        .map(|s| s.to_string_lossy().starts_with("service_"))
        .unwrap_or(false);

    let dir_hints = path.ancestors().skip(1).any(|ancestor| {
        ancestor
            .file_name()
            .map(|name| {
                let name = name.to_string_lossy().to_lowercase();
                name.contains("service") || name.contains("examples")
            })
            .unwrap_or(false)
    });

    file_is_prefixed || dir_hints
}

/// Parse YAML `content` as either a capability or service capability,
/// classified by `path`.
pub fn parse_definition(path: &Path, content: &str) -> Result<ParsedDefinition> {
    if is_service_capability_path(path) {
        let def: ServiceCapabilityDefinition = serde_yaml::from_str(content)?;
        Ok(ParsedDefinition::Service(def))
    } else {
        let def: CapabilityDefinition = serde_yaml::from_str(content)?;
        Ok(ParsedDefinition::Capability(def))
    }
}

/// Parse a single definition file from disk.
pub async fn parse_definition_file(path: &Path) -> Result<ParsedDefinition> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
    parse_definition(path, &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn classifies_by_filename_prefix() {
        assert!(is_service_capability_path(&PathBuf::from("capabilities/service_redis.yaml")));
        assert!(!is_service_capability_path(&PathBuf::from("capabilities/redis.yaml")));
    }

    #[test]
    fn classifies_by_directory_hint() {
        assert!(is_service_capability_path(&PathBuf::from("capabilities/service_capabilities/redis.yaml")));
        assert!(is_service_capability_path(&PathBuf::from("capabilities/examples/redis.yaml")));
    }

    #[test]
    fn parses_plain_capability() {
        let yaml = r"
name: search
type: rest
operations:
  find:
    description: finds things
    requires: [api_search_find]
    workflow: find_workflow
";
        let parsed = parse_definition(&PathBuf::from("search.yaml"), yaml).unwrap();
        assert_eq!(parsed.name(), "search");
        assert!(matches!(parsed, ParsedDefinition::Capability(_)));
    }
}
