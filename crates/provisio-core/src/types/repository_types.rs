//! Repository descriptor types

use super::feature_types::Feature;
use serde::{Deserialize, Serialize};

/// A parsed repository descriptor
///
/// ```yaml
/// name: platform
/// version: "4.0.0"
/// repositories:
///   - enterprise.yaml
/// artifact_repositories:
///   - https://repo.example.org/releases
/// features:
///   - name: shell
///     version: "4.0.0"
///     artifacts: [file:bundles/shell.jar]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    /// Repository name
    pub name: String,

    /// Repository version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// URIs of further repositories this one pulls in
    #[serde(default)]
    pub repositories: Vec<String>,

    /// URIs of artifact repositories the loader may consult
    #[serde(default)]
    pub artifact_repositories: Vec<String>,

    /// Features declared by this repository
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl RepositoryDescriptor {
    /// Create an empty descriptor
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            repositories: Vec::new(),
            artifact_repositories: Vec::new(),
            features: Vec::new(),
        }
    }

    /// Add a feature
    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }

    /// Add a referenced repository URI
    pub fn with_repository(mut self, uri: impl Into<String>) -> Self {
        self.repositories.push(uri.into());
        self
    }
}

/// A repository loaded into the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    /// URI the repository was loaded from
    pub uri: String,

    /// Parsed descriptor, with nested repository URIs already resolved
    pub descriptor: RepositoryDescriptor,
}

impl Repository {
    /// Repository name from its descriptor
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Features declared by this repository
    pub fn features(&self) -> &[Feature] {
        &self.descriptor.features
    }

    /// Resolved URIs of referenced repositories
    pub fn repositories(&self) -> &[String] {
        &self.descriptor.repositories
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_yaml_parsing() {
        let yaml = r#"
name: platform
version: "4.0.0"
repositories:
  - enterprise.yaml
artifact_repositories:
  - https://repo.example.org/releases
features:
  - name: shell
    version: "4.0.0"
    artifacts: [file:bundles/shell.jar]
  - name: ssh
    version: "4.0.0"
    dependencies: [shell]
"#;
        let descriptor: RepositoryDescriptor = serde_yaml_ng::from_str(yaml).unwrap();

        assert_eq!(descriptor.name, "platform");
        assert_eq!(descriptor.version.as_deref(), Some("4.0.0"));
        assert_eq!(descriptor.repositories, vec!["enterprise.yaml"]);
        assert_eq!(descriptor.features.len(), 2);
        assert_eq!(descriptor.features[1].dependencies[0].name, "shell");
    }

    #[test]
    fn test_empty_descriptor() {
        let descriptor: RepositoryDescriptor = serde_yaml_ng::from_str("name: empty").unwrap();
        assert!(descriptor.features.is_empty());
        assert!(descriptor.repositories.is_empty());
    }
}
