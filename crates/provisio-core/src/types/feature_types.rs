//! Feature type definitions matching the repository descriptor format

use crate::version::{Version, VersionConstraint, DEFAULT_VERSION};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Feature definition from a repository descriptor
///
/// ```yaml
/// name: ssh
/// version: "1.0.0"
/// dependencies:
///   - shell
///   - name: jaas
///     version: "[1.0,2.0)"
///     optional: true
/// artifacts:
///   - file:bundles/sshd.jar
///   - locator: file:bundles/ssh-commands.jar
///     start_level: 30
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    /// Feature name
    pub name: String,

    /// Feature version; absent means the default marker
    #[serde(default = "default_version")]
    pub version: String,

    /// Short description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Dependencies on other features, in declaration order
    #[serde(default)]
    pub dependencies: Vec<Dependency>,

    /// Artifacts to install, in declaration order
    #[serde(default)]
    pub artifacts: Vec<ArtifactRef>,

    /// Default start level for artifacts without one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_level: Option<u32>,

    /// Whether the feature is installed automatically at boot
    #[serde(default)]
    pub install: InstallMode,
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

impl Feature {
    /// Create an empty feature
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            dependencies: Vec::new(),
            artifacts: Vec::new(),
            start_level: None,
            install: InstallMode::Manual,
        }
    }

    /// Identity of this feature
    pub fn id(&self) -> FeatureId {
        FeatureId::new(&self.name, &self.version)
    }

    /// Parsed version for ordering
    pub fn parsed_version(&self) -> Version {
        Version::parse(&self.version)
    }

    /// Start level to use for an artifact of this feature
    pub fn start_level_for(&self, artifact: &ArtifactRef) -> Option<u32> {
        artifact.start_level.or(self.start_level)
    }
}

/// Installation mode for boot handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMode {
    /// Installed only when requested
    #[default]
    Manual,
    /// Installed by the boot installer
    Auto,
}

/// Reference from a feature to another feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawDependency")]
pub struct Dependency {
    /// Name of the required feature
    pub name: String,

    /// Version constraint on the required feature
    #[serde(default)]
    pub version: VersionConstraint,

    /// Optional edges are dropped when unresolvable
    #[serde(default)]
    pub optional: bool,
}

impl Dependency {
    /// Required dependency on any version
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: VersionConstraint::highest(),
            optional: false,
        }
    }

    /// Set the version constraint
    pub fn with_version(mut self, version: impl Into<VersionConstraint>) -> Self {
        self.version = version.into();
        self
    }

    /// Mark the edge optional
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDependency {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        version: VersionConstraint,
        #[serde(default)]
        optional: bool,
    },
}

impl From<RawDependency> for Dependency {
    fn from(raw: RawDependency) -> Self {
        match raw {
            RawDependency::Name(name) => Dependency::new(name),
            RawDependency::Detailed {
                name,
                version,
                optional,
            } => Dependency {
                name,
                version,
                optional,
            },
        }
    }
}

/// An installable artifact referenced by locator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawArtifact")]
pub struct ArtifactRef {
    /// Locator string handed to the artifact loader
    pub locator: String,

    /// Optional start level hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_level: Option<u32>,
}

impl ArtifactRef {
    /// Create an artifact reference without start level
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            start_level: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawArtifact {
    Locator(String),
    Detailed {
        locator: String,
        #[serde(default)]
        start_level: Option<u32>,
    },
}

impl From<RawArtifact> for ArtifactRef {
    fn from(raw: RawArtifact) -> Self {
        match raw {
            RawArtifact::Locator(locator) => ArtifactRef::new(locator),
            RawArtifact::Detailed {
                locator,
                start_level,
            } => ArtifactRef {
                locator,
                start_level,
            },
        }
    }
}

/// Identity of a feature: `(name, version)`
///
/// Rendered and persisted as `name/version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct FeatureId {
    pub name: String,
    pub version: String,
}

impl FeatureId {
    /// Create a feature identity
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

impl FromStr for FeatureId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('/') {
            Some((name, version)) if !name.is_empty() && !version.is_empty() => {
                Ok(FeatureId::new(name, version))
            }
            _ => Err(crate::Error::invalid_version(s)),
        }
    }
}

impl TryFrom<String> for FeatureId {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FeatureId> for String {
    fn from(value: FeatureId) -> Self {
        value.to_string()
    }
}

/// Precomputed feature map: name -> version -> feature
///
/// This is the value the catalog derives from its repositories, and the
/// value tests inject directly to exercise resolution without a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureIndex {
    features: BTreeMap<String, BTreeMap<String, Arc<Feature>>>,
}

impl FeatureIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from feature definitions; the first definition of a
    /// given `(name, version)` wins
    pub fn from_features(features: impl IntoIterator<Item = Feature>) -> Self {
        let mut index = Self::new();
        for feature in features {
            index.insert(feature);
        }
        index
    }

    /// Insert a feature; returns false if the identity was already present
    pub fn insert(&mut self, feature: Feature) -> bool {
        self.insert_shared(Arc::new(feature))
    }

    /// Insert a shared feature; returns false if the identity was already present
    pub fn insert_shared(&mut self, feature: Arc<Feature>) -> bool {
        let versions = self.features.entry(feature.name.clone()).or_default();
        if versions.contains_key(&feature.version) {
            return false;
        }
        versions.insert(feature.version.clone(), feature);
        true
    }

    /// All versions known for a name
    pub fn versions(&self, name: &str) -> Option<&BTreeMap<String, Arc<Feature>>> {
        self.features.get(name)
    }

    /// Look up an exact identity
    pub fn get(&self, id: &FeatureId) -> Option<&Arc<Feature>> {
        self.features.get(&id.name)?.get(&id.version)
    }

    /// Iterate all features, by name then version string
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Feature>> {
        self.features.values().flat_map(|versions| versions.values())
    }

    /// Feature names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(|s| s.as_str())
    }

    /// The nested map: name -> version -> feature
    pub fn as_map(&self) -> &BTreeMap<String, BTreeMap<String, Arc<Feature>>> {
        &self.features
    }

    /// Number of feature definitions
    pub fn len(&self) -> usize {
        self.features.values().map(|v| v.len()).sum()
    }

    /// Whether the index holds no features
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Select a feature by name and version constraint
    pub fn select(&self, name: &str, constraint: &VersionConstraint) -> Option<Arc<Feature>> {
        crate::selector::select(self, name, constraint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_yaml_parsing() {
        let yaml = r#"
name: ssh
version: "1.0.0"
dependencies:
  - shell
  - name: jaas
    version: "[1.0,2.0)"
    optional: true
artifacts:
  - file:bundles/sshd.jar
  - locator: file:bundles/ssh-commands.jar
    start_level: 30
install: auto
"#;
        let feature: Feature = serde_yaml_ng::from_str(yaml).unwrap();

        assert_eq!(feature.id(), FeatureId::new("ssh", "1.0.0"));
        assert_eq!(feature.dependencies.len(), 2);
        assert_eq!(feature.dependencies[0], Dependency::new("shell"));
        assert!(feature.dependencies[1].optional);
        assert_eq!(feature.dependencies[1].version.as_str(), "[1.0,2.0)");
        assert_eq!(feature.artifacts[0], ArtifactRef::new("file:bundles/sshd.jar"));
        assert_eq!(feature.artifacts[1].start_level, Some(30));
        assert_eq!(feature.install, InstallMode::Auto);
    }

    #[test]
    fn test_missing_version_is_default_marker() {
        let feature: Feature = serde_yaml_ng::from_str("name: bare").unwrap();
        assert_eq!(feature.version, DEFAULT_VERSION);
        assert_eq!(feature.install, InstallMode::Manual);
    }

    #[test]
    fn test_start_level_fallback() {
        let mut feature = Feature::new("f", "1.0.0");
        feature.start_level = Some(50);
        let plain = ArtifactRef::new("a");
        let pinned = ArtifactRef {
            locator: "b".to_string(),
            start_level: Some(10),
        };
        assert_eq!(feature.start_level_for(&plain), Some(50));
        assert_eq!(feature.start_level_for(&pinned), Some(10));
    }

    #[test]
    fn test_feature_id_parse() {
        let id: FeatureId = "ssh/1.0.0".parse().unwrap();
        assert_eq!(id, FeatureId::new("ssh", "1.0.0"));
        assert_eq!(id.to_string(), "ssh/1.0.0");

        assert!("ssh".parse::<FeatureId>().is_err());
        assert!("/1.0".parse::<FeatureId>().is_err());
    }

    #[test]
    fn test_index_first_definition_wins() {
        let mut first = Feature::new("a", "1.0.0");
        first.description = Some("first".to_string());
        let mut second = Feature::new("a", "1.0.0");
        second.description = Some("second".to_string());

        let mut index = FeatureIndex::new();
        assert!(index.insert(first));
        assert!(!index.insert(second));
        assert_eq!(index.len(), 1);
        assert_eq!(
            index
                .get(&FeatureId::new("a", "1.0.0"))
                .and_then(|f| f.description.clone()),
            Some("first".to_string())
        );
    }
}
