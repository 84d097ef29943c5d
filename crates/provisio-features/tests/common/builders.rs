//! Feature builders for creating test fixtures

#![allow(dead_code)]

use provisio_core::types::{ArtifactRef, Dependency, Feature, FeatureIndex, InstallMode};

/// Builder for creating Feature test fixtures
pub struct FeatureBuilder {
    feature: Feature,
}

impl FeatureBuilder {
    /// Feature at version 1.0.0 with no artifacts or dependencies
    pub fn new(name: &str) -> Self {
        Self {
            feature: Feature::new(name, "1.0.0"),
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.feature.version = version.to_string();
        self
    }

    /// Add an artifact locator
    pub fn artifact(mut self, locator: &str) -> Self {
        self.feature.artifacts.push(ArtifactRef::new(locator));
        self
    }

    /// Add a required dependency on any version
    pub fn depends_on(mut self, name: &str) -> Self {
        self.feature.dependencies.push(Dependency::new(name));
        self
    }

    /// Add a required dependency with a version constraint
    pub fn depends_on_version(mut self, name: &str, version: &str) -> Self {
        self.feature
            .dependencies
            .push(Dependency::new(name).with_version(version));
        self
    }

    /// Add an optional dependency
    pub fn optionally_depends_on(mut self, name: &str) -> Self {
        self.feature
            .dependencies
            .push(Dependency::new(name).optional());
        self
    }

    /// Flag the feature for boot-time installation
    pub fn auto(mut self) -> Self {
        self.feature.install = InstallMode::Auto;
        self
    }

    pub fn build(self) -> Feature {
        self.feature
    }
}

/// Build an index from builders
pub fn index_of(builders: Vec<FeatureBuilder>) -> FeatureIndex {
    FeatureIndex::from_features(builders.into_iter().map(FeatureBuilder::build))
}

/// Diamond: A -> {B, C}, B -> D, C -> D; each feature ships `<name>.jar`
pub fn diamond_index() -> FeatureIndex {
    index_of(vec![
        FeatureBuilder::new("A")
            .depends_on("B")
            .depends_on("C")
            .artifact("A.jar"),
        FeatureBuilder::new("B").depends_on("D").artifact("B.jar"),
        FeatureBuilder::new("C").depends_on("D").artifact("C.jar"),
        FeatureBuilder::new("D").artifact("D.jar"),
    ])
}
