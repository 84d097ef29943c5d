//! Dependency resolution using DFS post-order over the feature index

use provisio_core::types::{ArtifactRef, Dependency, Feature, FeatureId, FeatureIndex};
use provisio_core::{Error, Result, VersionConstraint};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// A top-level request: feature name plus version constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRequest {
    pub name: String,
    pub version: VersionConstraint,
}

impl FeatureRequest {
    /// Request the highest available version
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: VersionConstraint::highest(),
        }
    }

    /// Set the version constraint
    pub fn with_version(mut self, version: impl Into<VersionConstraint>) -> Self {
        self.version = version.into();
        self
    }
}

/// Optional dependency edge that could not be resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedDependency {
    /// Feature declaring the edge
    pub required_by: FeatureId,

    /// The dropped edge
    pub dependency: Dependency,
}

/// Result of one resolution pass
#[derive(Debug, Clone, Default)]
pub struct ResolutionPlan {
    /// Features to install, dependencies first
    pub install_order: Vec<Arc<Feature>>,

    /// Artifacts of `install_order`, deduplicated by locator, start levels resolved
    pub artifacts: Vec<ArtifactRef>,

    /// Features reached but already installed
    pub skipped: Vec<FeatureId>,

    /// Optional edges dropped because nothing matched
    pub dropped: Vec<DroppedDependency>,
}

impl ResolutionPlan {
    /// Whether the plan installs nothing
    pub fn is_empty(&self) -> bool {
        self.install_order.is_empty()
    }

    /// Identities of the features to install, in order
    pub fn feature_ids(&self) -> Vec<FeatureId> {
        self.install_order.iter().map(|f| f.id()).collect()
    }
}

/// Resolves requests into a dependency-first install plan
pub struct DependencyResolver<'a> {
    index: &'a FeatureIndex,
    installed: HashSet<FeatureId>,
}

impl<'a> DependencyResolver<'a> {
    /// Create a resolver over a feature index
    pub fn new(index: &'a FeatureIndex) -> Self {
        Self {
            index,
            installed: HashSet::new(),
        }
    }

    /// Features to treat as already installed
    pub fn with_installed(mut self, installed: impl IntoIterator<Item = FeatureId>) -> Self {
        self.installed = installed.into_iter().collect();
        self
    }

    /// Resolve requests into one plan
    ///
    /// A feature reachable over several paths appears once. Cycles end at
    /// the first revisit and are not reported.
    pub fn resolve(&self, requests: &[FeatureRequest]) -> Result<ResolutionPlan> {
        let mut plan = ResolutionPlan::default();
        let mut visited = HashSet::new();

        for request in requests {
            let feature = self
                .index
                .select(&request.name, &request.version)
                .ok_or_else(|| {
                    Error::unsatisfiable(&request.name, request.version.as_str(), None)
                })?;
            self.visit(feature, &mut plan, &mut visited)?;
        }

        let mut locators = HashSet::new();
        for feature in &plan.install_order {
            for artifact in &feature.artifacts {
                if locators.insert(artifact.locator.clone()) {
                    plan.artifacts.push(ArtifactRef {
                        locator: artifact.locator.clone(),
                        start_level: feature.start_level_for(artifact),
                    });
                }
            }
        }

        debug!(
            "Resolved {} features ({} artifacts), {} skipped, {} dropped",
            plan.install_order.len(),
            plan.artifacts.len(),
            plan.skipped.len(),
            plan.dropped.len()
        );
        Ok(plan)
    }

    fn visit(
        &self,
        feature: Arc<Feature>,
        plan: &mut ResolutionPlan,
        visited: &mut HashSet<FeatureId>,
    ) -> Result<()> {
        let id = feature.id();

        // Marked before descending so cycles terminate
        if !visited.insert(id.clone()) {
            return Ok(());
        }

        for dependency in &feature.dependencies {
            match self.index.select(&dependency.name, &dependency.version) {
                Some(resolved) => self.visit(resolved, plan, visited)?,
                None if dependency.optional => {
                    debug!(
                        "Dropping optional dependency {} {} of {}",
                        dependency.name, dependency.version, id
                    );
                    plan.dropped.push(DroppedDependency {
                        required_by: id.clone(),
                        dependency: dependency.clone(),
                    });
                }
                None => {
                    return Err(Error::unsatisfiable(
                        &dependency.name,
                        dependency.version.as_str(),
                        Some(id.to_string()),
                    ));
                }
            }
        }

        if self.installed.contains(&id) {
            plan.skipped.push(id);
        } else {
            plan.install_order.push(feature);
        }
        Ok(())
    }
}
