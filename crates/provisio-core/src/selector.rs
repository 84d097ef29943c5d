//! Version-aware feature selection

use crate::types::{Feature, FeatureIndex};
use crate::version::{ConstraintKind, VersionConstraint};
use std::sync::Arc;

/// Pick the feature matching `name` and `constraint`
///
/// - Default marker: numerically highest version under `name`
/// - Exact: trimmed constraint compared by string equality; first match wins
/// - Range / requirement: highest matching version
///
/// Returns `None` when the name is unknown or nothing matches.
pub fn select(
    index: &FeatureIndex,
    name: &str,
    constraint: &VersionConstraint,
) -> Option<Arc<Feature>> {
    let versions = index.versions(name)?;

    match constraint.kind() {
        ConstraintKind::Default => highest(versions.values()),
        ConstraintKind::Exact(exact) => versions
            .values()
            .find(|feature| feature.version == *exact)
            .cloned(),
        ConstraintKind::Range(_) | ConstraintKind::Requirement(_) => highest(
            versions
                .values()
                .filter(|feature| constraint.matches(&feature.version)),
        ),
    }
}

fn highest<'a>(features: impl Iterator<Item = &'a Arc<Feature>>) -> Option<Arc<Feature>> {
    features.max_by_key(|f| f.parsed_version()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(entries: &[(&str, &str)]) -> FeatureIndex {
        FeatureIndex::from_features(entries.iter().map(|(n, v)| Feature::new(*n, *v)))
    }

    #[test]
    fn test_default_picks_highest() {
        let index = index(&[("transaction", "1.0.0"), ("transaction", "2.0.0")]);
        let feature = select(&index, "transaction", &VersionConstraint::highest()).unwrap();
        assert_eq!(feature.version, "2.0.0");
    }

    #[test]
    fn test_default_single_version() {
        let index = index(&[("transaction", "1.0.0")]);
        let feature = select(&index, "transaction", &VersionConstraint::parse("0.0.0")).unwrap();
        assert_eq!(feature.version, "1.0.0");
    }

    #[test]
    fn test_highest_is_numeric() {
        let index = index(&[("x", "1.9.0"), ("x", "1.10.0"), ("x", "1.2.0")]);
        let feature = select(&index, "x", &VersionConstraint::highest()).unwrap();
        assert_eq!(feature.version, "1.10.0");
    }

    #[test]
    fn test_exact_strips_whitespace() {
        let index = index(&[("transaction", "1.0.0"), ("transaction", "2.0.0")]);
        let feature = select(&index, "transaction", &VersionConstraint::parse("  1.0.0  ")).unwrap();
        assert_eq!(feature.version, "1.0.0");
    }

    #[test]
    fn test_exact_is_not_fuzzy() {
        let index = index(&[("transaction", "1.0.0"), ("transaction", "2.0.0")]);
        assert!(select(&index, "transaction", &VersionConstraint::parse("1.2")).is_none());
        assert!(select(&index, "transaction", &VersionConstraint::parse("1.0")).is_none());
    }

    #[test]
    fn test_unknown_name() {
        let index = index(&[("transaction", "1.0.0")]);
        assert!(select(&index, "activemq", &VersionConstraint::highest()).is_none());
        assert!(select(&index, "activemq", &VersionConstraint::parse("1.0.0")).is_none());
    }

    #[test]
    fn test_range_picks_highest_inside() {
        let index = index(&[("x", "1.0.0"), ("x", "1.5.0"), ("x", "2.0.0")]);
        let feature = select(&index, "x", &VersionConstraint::parse("[1.0,2.0)")).unwrap();
        assert_eq!(feature.version, "1.5.0");

        assert!(select(&index, "x", &VersionConstraint::parse("[3.0,4.0)")).is_none());
    }

    #[test]
    fn test_requirement_picks_highest_match() {
        let index = index(&[("x", "1.0.0"), ("x", "1.5.0"), ("x", "2.0.0")]);
        let feature = select(&index, "x", &VersionConstraint::parse("^1")).unwrap();
        assert_eq!(feature.version, "1.5.0");
    }
}
