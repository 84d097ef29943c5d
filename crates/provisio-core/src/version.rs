//! Feature versions and version constraints
//!
//! Feature versions are dotted `major.minor.micro.qualifier` strings. They are
//! parsed leniently: missing numeric parts are zero, a numeric part with a
//! trailing suffix (`0-SNAPSHOT`) moves the suffix into the qualifier, and
//! anything unparseable counts as zero. Version strings are never rejected.
//!
//! Constraints come in four shapes:
//! - the default marker (`"0.0.0"` or empty): highest available version
//! - an exact version, compared by string equality after trimming
//! - an interval range: `[1.0,2.0)`, `(1.0,2.0]`, ...
//! - a semver requirement: `^1.2`, `~1.2.3`, `>=1.0, <2.0`

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Version string that marks "pick the highest available version"
pub const DEFAULT_VERSION: &str = "0.0.0";

/// A parsed feature version used for ordering
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub micro: u64,
    pub qualifier: String,
}

impl Version {
    /// Create a version without qualifier
    pub fn new(major: u64, minor: u64, micro: u64) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    /// Parse a version string leniently
    pub fn parse(input: &str) -> Self {
        let mut version = Version::default();
        let mut parts = input.trim().splitn(4, '.');

        for slot in 0..3 {
            let Some(part) = parts.next() else {
                return version;
            };
            let digits_end = part
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(part.len());
            let number = part[..digits_end].parse::<u64>().unwrap_or(0);
            match slot {
                0 => version.major = number,
                1 => version.minor = number,
                _ => version.micro = number,
            }

            // "0-SNAPSHOT" style suffix ends the numeric part
            let rest = part[digits_end..].trim_start_matches(['-', '_']);
            if digits_end < part.len() {
                version.qualifier = rest.to_string();
                return version;
            }
        }

        if let Some(qualifier) = parts.next() {
            version.qualifier = qualifier.to_string();
        }
        version
    }

    /// Convert to a semver version if the qualifier is a valid pre-release
    pub fn to_semver(&self) -> Option<semver::Version> {
        let mut version = semver::Version::new(self.major, self.minor, self.micro);
        if !self.qualifier.is_empty() {
            version.pre = semver::Prerelease::new(&self.qualifier).ok()?;
        }
        Some(version)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.micro.cmp(&other.micro))
            .then_with(|| self.qualifier.cmp(&other.qualifier))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

/// Interval range over versions, e.g. `[1.0,2.0)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub floor: Version,
    pub floor_inclusive: bool,
    pub ceiling: Version,
    pub ceiling_inclusive: bool,
}

impl VersionRange {
    /// Parse interval notation; returns None for anything else
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let floor_inclusive = match input.chars().next()? {
            '[' => true,
            '(' => false,
            _ => return None,
        };
        let ceiling_inclusive = match input.chars().last()? {
            ']' => true,
            ')' => false,
            _ => return None,
        };
        let inner = &input[1..input.len() - 1];
        let (floor, ceiling) = inner.split_once(',')?;
        if floor.trim().is_empty() || ceiling.trim().is_empty() {
            return None;
        }

        Some(Self {
            floor: Version::parse(floor),
            floor_inclusive,
            ceiling: Version::parse(ceiling),
            ceiling_inclusive,
        })
    }

    /// Check whether a version falls inside the range
    pub fn contains(&self, version: &Version) -> bool {
        let above_floor = if self.floor_inclusive {
            version >= &self.floor
        } else {
            version > &self.floor
        };
        let below_ceiling = if self.ceiling_inclusive {
            version <= &self.ceiling
        } else {
            version < &self.ceiling
        };
        above_floor && below_ceiling
    }
}

/// How a constraint selects among available versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Highest available version
    Default,
    /// Exact version string (already trimmed)
    Exact(String),
    /// Interval range
    Range(VersionRange),
    /// Semver requirement
    Requirement(semver::VersionReq),
}

/// A version constraint as written in a request or dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct VersionConstraint {
    raw: String,
    kind: ConstraintKind,
}

impl VersionConstraint {
    /// The "pick highest available" constraint
    pub fn highest() -> Self {
        Self {
            raw: DEFAULT_VERSION.to_string(),
            kind: ConstraintKind::Default,
        }
    }

    /// Parse a constraint string. Never fails: anything that is not the
    /// default marker or a range is treated as an exact version.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();

        let kind = if trimmed.is_empty() || trimmed == DEFAULT_VERSION {
            ConstraintKind::Default
        } else if let Some(range) = VersionRange::parse(trimmed) {
            ConstraintKind::Range(range)
        } else if looks_like_requirement(trimmed) {
            match semver::VersionReq::parse(trimmed) {
                Ok(req) => ConstraintKind::Requirement(req),
                Err(_) => ConstraintKind::Exact(trimmed.to_string()),
            }
        } else {
            ConstraintKind::Exact(trimmed.to_string())
        };

        Self {
            raw: input.to_string(),
            kind,
        }
    }

    /// How this constraint selects versions
    pub fn kind(&self) -> &ConstraintKind {
        &self.kind
    }

    /// The constraint as originally written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this is the default "highest available" marker
    pub fn is_default(&self) -> bool {
        matches!(self.kind, ConstraintKind::Default)
    }

    /// Check a version string against this constraint
    pub fn matches(&self, version: &str) -> bool {
        match &self.kind {
            ConstraintKind::Default => true,
            ConstraintKind::Exact(exact) => version == exact,
            ConstraintKind::Range(range) => range.contains(&Version::parse(version)),
            ConstraintKind::Requirement(req) => Version::parse(version)
                .to_semver()
                .map(|v| req.matches(&v))
                .unwrap_or(false),
        }
    }
}

fn looks_like_requirement(input: &str) -> bool {
    input.starts_with(['^', '~', '<', '>', '=', '*'])
}

impl Default for VersionConstraint {
    fn default() -> Self {
        Self::highest()
    }
}

impl From<&str> for VersionConstraint {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<String> for VersionConstraint {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<VersionConstraint> for String {
    fn from(value: VersionConstraint) -> Self {
        value.raw
    }
}

impl From<Option<&str>> for VersionConstraint {
    fn from(value: Option<&str>) -> Self {
        value.map(Self::parse).unwrap_or_default()
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
