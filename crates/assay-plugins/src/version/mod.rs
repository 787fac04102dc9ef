//! Engine release versions and the signature compatibility gate.
//!
//! Signatures may declare the oldest (`minimum`) and newest (`maximum`)
//! engine release they support. Before a signature runs, [`VersionRange`]
//! compares those bounds with the running engine's release and yields a
//! [`GateDecision`]. Comparison is numeric on `major.minor.patch`; any text
//! after the first `-` or `+` is ignored, as is a trailing `aN` or `bN`
//! pre-release tag. A bound that fails to parse skips
//! the signature instead of failing the run.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Release of the running engine, consumed only by the version gate.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors raised when a version string is not `MAJOR.MINOR[.PATCH]`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    /// The release part of the string was empty.
    #[error("version '{input}' is empty")]
    Empty {
        /// Original input.
        input: String,
    },
    /// The release part did not have two or three components.
    #[error("version '{input}' must have two or three components, found {count}")]
    ComponentCount {
        /// Original input.
        input: String,
        /// Number of dot-separated components found.
        count: usize,
    },
    /// A component was not a plain decimal number.
    #[error("version '{input}' has a non-numeric component '{component}'")]
    InvalidComponent {
        /// Original input.
        input: String,
        /// Offending component.
        component: String,
    },
}

/// Structured `major.minor.patch` release number.
///
/// Ordering compares major, then minor, then patch numerically.
///
/// # Example
///
/// ```
/// use assay_plugins::EngineVersion;
///
/// let release = EngineVersion::parse("1.2-rc1").expect("valid version");
/// assert_eq!(release, EngineVersion::new(1, 2, 0));
/// assert!(EngineVersion::new(0, 10, 0) > EngineVersion::new(0, 9, 9));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EngineVersion {
    major: u64,
    minor: u64,
    patch: u64,
}

impl EngineVersion {
    /// Creates a version from its components.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses `MAJOR.MINOR` or `MAJOR.MINOR.PATCH`, discarding any suffix
    /// that starts at the first `-` or `+` and a trailing `aN`/`bN` tag.
    ///
    /// # Errors
    ///
    /// Returns a [`VersionParseError`] when the release part is empty, has
    /// the wrong number of components, or contains a non-numeric component.
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let release = input
            .split(['-', '+'])
            .next()
            .unwrap_or_default();
        if release.is_empty() {
            return Err(VersionParseError::Empty {
                input: input.to_owned(),
            });
        }

        let components = strip_prerelease_tag(release)
            .split('.')
            .map(|component| parse_component(input, component))
            .collect::<Result<Vec<_>, _>>()?;

        match components.as_slice() {
            [major, minor] => Ok(Self::new(*major, *minor, 0)),
            [major, minor, patch] => Ok(Self::new(*major, *minor, *patch)),
            other => Err(VersionParseError::ComponentCount {
                input: input.to_owned(),
                count: other.len(),
            }),
        }
    }

    /// Parses [`ENGINE_VERSION`].
    ///
    /// # Errors
    ///
    /// Returns a [`VersionParseError`] if the package version is malformed.
    pub fn current() -> Result<Self, VersionParseError> {
        Self::parse(ENGINE_VERSION)
    }

    /// Major component.
    #[must_use]
    pub const fn major(self) -> u64 {
        self.major
    }

    /// Minor component.
    #[must_use]
    pub const fn minor(self) -> u64 {
        self.minor
    }

    /// Patch component.
    #[must_use]
    pub const fn patch(self) -> u64 {
        self.patch
    }
}

/// Drops a trailing `aN` or `bN` pre-release tag (`1.0a1`, `1.2.0b3`).
fn strip_prerelease_tag(release: &str) -> &str {
    let Some(index) = release.rfind(['a', 'b']) else {
        return release;
    };
    let (head, tag) = release.split_at(index);
    let number = tag.get(1..).unwrap_or_default();
    let tagged = !number.is_empty()
        && number.bytes().all(|byte| byte.is_ascii_digit())
        && head.ends_with(|character: char| character.is_ascii_digit());
    if tagged { head } else { release }
}

fn parse_component(input: &str, component: &str) -> Result<u64, VersionParseError> {
    let invalid = || VersionParseError::InvalidComponent {
        input: input.to_owned(),
        component: component.to_owned(),
    };
    if component.is_empty() || !component.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(invalid());
    }
    component.parse().map_err(|_| invalid())
}

impl FromStr for EngineVersion {
    type Err = VersionParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Which version string failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionBound {
    /// The running engine's release.
    Engine,
    /// The signature's declared minimum.
    Minimum,
    /// The signature's declared maximum.
    Maximum,
}

impl VersionBound {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Engine => "engine",
            Self::Minimum => "minimum",
            Self::Maximum => "maximum",
        }
    }
}

impl fmt::Display for VersionBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of checking a signature's range against the engine release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The signature may run.
    Compatible,
    /// The engine is older than the declared minimum.
    TooOld {
        /// Parsed minimum.
        minimum: EngineVersion,
    },
    /// The engine is newer than the declared maximum.
    TooNew {
        /// Parsed maximum.
        maximum: EngineVersion,
    },
    /// A version involved in the comparison could not be parsed.
    Malformed {
        /// Which version was malformed.
        bound: VersionBound,
        /// Parse failure.
        error: VersionParseError,
    },
}

impl GateDecision {
    /// Returns `true` when the signature may run.
    #[must_use]
    pub const fn is_compatible(&self) -> bool {
        matches!(self, Self::Compatible)
    }
}

/// Engine releases a signature declares itself compatible with.
///
/// Empty bounds are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionRange {
    minimum: Option<String>,
    maximum: Option<String>,
}

impl VersionRange {
    /// Creates a range from optional bounds.
    #[must_use]
    pub fn new(minimum: Option<String>, maximum: Option<String>) -> Self {
        Self {
            minimum: minimum.filter(|bound| !bound.is_empty()),
            maximum: maximum.filter(|bound| !bound.is_empty()),
        }
    }

    /// Returns `true` when neither bound is declared.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.minimum.is_none() && self.maximum.is_none()
    }

    /// Checks `engine` against the declared bounds.
    ///
    /// The engine release is only parsed when a bound is declared, so an
    /// unbounded signature runs regardless of the engine's version string.
    #[must_use]
    pub fn check(&self, engine: &str) -> GateDecision {
        if self.is_unbounded() {
            return GateDecision::Compatible;
        }

        let running = match EngineVersion::parse(engine) {
            Ok(version) => version,
            Err(error) => {
                return GateDecision::Malformed {
                    bound: VersionBound::Engine,
                    error,
                };
            }
        };

        if let Some(decision) = self.check_bound(running, VersionBound::Minimum) {
            return decision;
        }
        if let Some(decision) = self.check_bound(running, VersionBound::Maximum) {
            return decision;
        }
        GateDecision::Compatible
    }

    fn check_bound(&self, engine: EngineVersion, bound: VersionBound) -> Option<GateDecision> {
        let (declared, rejected) = match bound {
            VersionBound::Minimum => (self.minimum.as_deref()?, Ordering::Less),
            VersionBound::Maximum => (self.maximum.as_deref()?, Ordering::Greater),
            VersionBound::Engine => return None,
        };

        let limit = match EngineVersion::parse(declared) {
            Ok(limit) => limit,
            Err(error) => return Some(GateDecision::Malformed { bound, error }),
        };

        if engine.cmp(&limit) != rejected {
            return None;
        }
        Some(match bound {
            VersionBound::Maximum => GateDecision::TooNew { maximum: limit },
            _ => GateDecision::TooOld { minimum: limit },
        })
    }
}
