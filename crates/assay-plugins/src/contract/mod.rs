//! Capability contracts implemented by plugin units.
//!
//! Two contracts exist. A [`Processing`] unit extracts one facet of a
//! completed analysis into a named result. A [`Signature`] unit inspects the
//! aggregated results and reports whether a known behaviour is present,
//! carrying descriptive [`SignatureMetadata`].
//!
//! Units are constructed fresh for every pipeline run and dropped once their
//! entry point returns; they are never shared between runs.

use std::fmt;

use assay_config::ModuleConfig;
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;

use crate::document::ResultDocument;
use crate::error::UnitError;
use crate::version::VersionRange;

/// Directory produced by a prior sandboxed execution.
///
/// The target is read-only for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnalysisTarget {
    path: Utf8PathBuf,
}

impl AnalysisTarget {
    /// Wraps the root of a completed artefact collection.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Root directory of the analysis.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        self.path.as_path()
    }

    /// Resolves `relative` under the analysis root.
    #[must_use]
    pub fn join(&self, relative: impl AsRef<Utf8Path>) -> Utf8PathBuf {
        self.path.join(relative)
    }
}

impl fmt::Display for AnalysisTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path.as_str())
    }
}

/// A plugin that extracts one named result from an analysis target.
///
/// The runner calls [`bind`](Self::bind), then
/// [`configure`](Self::configure) with the configuration resolved from
/// [`conf_path`](Self::conf_path), and finally [`run`](Self::run). The value
/// returned by `run` is stored under [`key`](Self::key) in the result
/// document.
pub trait Processing: Send {
    /// Slot in the result document that receives this unit's output.
    fn key(&self) -> &str;

    /// Location of the unit's configuration; empty when it has none.
    fn conf_path(&self) -> &str {
        ""
    }

    /// Binds the unit to the analysis it will process.
    fn bind(&mut self, target: &AnalysisTarget);

    /// Injects the unit's loaded configuration.
    fn configure(&mut self, config: ModuleConfig);

    /// Extracts the unit's result.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError::NotImplemented`] for incomplete units,
    /// [`UnitError::Processing`] for recognised extraction failures, or any
    /// other variant for unexpected failures.
    fn run(&mut self) -> Result<Value, UnitError>;
}

/// A plugin that flags a known behaviour in the aggregated results.
pub trait Signature: Send {
    /// Declared metadata, read again after a positive match so that updates
    /// made during [`run`](Self::run) are captured.
    fn metadata(&self) -> &SignatureMetadata;

    /// Evaluates the signature against a private copy of the results.
    ///
    /// The copy belongs to this unit alone; mutating it has no effect on the
    /// pipeline or on other signatures.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError::NotImplemented`] for incomplete units or any other
    /// variant when evaluation fails. Failures count as "no match".
    fn run(&mut self, results: ResultDocument) -> Result<bool, UnitError>;
}

/// Descriptive attributes declared by a signature.
///
/// # Example
///
/// ```
/// use assay_plugins::SignatureMetadata;
///
/// let metadata = SignatureMetadata::new("creates_exe")
///     .with_description("Creates a Windows executable on the filesystem")
///     .with_severity(2)
///     .with_minimum("0.1");
/// assert!(metadata.enabled);
/// assert_eq!(metadata.minimum.as_deref(), Some("0.1"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureMetadata {
    /// Short identifier of the signature.
    pub name: String,
    /// Human-readable description of the behaviour.
    pub description: String,
    /// Ordinal severity; matches are listed from lowest to highest.
    pub severity: u32,
    /// External references describing the behaviour.
    pub references: Vec<String>,
    /// Evidence collected while matching.
    pub data: Vec<Value>,
    /// Whether a match should raise an alert downstream.
    pub alert: bool,
    /// Disabled signatures are skipped before any other check.
    pub enabled: bool,
    /// Oldest engine release the signature supports.
    pub minimum: Option<String>,
    /// Newest engine release the signature supports.
    pub maximum: Option<String>,
}

impl SignatureMetadata {
    /// Creates enabled metadata with severity 1 and no version bounds.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            severity: 1,
            references: Vec::new(),
            data: Vec::new(),
            alert: false,
            enabled: true,
            minimum: None,
            maximum: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the severity.
    #[must_use]
    pub const fn with_severity(mut self, severity: u32) -> Self {
        self.severity = severity;
        self
    }

    /// Adds a reference.
    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.references.push(reference.into());
        self
    }

    /// Marks matches as alert-worthy.
    #[must_use]
    pub const fn with_alert(mut self, alert: bool) -> Self {
        self.alert = alert;
        self
    }

    /// Enables or disables the signature.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Declares the oldest compatible engine release.
    #[must_use]
    pub fn with_minimum(mut self, minimum: impl Into<String>) -> Self {
        self.minimum = Some(minimum.into());
        self
    }

    /// Declares the newest compatible engine release.
    #[must_use]
    pub fn with_maximum(mut self, maximum: impl Into<String>) -> Self {
        self.maximum = Some(maximum.into());
        self
    }

    /// Declared engine compatibility range.
    #[must_use]
    pub fn version_range(&self) -> VersionRange {
        VersionRange::new(self.minimum.clone(), self.maximum.clone())
    }
}
