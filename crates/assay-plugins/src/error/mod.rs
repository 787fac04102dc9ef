//! Domain errors raised by plugin discovery and unit execution.
//!
//! All errors use `thiserror`-derived enums with structured context so callers
//! can inspect the failure programmatically. Sources that are not `Clone` are
//! wrapped in `Arc` so a single failure can be logged and retained.
//!
//! [`UnitError`] never escapes a unit boundary: the runner classifies it with
//! [`UnitError::log_level`], logs it, and carries on with the next unit. Only
//! [`DiscoveryError::UnknownNamespace`] can abort a pipeline run.

use std::any::Any;
use std::error::Error as StdError;
use std::sync::Arc;

use assay_config::ModuleConfigError;
use thiserror::Error;
use tracing::Level;

use crate::registry::Capability;

/// Failure reported by (or on behalf of) a single processing or signature
/// unit.
#[derive(Debug, Clone, Error)]
pub enum UnitError {
    /// The unit declares itself incomplete; it is skipped quietly.
    #[error("unit is not implemented")]
    NotImplemented,

    /// A processing unit reported a recognised extraction failure.
    #[error("{message}")]
    Processing {
        /// Human-readable failure description.
        message: String,
    },

    /// Any other failure raised by the unit.
    #[error("{message}")]
    Unexpected {
        /// Human-readable failure description.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Arc<dyn StdError + Send + Sync>>,
    },

    /// The unit panicked; the panic was contained at the unit boundary.
    #[error("unit panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
    },

    /// The unit did not finish within the configured timeout.
    #[error("unit timed out after {timeout_secs}s")]
    TimedOut {
        /// Configured timeout in seconds.
        timeout_secs: u64,
    },

    /// The unit's configuration could not be loaded.
    #[error("failed to load configuration '{conf_path}': {source}")]
    Configuration {
        /// Declared configuration path.
        conf_path: String,
        /// Underlying configuration error.
        #[source]
        source: ModuleConfigError,
    },
}

impl UnitError {
    /// Builds a declared processing error.
    #[must_use]
    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing {
            message: message.into(),
        }
    }

    /// Builds an unexpected error without an underlying source.
    #[must_use]
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an arbitrary error as an unexpected failure.
    #[must_use]
    pub fn from_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Unexpected {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Builds a panic report from a caught panic payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::Panicked {
            message: panic_message(payload),
        }
    }

    /// Log level used when this failure is reported for a unit of the given
    /// capability.
    ///
    /// Incomplete units are reported at `DEBUG`, declared processing errors at
    /// `WARN`, and everything else (including a signature returning a
    /// processing error) at `ERROR`.
    #[must_use]
    pub const fn log_level(&self, capability: Capability) -> Level {
        match (self, capability) {
            (Self::NotImplemented, _) => Level::DEBUG,
            (Self::Processing { .. }, Capability::Processing) => Level::WARN,
            _ => Level::ERROR,
        }
    }
}

/// Renders an error and its chain of sources as a single line.
#[must_use]
pub fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![error.to_string()];
    let mut current = error.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}

/// Extracts a readable message from a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_owned();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    String::from("non-string panic payload")
}

/// Errors arising while discovering plugin modules.
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    /// The namespace was never declared in the module catalog.
    #[error("plugin namespace '{namespace}' is not declared")]
    UnknownNamespace {
        /// Namespace that was scanned.
        namespace: String,
    },

    /// A module path is empty or contains empty segments.
    #[error("invalid plugin module path '{path}'")]
    InvalidModulePath {
        /// Offending module path.
        path: String,
    },

    /// A module with the same path was already added to the catalog.
    #[error("plugin module '{path}' is already in the catalog")]
    DuplicateModule {
        /// Duplicated module path.
        path: String,
    },

    /// Two implementations of one capability share a name.
    #[error("{capability} implementation '{name}' from module '{module}' is already registered")]
    DuplicateImplementation {
        /// Capability being registered.
        capability: Capability,
        /// Implementation name.
        name: String,
        /// Module attempting the registration.
        module: String,
    },

    /// A module's loader reported a failure.
    #[error("plugin module '{module}' failed to load: {message}")]
    ModuleLoad {
        /// Module path.
        module: String,
        /// Human-readable failure description.
        message: String,
    },
}

/// Errors that abort a pipeline run.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// Plugin discovery could not proceed.
    #[error("plugin discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
}
