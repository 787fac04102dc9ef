//! Shared configuration for the assay analysis pipeline.
//!
//! [`Config`] is loaded through `ortho_config`, layering built-in defaults,
//! an optional configuration file, `ASSAY_*` environment variables, and
//! command-line flags (later layers win). It carries the settings the `assay`
//! binary needs to bootstrap logging and to drive the pipeline: where
//! per-module configuration lives, which namespaces hold plugin modules, and
//! how long a single unit may run.
//!
//! The [`module`] submodule provides the per-module configuration
//! collaborator consumed by processing units before they execute.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

mod defaults;
mod logging;
pub mod module;

pub use defaults::{
    DEFAULT_CONF_DIR, DEFAULT_LOG_FILTER, DEFAULT_PROCESSING_NAMESPACE,
    DEFAULT_SIGNATURES_NAMESPACE, default_conf_dir, default_log_filter,
    default_log_filter_string, default_log_format, default_processing_namespace,
    default_signatures_namespace, default_unit_timeout_secs,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use module::{ConfigSource, ModuleConfig, ModuleConfigError, StaticConfigSource, TomlConfigSource};
pub use ortho_config::{OrthoConfig, OrthoError};

/// Runtime configuration for the `assay` binary and pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "ASSAY")]
pub struct Config {
    /// Filter expression applied to the tracing subscriber.
    #[serde(default = "default_log_filter_string")]
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format used for log records.
    #[serde(default = "default_log_format")]
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Directory holding `<conf_path>.toml` files for individual modules.
    #[serde(default = "default_conf_dir")]
    #[ortho_config(default = default_conf_dir())]
    pub conf_dir: Utf8PathBuf,
    /// Dotted namespace scanned for processing modules.
    #[serde(default = "default_processing_namespace")]
    #[ortho_config(default = default_processing_namespace())]
    pub processing_namespace: String,
    /// Dotted namespace scanned for signature modules.
    #[serde(default = "default_signatures_namespace")]
    #[ortho_config(default = default_signatures_namespace())]
    pub signatures_namespace: String,
    /// Upper bound on a single unit's execution in seconds (`0` disables it).
    #[serde(default = "default_unit_timeout_secs")]
    #[ortho_config(default = default_unit_timeout_secs())]
    pub unit_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            conf_dir: default_conf_dir(),
            processing_namespace: default_processing_namespace(),
            signatures_namespace: default_signatures_namespace(),
            unit_timeout_secs: default_unit_timeout_secs(),
        }
    }
}

impl Config {
    /// Filter expression for the tracing subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log record format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Directory searched for per-module configuration files.
    #[must_use]
    pub fn conf_dir(&self) -> &Utf8Path {
        self.conf_dir.as_path()
    }

    /// Namespace holding processing modules.
    #[must_use]
    pub fn processing_namespace(&self) -> &str {
        self.processing_namespace.as_str()
    }

    /// Namespace holding signature modules.
    #[must_use]
    pub fn signatures_namespace(&self) -> &str {
        self.signatures_namespace.as_str()
    }

    /// Per-unit timeout, or `None` when units run unbounded.
    #[must_use]
    pub const fn unit_timeout(&self) -> Option<std::time::Duration> {
        if self.unit_timeout_secs == 0 {
            None
        } else {
            Some(std::time::Duration::from_secs(self.unit_timeout_secs))
        }
    }

    /// Builds the file-backed module configuration source for this config.
    #[must_use]
    pub fn module_config_source(&self) -> TomlConfigSource {
        TomlConfigSource::new(self.conf_dir.clone())
    }
}
