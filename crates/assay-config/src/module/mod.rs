//! Per-module configuration loaded on behalf of processing units.
//!
//! Each processing unit declares a `conf_path`. Before the unit runs, the
//! pipeline asks a [`ConfigSource`] to resolve that path into a
//! [`ModuleConfig`] and injects the result into the unit. The production
//! source, [`TomlConfigSource`], reads `<root>/<conf_path>.toml`; tests use
//! [`StaticConfigSource`] to hand out in-memory tables.
//!
//! A missing file is not an error: it yields an empty configuration so units
//! fall back to their own defaults. Unreadable or malformed files are
//! reported as [`ModuleConfigError`] and fail only the unit that asked.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::sync::Arc;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// File extension appended to a module's `conf_path`.
const CONFIG_EXTENSION: &str = "toml";

/// Errors raised while resolving or reading module configuration.
#[derive(Debug, Clone, Error)]
pub enum ModuleConfigError {
    /// The declared path escapes the configuration root or is absolute.
    #[error("configuration path '{conf_path}' must be relative to the configuration directory")]
    InvalidPath {
        /// Path declared by the module.
        conf_path: String,
    },
    /// The configuration file exists but could not be read.
    #[error("failed to read module configuration '{path}': {source}")]
    Read {
        /// File that was read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The configuration file is not valid TOML.
    #[error("failed to parse module configuration '{path}': {source}")]
    Parse {
        /// File that was parsed.
        path: Utf8PathBuf,
        /// Underlying TOML error.
        #[source]
        source: Box<toml::de::Error>,
    },
    /// A key held a value of the wrong shape for the requested type.
    #[error("configuration key '{key}' in '{conf_path}' is invalid: {message}")]
    InvalidValue {
        /// Module configuration path.
        conf_path: String,
        /// Key that was read.
        key: String,
        /// Description of the mismatch.
        message: String,
    },
}

/// Configuration injected into a single processing unit.
///
/// Values are read lazily and typed on access with [`ModuleConfig::get`], so
/// a unit only fails on the keys it actually uses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleConfig {
    conf_path: String,
    table: toml::Table,
}

impl ModuleConfig {
    /// Creates an empty configuration for `conf_path`.
    #[must_use]
    pub fn empty(conf_path: impl Into<String>) -> Self {
        Self {
            conf_path: conf_path.into(),
            table: toml::Table::new(),
        }
    }

    /// Wraps an already parsed table.
    #[must_use]
    pub fn from_table(conf_path: impl Into<String>, table: toml::Table) -> Self {
        Self {
            conf_path: conf_path.into(),
            table,
        }
    }

    /// Path this configuration was resolved from.
    #[must_use]
    pub fn conf_path(&self) -> &str {
        self.conf_path.as_str()
    }

    /// Returns `true` when no keys are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns `true` when `key` is present at the top level.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    /// Reads `key` as `T`, returning `None` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleConfigError::InvalidValue`] when the value cannot be
    /// converted into `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ModuleConfigError> {
        let Some(value) = self.table.get(key) else {
            return Ok(None);
        };
        value
            .clone()
            .try_into::<T>()
            .map(Some)
            .map_err(|error: toml::de::Error| ModuleConfigError::InvalidValue {
                conf_path: self.conf_path.clone(),
                key: key.to_owned(),
                message: error.message().to_owned(),
            })
    }

    /// Returns the `[name]` table as its own configuration, if present.
    #[must_use]
    pub fn section(&self, name: &str) -> Option<Self> {
        self.table
            .get(name)
            .and_then(toml::Value::as_table)
            .map(|table| Self {
                conf_path: format!("{}.{name}", self.conf_path),
                table: table.clone(),
            })
    }

    /// Borrows the underlying table.
    #[must_use]
    pub const fn as_table(&self) -> &toml::Table {
        &self.table
    }
}

/// Resolves a module's declared `conf_path` into its configuration.
pub trait ConfigSource: Send + Sync {
    /// Loads the configuration for `conf_path`.
    ///
    /// # Errors
    ///
    /// Returns a [`ModuleConfigError`] when the configuration exists but
    /// cannot be read or parsed.
    fn load(&self, conf_path: &str) -> Result<ModuleConfig, ModuleConfigError>;
}

impl<T: ConfigSource + ?Sized> ConfigSource for Arc<T> {
    fn load(&self, conf_path: &str) -> Result<ModuleConfig, ModuleConfigError> {
        (**self).load(conf_path)
    }
}

/// Reads module configuration from TOML files under a root directory.
#[derive(Debug, Clone)]
pub struct TomlConfigSource {
    root: Utf8PathBuf,
}

impl TomlConfigSource {
    /// Creates a source rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the configuration files.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        self.root.as_path()
    }

    fn resolve(&self, conf_path: &str) -> Result<Utf8PathBuf, ModuleConfigError> {
        let relative = Utf8Path::new(conf_path);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Utf8Component::Normal(_)));
        if escapes {
            return Err(ModuleConfigError::InvalidPath {
                conf_path: conf_path.to_owned(),
            });
        }
        Ok(self.root.join(format!("{conf_path}.{CONFIG_EXTENSION}")))
    }
}

impl ConfigSource for TomlConfigSource {
    fn load(&self, conf_path: &str) -> Result<ModuleConfig, ModuleConfigError> {
        if conf_path.is_empty() {
            return Ok(ModuleConfig::empty(conf_path));
        }

        let path = self.resolve(conf_path)?;
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Ok(ModuleConfig::empty(conf_path));
            }
            Err(error) => {
                return Err(ModuleConfigError::Read {
                    path,
                    source: Arc::new(error),
                });
            }
        };

        let table = toml::from_str::<toml::Table>(&contents).map_err(|error| {
            ModuleConfigError::Parse {
                path,
                source: Box::new(error),
            }
        })?;
        Ok(ModuleConfig::from_table(conf_path, table))
    }
}

/// In-memory configuration source keyed by `conf_path`.
///
/// Unknown paths resolve to an empty configuration, mirroring a missing file.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    modules: BTreeMap<String, toml::Table>,
}

impl StaticConfigSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the table served for `conf_path`.
    #[must_use]
    pub fn with_module(mut self, conf_path: impl Into<String>, table: toml::Table) -> Self {
        self.modules.insert(conf_path.into(), table);
        self
    }
}

impl ConfigSource for StaticConfigSource {
    fn load(&self, conf_path: &str) -> Result<ModuleConfig, ModuleConfigError> {
        Ok(self.modules.get(conf_path).map_or_else(
            || ModuleConfig::empty(conf_path),
            |table| ModuleConfig::from_table(conf_path, table.clone()),
        ))
    }
}
