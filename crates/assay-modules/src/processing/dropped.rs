//! Inventory of the files a sample dropped during execution.
//!
//! The sandbox copies every file the sample wrote into `<analysis>/files`.
//! This unit lists them (recursively, in path order) with their size and
//! SHA-256 digest. A missing directory means nothing was dropped.
//!
//! Configuration (`dropped.toml`):
//!
//! ```toml
//! # Stop after this many files; unlimited when absent.
//! max_files = 500
//! ```

use std::fs::File;
use std::io;

use assay_config::ModuleConfig;
use assay_plugins::error::error_chain;
use assay_plugins::{AnalysisTarget, PluginModule, Processing, UnitError};
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

/// Dotted path of the module.
pub const MODULE_PATH: &str = "modules.processing.dropped";

/// Result key written by [`Dropped`].
pub const KEY: &str = "dropped";

/// Directory, relative to the analysis root, holding dropped files.
pub const FILES_DIR: &str = "files";

const DROPPED_TARGET: &str = "assay_modules::dropped";

/// Errors raised while inventorying dropped files.
#[derive(Debug, Error)]
pub enum DroppedError {
    /// A directory could not be listed.
    #[error("failed to list '{path}'")]
    List {
        /// Directory being listed.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A file could not be read for hashing.
    #[error("failed to hash '{path}'")]
    Hash {
        /// File being hashed.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Processing unit producing the `dropped` result.
#[derive(Debug, Default)]
pub struct Dropped {
    target: Option<AnalysisTarget>,
    config: Option<ModuleConfig>,
}

impl Dropped {
    fn max_files(&self) -> Result<Option<usize>, UnitError> {
        let Some(config) = &self.config else {
            return Ok(None);
        };
        config
            .get::<usize>("max_files")
            .map_err(|source| UnitError::Configuration {
                conf_path: KEY.to_owned(),
                source,
            })
    }
}

impl Processing for Dropped {
    fn key(&self) -> &str {
        KEY
    }

    fn conf_path(&self) -> &str {
        KEY
    }

    fn bind(&mut self, target: &AnalysisTarget) {
        self.target = Some(target.clone());
    }

    fn configure(&mut self, config: ModuleConfig) {
        self.config = Some(config);
    }

    fn run(&mut self) -> Result<Value, UnitError> {
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| UnitError::unexpected("analysis target was not bound"))?;
        let limit = self.max_files()?;
        let root = target.join(FILES_DIR);

        inventory(&root, limit)
            .map(Value::Array)
            .map_err(|error| UnitError::processing(error_chain(&error)))
    }
}

/// Lists and hashes the files below `root`, keeping at most `limit`.
///
/// # Errors
///
/// Returns a [`DroppedError`] when a directory cannot be listed or a file
/// cannot be read.
pub fn inventory(root: &Utf8Path, limit: Option<usize>) -> Result<Vec<Value>, DroppedError> {
    if !root.is_dir() {
        debug!(target: DROPPED_TARGET, root = root.as_str(), "no dropped files directory");
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    collect_files(root, &mut paths)?;
    paths.sort();
    let total = paths.len();
    if let Some(max) = limit {
        paths.truncate(max);
    }

    let files = paths
        .iter()
        .map(|path| describe(root, path))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(
        target: DROPPED_TARGET,
        root = root.as_str(),
        total,
        reported = files.len(),
        "inventoried dropped files"
    );
    Ok(files)
}

fn collect_files(dir: &Utf8Path, paths: &mut Vec<Utf8PathBuf>) -> Result<(), DroppedError> {
    let list_error = |source| DroppedError::List {
        path: dir.to_owned(),
        source,
    };
    for listing in dir.read_dir_utf8().map_err(list_error)? {
        let entry = listing.map_err(list_error)?;
        let file_type = entry.file_type().map_err(list_error)?;
        if file_type.is_dir() {
            collect_files(entry.path(), paths)?;
        } else if file_type.is_file() {
            paths.push(entry.path().to_owned());
        }
    }
    Ok(())
}

fn describe(root: &Utf8Path, path: &Utf8Path) -> Result<Value, DroppedError> {
    let hash_error = |source| DroppedError::Hash {
        path: path.to_owned(),
        source,
    };
    let mut file = File::open(path).map_err(hash_error)?;
    let mut hasher = Sha256::new();
    let size = io::copy(&mut file, &mut hasher).map_err(hash_error)?;
    let relative = path.strip_prefix(root).unwrap_or(path);

    Ok(json!({
        "name": path.file_name(),
        "path": relative.as_str(),
        "size": size,
        "sha256": format!("{:x}", hasher.finalize()),
    }))
}

/// Module registering [`Dropped`].
#[must_use]
pub fn module() -> PluginModule {
    PluginModule::new(MODULE_PATH, |registrar| {
        registrar.register_processing("dropped", || Box::new(Dropped::default()))
    })
}
