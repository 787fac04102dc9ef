//! Built-in plugin modules shipped with the `assay` binary.
//!
//! Each module registers its units into a
//! [`ModuleCatalog`](assay_plugins::ModuleCatalog) under the default
//! namespaces:
//!
//! - `modules.processing.analysisinfo` records which engine processed the
//!   analysis, and when.
//! - `modules.processing.dropped` inventories the files the sample dropped
//!   under `<analysis>/files`, with their size and SHA-256 digest.
//! - `modules.signatures.dropped_files` flags analyses that dropped at least
//!   one file.
//!
//! # Example
//!
//! ```
//! let catalog = assay_modules::catalog().expect("built-in modules are valid");
//! assert_eq!(catalog.len(), 3);
//! assert!(catalog.has_namespace("modules.signatures"));
//! ```

use assay_config::{DEFAULT_PROCESSING_NAMESPACE, DEFAULT_SIGNATURES_NAMESPACE};
use assay_plugins::{DiscoveryError, ModuleCatalog};

pub mod processing;
pub mod signatures;

/// Adds every built-in module to `catalog` and declares the default
/// namespaces.
///
/// # Errors
///
/// Returns [`DiscoveryError::DuplicateModule`] when a built-in module path is
/// already present in the catalog.
pub fn register(catalog: &mut ModuleCatalog) -> Result<(), DiscoveryError> {
    catalog
        .declare_namespace(DEFAULT_PROCESSING_NAMESPACE)
        .declare_namespace(DEFAULT_SIGNATURES_NAMESPACE);
    catalog
        .add(processing::analysisinfo::module())?
        .add(processing::dropped::module())?
        .add(signatures::dropped_files::module())?;
    Ok(())
}

/// Builds a catalog holding only the built-in modules.
///
/// # Errors
///
/// Propagates any error from [`register`].
pub fn catalog() -> Result<ModuleCatalog, DiscoveryError> {
    let mut catalog = ModuleCatalog::new();
    register(&mut catalog)?;
    Ok(catalog)
}
