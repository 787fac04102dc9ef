//! Plugin module catalog and per-run registry.
//!
//! Plugin modules are added to a [`ModuleCatalog`] at process start-up. Each
//! [`PluginModule`] has a dotted path (`modules.processing.network`) and a
//! loader that registers zero or more processing or signature constructors
//! through a [`Registrar`].
//!
//! [`ModuleCatalog::discover`] loads the direct, non-package children of the
//! requested namespaces in path order and returns a fresh
//! [`PluginRegistry`]. Nothing is cached between calls, so a catalog can be
//! reused for several runs and each run sees the modules as they are at that
//! moment. A module whose loader fails or panics is logged and skipped; the
//! remaining modules are still loaded.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::contract::{Processing, Signature};
use crate::error::{DiscoveryError, error_chain, panic_message};

/// Tracing target for discovery operations.
const REGISTRY_TARGET: &str = "assay_plugins::registry";

/// Constructs a fresh processing unit.
pub type ProcessingFactory = Arc<dyn Fn() -> Box<dyn Processing> + Send + Sync>;

/// Constructs a fresh signature unit.
pub type SignatureFactory = Arc<dyn Fn() -> Box<dyn Signature> + Send + Sync>;

/// Registers a module's implementations.
pub type ModuleLoader = Arc<dyn Fn(&mut Registrar) -> Result<(), DiscoveryError> + Send + Sync>;

/// Capability contracts a plugin can implement.
///
/// # Example
///
/// ```
/// use assay_plugins::Capability;
///
/// assert_eq!(Capability::Signature.as_str(), "signature");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Extracts a named result from the analysis target.
    Processing,
    /// Matches a behaviour over the aggregated results.
    Signature,
}

impl Capability {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Signature => "signature",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered processing implementation.
#[derive(Clone)]
pub struct ProcessingEntry {
    name: String,
    module: String,
    factory: ProcessingFactory,
}

impl ProcessingEntry {
    /// Implementation name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Module that registered the implementation.
    #[must_use]
    pub fn module(&self) -> &str {
        self.module.as_str()
    }

    /// Constructs a fresh unit.
    #[must_use]
    pub fn construct(&self) -> Box<dyn Processing> {
        (self.factory)()
    }
}

impl fmt::Debug for ProcessingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingEntry")
            .field("name", &self.name)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

/// A registered signature implementation.
#[derive(Clone)]
pub struct SignatureEntry {
    name: String,
    module: String,
    factory: SignatureFactory,
}

impl SignatureEntry {
    /// Implementation name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Module that registered the implementation.
    #[must_use]
    pub fn module(&self) -> &str {
        self.module.as_str()
    }

    /// Constructs a fresh unit.
    #[must_use]
    pub fn construct(&self) -> Box<dyn Signature> {
        (self.factory)()
    }
}

impl fmt::Debug for SignatureEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureEntry")
            .field("name", &self.name)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

/// Collects the implementations a single module registers.
#[derive(Debug)]
pub struct Registrar {
    module: String,
    processing: Vec<ProcessingEntry>,
    signatures: Vec<SignatureEntry>,
}

impl Registrar {
    fn new(module: &str) -> Self {
        Self {
            module: module.to_owned(),
            processing: Vec::new(),
            signatures: Vec::new(),
        }
    }

    /// Path of the module being loaded.
    #[must_use]
    pub fn module(&self) -> &str {
        self.module.as_str()
    }

    /// Registers a processing implementation.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::DuplicateImplementation`] if this module
    /// already registered a processing implementation called `name`.
    pub fn register_processing<F>(
        &mut self,
        name: impl Into<String>,
        factory: F,
    ) -> Result<(), DiscoveryError>
    where
        F: Fn() -> Box<dyn Processing> + Send + Sync + 'static,
    {
        let unit_name = name.into();
        if self.processing.iter().any(|entry| entry.name == unit_name) {
            return Err(self.duplicate(Capability::Processing, unit_name));
        }
        self.processing.push(ProcessingEntry {
            name: unit_name,
            module: self.module.clone(),
            factory: Arc::new(factory),
        });
        Ok(())
    }

    /// Registers a signature implementation.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::DuplicateImplementation`] if this module
    /// already registered a signature implementation called `name`.
    pub fn register_signature<F>(
        &mut self,
        name: impl Into<String>,
        factory: F,
    ) -> Result<(), DiscoveryError>
    where
        F: Fn() -> Box<dyn Signature> + Send + Sync + 'static,
    {
        let unit_name = name.into();
        if self.signatures.iter().any(|entry| entry.name == unit_name) {
            return Err(self.duplicate(Capability::Signature, unit_name));
        }
        self.signatures.push(SignatureEntry {
            name: unit_name,
            module: self.module.clone(),
            factory: Arc::new(factory),
        });
        Ok(())
    }

    fn duplicate(&self, capability: Capability, name: String) -> DiscoveryError {
        DiscoveryError::DuplicateImplementation {
            capability,
            name,
            module: self.module.clone(),
        }
    }
}

/// A unit of plugin code addressed by a dotted path.
#[derive(Clone)]
pub struct PluginModule {
    path: String,
    package: bool,
    loader: ModuleLoader,
}

impl PluginModule {
    /// Creates a plain module.
    pub fn new<F>(path: impl Into<String>, loader: F) -> Self
    where
        F: Fn(&mut Registrar) -> Result<(), DiscoveryError> + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            package: false,
            loader: Arc::new(loader),
        }
    }

    /// Creates a package entry. Packages are never loaded by a namespace
    /// scan.
    pub fn package<F>(path: impl Into<String>, loader: F) -> Self
    where
        F: Fn(&mut Registrar) -> Result<(), DiscoveryError> + Send + Sync + 'static,
    {
        Self {
            package: true,
            ..Self::new(path, loader)
        }
    }

    /// Dotted module path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    /// Final path segment.
    #[must_use]
    pub fn name(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(self.path.as_str())
    }

    /// Returns `true` for package entries.
    #[must_use]
    pub const fn is_package(&self) -> bool {
        self.package
    }

    fn parent(&self) -> Option<&str> {
        self.path.rsplit_once('.').map(|(parent, _)| parent)
    }
}

impl fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginModule")
            .field("path", &self.path)
            .field("package", &self.package)
            .finish_non_exhaustive()
    }
}

/// Every plugin module known to the process, grouped by namespace.
///
/// # Example
///
/// ```
/// use assay_plugins::{ModuleCatalog, PluginModule};
///
/// let mut catalog = ModuleCatalog::new();
/// catalog
///     .add(PluginModule::new("modules.processing.empty", |_registrar| Ok(())))
///     .expect("module path is valid");
/// let registry = catalog
///     .discover(&["modules.processing"])
///     .expect("namespace is declared");
/// assert!(registry.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    namespaces: BTreeSet<String>,
    modules: BTreeMap<String, PluginModule>,
}

impl ModuleCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a namespace so it can be scanned even when it holds no
    /// modules.
    pub fn declare_namespace(&mut self, namespace: impl Into<String>) -> &mut Self {
        self.namespaces.insert(namespace.into());
        self
    }

    /// Adds a module, declaring its parent namespace.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::InvalidModulePath`] for paths without a
    /// parent namespace or with empty segments, and
    /// [`DiscoveryError::DuplicateModule`] when the path is already present.
    pub fn add(&mut self, module: PluginModule) -> Result<&mut Self, DiscoveryError> {
        let path = module.path().to_owned();
        let Some(parent) = module.parent().map(str::to_owned) else {
            return Err(DiscoveryError::InvalidModulePath { path });
        };
        if path.split('.').any(str::is_empty) {
            return Err(DiscoveryError::InvalidModulePath { path });
        }
        if self.modules.contains_key(&path) {
            return Err(DiscoveryError::DuplicateModule { path });
        }
        self.namespaces.insert(parent);
        self.modules.insert(path, module);
        Ok(self)
    }

    /// Returns `true` when `namespace` has been declared.
    #[must_use]
    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces.contains(namespace)
    }

    /// Direct children of `namespace`, in path order.
    pub fn modules_in<'a>(&'a self, namespace: &'a str) -> impl Iterator<Item = &'a PluginModule> {
        self.modules
            .values()
            .filter(move |module| module.parent() == Some(namespace))
    }

    /// Number of modules in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns `true` when the catalog holds no modules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Loads every plain module directly inside each namespace and returns
    /// the implementations they registered.
    ///
    /// Namespaces are scanned in the order given. Packages and modules nested
    /// deeper than one level are skipped. A module loaded through an earlier
    /// namespace is not loaded again.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::UnknownNamespace`] when a namespace was never
    /// declared. Failures inside individual modules are logged, not returned.
    pub fn discover(&self, namespaces: &[&str]) -> Result<PluginRegistry, DiscoveryError> {
        if let Some(missing) = namespaces.iter().find(|ns| !self.has_namespace(ns)) {
            return Err(DiscoveryError::UnknownNamespace {
                namespace: (*missing).to_owned(),
            });
        }

        let mut registry = PluginRegistry::new();
        for namespace in namespaces {
            for module in self.modules_in(namespace) {
                if module.is_package() {
                    debug!(
                        target: REGISTRY_TARGET,
                        module = module.path(),
                        "skipping nested package"
                    );
                    continue;
                }
                if registry.has_loaded(module.path()) {
                    continue;
                }
                load_module(module, &mut registry);
            }
        }

        debug!(
            target: REGISTRY_TARGET,
            processing = registry.processing.len(),
            signatures = registry.signatures.len(),
            modules = registry.modules.len(),
            "plugin discovery finished"
        );
        Ok(registry)
    }
}

fn load_module(module: &PluginModule, registry: &mut PluginRegistry) {
    let mut registrar = Registrar::new(module.path());
    let loaded = panic::catch_unwind(AssertUnwindSafe(|| (module.loader)(&mut registrar)));

    let outcome = match loaded {
        Ok(Ok(())) => registry.absorb(registrar),
        Ok(Err(load_error)) => Err(load_error),
        Err(payload) => {
            error!(
                target: REGISTRY_TARGET,
                module = module.path(),
                panic = %panic_message(payload.as_ref()),
                "plugin module panicked while loading; skipping it"
            );
            return;
        }
    };

    if let Err(load_error) = outcome {
        warn!(
            target: REGISTRY_TARGET,
            module = module.path(),
            error = %error_chain(&load_error),
            "unable to load plugin module; skipping it"
        );
    }
}

/// Implementations discovered for a single pipeline run, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    processing: Vec<ProcessingEntry>,
    signatures: Vec<SignatureEntry>,
    modules: Vec<String>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Processing implementations in discovery order.
    #[must_use]
    pub fn processing(&self) -> &[ProcessingEntry] {
        &self.processing
    }

    /// Signature implementations in discovery order.
    #[must_use]
    pub fn signatures(&self) -> &[SignatureEntry] {
        &self.signatures
    }

    /// Names of every implementation of `capability` registered so far.
    #[must_use]
    pub fn implementations(&self, capability: Capability) -> Vec<&str> {
        match capability {
            Capability::Processing => self.processing.iter().map(ProcessingEntry::name).collect(),
            Capability::Signature => self.signatures.iter().map(SignatureEntry::name).collect(),
        }
    }

    /// Paths of modules that loaded successfully.
    #[must_use]
    pub fn loaded_modules(&self) -> &[String] {
        &self.modules
    }

    /// Total number of registered implementations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.processing.len() + self.signatures.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processing.is_empty() && self.signatures.is_empty()
    }

    fn has_loaded(&self, module: &str) -> bool {
        self.modules.iter().any(|loaded| loaded == module)
    }

    /// Merges a module's registrations; all or nothing.
    fn absorb(&mut self, registrar: Registrar) -> Result<(), DiscoveryError> {
        if let Some(clash) = registrar
            .processing
            .iter()
            .find(|entry| self.processing.iter().any(|known| known.name == entry.name))
        {
            return Err(registrar.duplicate(Capability::Processing, clash.name.clone()));
        }
        if let Some(clash) = registrar
            .signatures
            .iter()
            .find(|entry| self.signatures.iter().any(|known| known.name == entry.name))
        {
            return Err(registrar.duplicate(Capability::Signature, clash.name.clone()));
        }

        debug!(
            target: REGISTRY_TARGET,
            module = registrar.module(),
            processing = registrar.processing.len(),
            signatures = registrar.signatures.len(),
            "loaded plugin module"
        );
        self.modules.push(registrar.module);
        self.processing.extend(registrar.processing);
        self.signatures.extend(registrar.signatures);
        Ok(())
    }
}
