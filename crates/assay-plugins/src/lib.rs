//! Plugin orchestration core for the assay analysis pipeline.
//!
//! The `assay-plugins` crate turns the artefact directory of a completed
//! sandboxed execution into a single [`ResultDocument`]. It knows nothing
//! about what individual plugins compute; it discovers them, runs them behind
//! per-unit failure boundaries, and aggregates what they return.
//!
//! Plugins implement one of two capability contracts:
//!
//! - [`Processing`] units each extract one named result from the
//!   [`AnalysisTarget`].
//! - [`Signature`] units inspect the aggregated results and report whether a
//!   known behaviour is present. Each carries [`SignatureMetadata`], including
//!   an optional engine version range checked by the [`version`] gate.
//!
//! # Architecture
//!
//! Plugin modules register constructors into a [`ModuleCatalog`] at start-up.
//! A [`Pipeline`] run rediscovers the catalog into a fresh
//! [`PluginRegistry`], drives every processing unit through the
//! [`UnitRunner`], then evaluates every signature against its own copy of the
//! merged results. Matches are stored, ordered by ascending severity, under
//! the reserved [`SIGNATURES_KEY`].
//!
//! # Example
//!
//! ```
//! use assay_plugins::{
//!     AnalysisTarget, ModuleCatalog, Pipeline, PluginModule, Processing, UnitError,
//! };
//! use assay_config::ModuleConfig;
//! use serde_json::{Value, json};
//!
//! struct Hostname;
//!
//! impl Processing for Hostname {
//!     fn key(&self) -> &str {
//!         "hostname"
//!     }
//!     fn bind(&mut self, _target: &AnalysisTarget) {}
//!     fn configure(&mut self, _config: ModuleConfig) {}
//!     fn run(&mut self) -> Result<Value, UnitError> {
//!         Ok(json!("sandbox-01"))
//!     }
//! }
//!
//! let mut catalog = ModuleCatalog::new();
//! catalog
//!     .add(PluginModule::new("modules.processing.hostname", |registrar| {
//!         registrar.register_processing("hostname", || Box::new(Hostname))
//!     }))
//!     .expect("module path is valid");
//! catalog.declare_namespace("modules.signatures");
//!
//! let document = Pipeline::new(catalog, AnalysisTarget::new("/tmp/analysis"))
//!     .run()
//!     .expect("namespaces are declared");
//! assert_eq!(document.get("hostname"), Some(&json!("sandbox-01")));
//! assert_eq!(document.get("signatures"), Some(&json!([])));
//! ```

pub mod contract;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod runner;
pub mod version;

#[cfg(test)]
mod tests;

pub use self::contract::{AnalysisTarget, Processing, Signature, SignatureMetadata};
pub use self::document::{MatchRecord, ResultDocument, SIGNATURES_KEY, sort_by_severity};
pub use self::error::{DiscoveryError, PipelineError, UnitError};
pub use self::pipeline::Pipeline;
pub use self::registry::{
    Capability, ModuleCatalog, PluginModule, PluginRegistry, ProcessingEntry, Registrar,
    SignatureEntry,
};
pub use self::runner::UnitRunner;
pub use self::version::{ENGINE_VERSION, EngineVersion, GateDecision, VersionRange};
