//! Two-phase pipeline coordinator.
//!
//! A [`Pipeline`] run loads the processing and signature namespaces into one
//! fresh registry, so a unit is found whichever namespace's module registered
//! it. Every processing unit runs and merges its contribution into a
//! [`ResultDocument`]; then every signature unit is evaluated against the
//! fully merged document. Matches are ordered by ascending severity and stored
//! under the reserved `signatures` key. No signature runs before every
//! processing unit has finished.

use std::sync::Arc;
use std::time::{Duration, Instant};

use assay_config::{Config, ConfigSource, StaticConfigSource};
use tracing::{debug, info, info_span};

use crate::contract::AnalysisTarget;
use crate::document::{MatchRecord, ResultDocument, sort_by_severity};
use crate::error::PipelineError;
use crate::registry::ModuleCatalog;
use crate::runner::UnitRunner;
use crate::version::ENGINE_VERSION;

/// Tracing target for pipeline runs.
const PIPELINE_TARGET: &str = "assay_plugins::pipeline";

/// Coordinates one analysis target through processing and signatures.
///
/// The pipeline owns its collaborators and can be run any number of times;
/// every run rediscovers the plugin set from the catalog.
pub struct Pipeline {
    catalog: ModuleCatalog,
    target: AnalysisTarget,
    configs: Arc<dyn ConfigSource>,
    runner: UnitRunner,
    engine_version: String,
    processing_namespace: String,
    signatures_namespace: String,
}

impl Pipeline {
    /// Creates a pipeline with default namespaces, no module configuration,
    /// no per-unit timeout, and the built-in engine version.
    #[must_use]
    pub fn new(catalog: ModuleCatalog, target: AnalysisTarget) -> Self {
        Self {
            catalog,
            target,
            configs: Arc::new(StaticConfigSource::new()),
            runner: UnitRunner::new(),
            engine_version: ENGINE_VERSION.to_owned(),
            processing_namespace: assay_config::default_processing_namespace(),
            signatures_namespace: assay_config::default_signatures_namespace(),
        }
    }

    /// Creates a pipeline driven by the shared runtime configuration.
    #[must_use]
    pub fn from_config(catalog: ModuleCatalog, target: AnalysisTarget, config: &Config) -> Self {
        Self::new(catalog, target)
            .with_config_source(config.module_config_source())
            .with_timeout(config.unit_timeout())
            .with_namespaces(config.processing_namespace(), config.signatures_namespace())
    }

    /// Replaces the per-module configuration collaborator.
    #[must_use]
    pub fn with_config_source(mut self, configs: impl ConfigSource + 'static) -> Self {
        self.configs = Arc::new(configs);
        self
    }

    /// Overrides the engine release consulted by the version gate.
    #[must_use]
    pub fn with_engine_version(mut self, engine_version: impl Into<String>) -> Self {
        self.engine_version = engine_version.into();
        self
    }

    /// Bounds each unit's entry point; `None` leaves units unbounded.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.runner = self.runner.with_timeout(timeout);
        self
    }

    /// Overrides the namespaces scanned for each capability.
    #[must_use]
    pub fn with_namespaces(
        mut self,
        processing: impl Into<String>,
        signatures: impl Into<String>,
    ) -> Self {
        self.processing_namespace = processing.into();
        self.signatures_namespace = signatures.into();
        self
    }

    /// Analysis target the pipeline runs against.
    #[must_use]
    pub const fn target(&self) -> &AnalysisTarget {
        &self.target
    }

    /// Engine release consulted by the version gate.
    #[must_use]
    pub fn engine_version(&self) -> &str {
        self.engine_version.as_str()
    }

    /// Runs every processing unit, then every signature unit, and returns the
    /// aggregated document.
    ///
    /// Units that fail are absent from the document; their failures appear
    /// only in the logs. Every record emitted during the run sits inside a
    /// `pipeline_run` span carrying the analysis path.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Discovery`] when a configured namespace is not
    /// declared in the catalog.
    pub fn run(&self) -> Result<ResultDocument, PipelineError> {
        let _run = info_span!(target: PIPELINE_TARGET, "pipeline_run", analysis = %self.target)
            .entered();
        let started = Instant::now();
        let mut results = ResultDocument::new();

        let registry = self.catalog.discover(&[
            self.processing_namespace.as_str(),
            self.signatures_namespace.as_str(),
        ])?;

        let mut produced = 0_usize;
        for entry in registry.processing() {
            let Some((key, value)) =
                self.runner
                    .run_processing(entry, &self.target, self.configs.as_ref())
            else {
                continue;
            };
            produced += 1;
            if results.insert(key.as_str(), value).is_some() {
                debug!(
                    target: PIPELINE_TARGET,
                    key = key.as_str(),
                    unit = entry.name(),
                    "result key already present; later unit wins"
                );
            }
        }

        let mut matches: Vec<MatchRecord> = registry
            .signatures()
            .iter()
            .filter_map(|entry| {
                self.runner
                    .run_signature(entry, &results, &self.engine_version)
            })
            .collect();
        sort_by_severity(&mut matches);
        results.set_signatures(&matches);

        info!(
            target: PIPELINE_TARGET,
            analysis = %self.target,
            processing_units = registry.processing().len(),
            results_produced = produced,
            signature_units = registry.signatures().len(),
            signatures_matched = matches.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "pipeline run finished"
        );
        Ok(results)
    }
}
