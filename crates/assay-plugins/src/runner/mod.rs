//! Failure-isolated execution of individual units.
//!
//! The [`UnitRunner`] is the per-unit boundary of the pipeline. Each call
//! constructs a fresh unit from a registry entry, prepares it, and invokes its
//! entry point. Every failure mode (an error return, a panic, or an elapsed
//! timeout) is classified, logged, and converted into "no contribution"; none
//! of them propagate to the caller.
//!
//! Without a timeout the entry point runs inline behind
//! [`std::panic::catch_unwind`]. With a timeout it runs on a dedicated worker
//! thread and the runner stops waiting once the limit elapses. A timed-out
//! worker is detached and left to finish on its own, so it may still be
//! running while later units execute; the runner logs a warning when that
//! happens.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use assay_config::ConfigSource;
use serde_json::Value;
use tracing::{Level, debug, event, info, warn};

use crate::contract::AnalysisTarget;
use crate::document::{MatchRecord, ResultDocument};
use crate::error::{UnitError, error_chain};
use crate::registry::{Capability, ProcessingEntry, SignatureEntry};
use crate::version::GateDecision;

/// Tracing target for unit execution.
const RUNNER_TARGET: &str = "assay_plugins::runner";

/// Runs single units behind a failure boundary.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use assay_plugins::UnitRunner;
///
/// let runner = UnitRunner::new().with_timeout(Some(Duration::from_secs(30)));
/// assert_eq!(runner.timeout(), Some(Duration::from_secs(30)));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitRunner {
    timeout: Option<Duration>,
}

impl UnitRunner {
    /// Creates a runner that waits for units indefinitely.
    #[must_use]
    pub const fn new() -> Self {
        Self { timeout: None }
    }

    /// Bounds each unit's entry point by `timeout`; `None` removes the bound.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configured per-unit timeout.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Runs one processing unit and returns its `(key, value)` contribution.
    ///
    /// The unit is constructed, bound to `target`, given the configuration
    /// `configs` resolves for its `conf_path`, and run. The result key is read
    /// once the entry point returns. Returns `None` when any step fails,
    /// including a panicking configuration source; the failure is logged at
    /// the level chosen by [`UnitError::log_level`].
    #[must_use]
    pub fn run_processing(
        &self,
        entry: &ProcessingEntry,
        target: &AnalysisTarget,
        configs: &dyn ConfigSource,
    ) -> Option<(String, Value)> {
        self.try_processing(entry, target, configs)
            .inspect_err(|error| report(Capability::Processing, entry.name(), error))
            .ok()
    }

    fn try_processing(
        &self,
        entry: &ProcessingEntry,
        target: &AnalysisTarget,
        configs: &dyn ConfigSource,
    ) -> Result<(String, Value), UnitError> {
        let mut unit = contain(|| {
            let mut fresh = entry.construct();
            fresh.bind(target);
            Ok(fresh)
        })?;

        let conf_path = contain(|| Ok(unit.conf_path().to_owned()))?;
        let config = contain(|| {
            configs
                .load(&conf_path)
                .map_err(|source| UnitError::Configuration {
                    conf_path: conf_path.clone(),
                    source,
                })
        })?;

        // Units may settle their key in `configure` or `run`.
        let (key, value) = self.isolate(move || {
            unit.configure(config);
            let value = unit.run()?;
            Ok((unit.key().to_owned(), value))
        })?;

        debug!(
            target: RUNNER_TARGET,
            unit = entry.name(),
            key = key.as_str(),
            "processing unit produced a result"
        );
        Ok((key, value))
    }

    /// Evaluates one signature unit against a private copy of `results`.
    ///
    /// Disabled signatures are skipped before the version gate is consulted.
    /// Signatures outside their declared engine range, or with a range that
    /// cannot be parsed, are skipped with a debug record. On a positive match
    /// the unit's metadata is read after its entry point returns so evidence
    /// it collected is included in the returned record.
    #[must_use]
    pub fn run_signature(
        &self,
        entry: &SignatureEntry,
        results: &ResultDocument,
        engine_version: &str,
    ) -> Option<MatchRecord> {
        self.try_signature(entry, results, engine_version)
            .inspect_err(|error| report(Capability::Signature, entry.name(), error))
            .ok()
            .flatten()
    }

    fn try_signature(
        &self,
        entry: &SignatureEntry,
        results: &ResultDocument,
        engine_version: &str,
    ) -> Result<Option<MatchRecord>, UnitError> {
        let mut unit = contain(|| Ok(entry.construct()))?;

        let (enabled, range) = contain(|| {
            let metadata = unit.metadata();
            Ok((metadata.enabled, metadata.version_range()))
        })?;
        if !enabled {
            debug!(
                target: RUNNER_TARGET,
                unit = entry.name(),
                "signature is disabled; skipping"
            );
            return Ok(None);
        }

        let decision = range.check(engine_version);
        if !decision.is_compatible() {
            log_gate_skip(entry.name(), engine_version, &decision);
            return Ok(None);
        }

        let snapshot = results.clone();
        let outcome = self.isolate(move || {
            let matched = unit.run(snapshot)?;
            Ok(matched.then(|| MatchRecord::from(unit.metadata())))
        })?;

        if let Some(record) = &outcome {
            info!(
                target: RUNNER_TARGET,
                signature = record.name.as_str(),
                severity = record.severity,
                "signature matched"
            );
        }
        Ok(outcome)
    }

    fn isolate<T, F>(&self, task: F) -> Result<T, UnitError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, UnitError> + Send + 'static,
    {
        let Some(timeout) = self.timeout else {
            return contain(task);
        };

        let (sender, receiver) = mpsc::channel();
        let worker = thread::Builder::new()
            .name(String::from("assay-unit"))
            .spawn(move || {
                if sender.send(contain(task)).is_err() {
                    debug!(
                        target: RUNNER_TARGET,
                        "unit finished after the runner stopped waiting"
                    );
                }
            })
            .map_err(|error| UnitError::from_source("failed to spawn unit worker", error))?;
        // Detached: a worker that outlives the timeout keeps running until it
        // returns.
        drop(worker);

        match receiver.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    target: RUNNER_TARGET,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "unit timed out; its worker keeps running detached"
                );
                Err(UnitError::TimedOut {
                    timeout_secs: timeout.as_secs(),
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(UnitError::Panicked {
                message: String::from("unit worker exited without reporting"),
            }),
        }
    }
}

/// Runs `task`, converting a panic into [`UnitError::Panicked`].
fn contain<T>(task: impl FnOnce() -> Result<T, UnitError>) -> Result<T, UnitError> {
    panic::catch_unwind(AssertUnwindSafe(task))
        .unwrap_or_else(|payload| Err(UnitError::from_panic(payload.as_ref())))
}

fn log_gate_skip(unit: &str, engine_version: &str, decision: &GateDecision) {
    match decision {
        GateDecision::Compatible => {}
        GateDecision::TooOld { minimum } => debug!(
            target: RUNNER_TARGET,
            unit,
            engine = engine_version,
            minimum = %minimum,
            "engine is older than the signature's minimum; skipping"
        ),
        GateDecision::TooNew { maximum } => debug!(
            target: RUNNER_TARGET,
            unit,
            engine = engine_version,
            maximum = %maximum,
            "engine is newer than the signature's maximum; skipping"
        ),
        GateDecision::Malformed { bound, error } => debug!(
            target: RUNNER_TARGET,
            unit,
            bound = bound.as_str(),
            error = %error,
            "unparseable version bound; skipping signature"
        ),
    }
}

/// Logs a unit failure at the level its classification calls for.
fn report(capability: Capability, unit: &str, error: &UnitError) {
    let detail = error_chain(error);
    let kind = capability.as_str();
    let level = error.log_level(capability);
    if level == Level::DEBUG {
        event!(
            target: RUNNER_TARGET,
            Level::DEBUG,
            capability = kind,
            unit,
            "unit is not implemented; skipping"
        );
    } else if level == Level::WARN {
        event!(
            target: RUNNER_TARGET,
            Level::WARN,
            capability = kind,
            unit,
            detail = %detail,
            "unit reported a processing error"
        );
    } else {
        event!(
            target: RUNNER_TARGET,
            Level::ERROR,
            capability = kind,
            unit,
            detail = %detail,
            "unit failed unexpectedly"
        );
    }
}

#[cfg(test)]
mod tests;
