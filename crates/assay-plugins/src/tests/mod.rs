//! Crate-level test doubles and BDD tests.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use assay_config::{ConfigSource, ModuleConfig, ModuleConfigError};
use serde_json::{Value, json};

use crate::contract::{AnalysisTarget, Processing, Signature, SignatureMetadata};
use crate::document::ResultDocument;
use crate::error::UnitError;
use crate::registry::PluginModule;


/// Scripted outcome of a [`StubProcessing`] unit.
#[derive(Debug, Clone)]
pub(crate) enum ProcessingBehaviour {
    Produce(Value),
    EchoTarget,
    EchoConfig(String),
    NotImplemented,
    DomainError(String),
    Unexpected(String),
    Panic(String),
    Sleep(Duration),
    /// Moves to the given result key while running, then produces `1`.
    RenameInRun(String),
    /// Takes its result key from the configured `slot` value, then produces `1`.
    KeyFromConfig,
}

pub(crate) struct StubProcessing {
    key: String,
    conf_path: String,
    behaviour: ProcessingBehaviour,
    target: Option<AnalysisTarget>,
    config: Option<ModuleConfig>,
}

impl StubProcessing {
    pub(crate) fn new(key: &str, behaviour: ProcessingBehaviour) -> Self {
        Self {
            key: key.to_owned(),
            conf_path: key.to_owned(),
            behaviour,
            target: None,
            config: None,
        }
    }
}

impl Processing for StubProcessing {
    fn key(&self) -> &str {
        &self.key
    }

    fn conf_path(&self) -> &str {
        &self.conf_path
    }

    fn bind(&mut self, target: &AnalysisTarget) {
        self.target = Some(target.clone());
    }

    fn configure(&mut self, config: ModuleConfig) {
        if matches!(self.behaviour, ProcessingBehaviour::KeyFromConfig)
            && let Ok(Some(slot)) = config.get::<String>("slot")
        {
            self.key = slot;
        }
        self.config = Some(config);
    }

    fn run(&mut self) -> Result<Value, UnitError> {
        match &self.behaviour {
            ProcessingBehaviour::Produce(value) => Ok(value.clone()),
            ProcessingBehaviour::EchoTarget => Ok(json!(
                self.target.as_ref().map(|target| target.path().to_string())
            )),
            ProcessingBehaviour::EchoConfig(key) => {
                let config = self
                    .config
                    .as_ref()
                    .ok_or_else(|| UnitError::unexpected("configuration was not injected"))?;
                let value = config
                    .get::<Value>(key)
                    .map_err(|error| UnitError::from_source("bad configuration", error))?;
                Ok(value.unwrap_or(Value::Null))
            }
            ProcessingBehaviour::NotImplemented => Err(UnitError::NotImplemented),
            ProcessingBehaviour::DomainError(message) => Err(UnitError::processing(message)),
            ProcessingBehaviour::Unexpected(message) => Err(UnitError::unexpected(message)),
            ProcessingBehaviour::Panic(message) => panic!("{message}"),
            ProcessingBehaviour::Sleep(duration) => {
                thread::sleep(*duration);
                Ok(Value::Null)
            }
            ProcessingBehaviour::RenameInRun(key) => {
                self.key.clone_from(key);
                Ok(json!(1))
            }
            ProcessingBehaviour::KeyFromConfig => Ok(json!(1)),
        }
    }
}

/// Configuration source that panics on every lookup.
pub(crate) struct PanickingSource;

impl ConfigSource for PanickingSource {
    #[expect(
        clippy::panic_in_result_fn,
        reason = "stands in for a host source that crashes"
    )]
    fn load(&self, conf_path: &str) -> Result<ModuleConfig, ModuleConfigError> {
        panic!("configuration lookup for '{conf_path}' blew up");
    }
}

/// Scripted outcome of a [`StubSignature`] unit.
#[derive(Debug, Clone)]
pub(crate) enum SignatureBehaviour {
    Match,
    NoMatch,
    NotImplemented,
    Fail(String),
    Panic(String),
    Sleep(Duration),
    /// Rewrites `key` in its snapshot, then matches.
    Mutate(String),
    /// Records the value of `key` it observed, then matches.
    Observe(String, Arc<Mutex<Vec<Option<Value>>>>),
    /// Appends the snapshot's keys to its evidence, then matches.
    CollectKeys,
}

pub(crate) struct StubSignature {
    metadata: SignatureMetadata,
    behaviour: SignatureBehaviour,
}

impl StubSignature {
    pub(crate) const fn new(metadata: SignatureMetadata, behaviour: SignatureBehaviour) -> Self {
        Self {
            metadata,
            behaviour,
        }
    }
}

impl Signature for StubSignature {
    fn metadata(&self) -> &SignatureMetadata {
        &self.metadata
    }

    fn run(&mut self, mut results: ResultDocument) -> Result<bool, UnitError> {
        match &self.behaviour {
            SignatureBehaviour::Match => Ok(true),
            SignatureBehaviour::NoMatch => Ok(false),
            SignatureBehaviour::NotImplemented => Err(UnitError::NotImplemented),
            SignatureBehaviour::Fail(message) => Err(UnitError::unexpected(message)),
            SignatureBehaviour::Panic(message) => panic!("{message}"),
            SignatureBehaviour::Sleep(duration) => {
                thread::sleep(*duration);
                Ok(true)
            }
            SignatureBehaviour::Mutate(key) => {
                results.insert(key.clone(), json!("tampered"));
                Ok(true)
            }
            SignatureBehaviour::Observe(key, seen) => {
                let observed = results.get(key).cloned();
                seen.lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .push(observed);
                Ok(true)
            }
            SignatureBehaviour::CollectKeys => {
                let keys: Vec<Value> = results.keys().map(|key| json!(key)).collect();
                self.metadata.data.extend(keys);
                Ok(true)
            }
        }
    }
}

/// Builds a module registering one [`StubProcessing`] named after `key`.
pub(crate) fn processing_module(
    path: &str,
    key: &str,
    behaviour: ProcessingBehaviour,
) -> PluginModule {
    let name = key.to_owned();
    PluginModule::new(path, move |registrar| {
        let unit_key = name.clone();
        let unit_behaviour = behaviour.clone();
        registrar.register_processing(name.clone(), move || {
            Box::new(StubProcessing::new(&unit_key, unit_behaviour.clone()))
        })
    })
}

/// Builds a module registering one [`StubSignature`].
pub(crate) fn signature_module(
    path: &str,
    metadata: SignatureMetadata,
    behaviour: SignatureBehaviour,
) -> PluginModule {
    PluginModule::new(path, move |registrar| {
        let unit_metadata = metadata.clone();
        let unit_behaviour = behaviour.clone();
        registrar.register_signature(metadata.name.clone(), move || {
            Box::new(StubSignature::new(
                unit_metadata.clone(),
                unit_behaviour.clone(),
            ))
        })
    })
}
