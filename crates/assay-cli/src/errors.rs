//! Error types for the CLI runtime.

use std::io;
use std::sync::Arc;

use assay_plugins::{DiscoveryError, PipelineError};
use camino::Utf8PathBuf;
use thiserror::Error;

use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("analysis directory '{path}' does not exist or is not a directory")]
    MissingAnalysis { path: Utf8PathBuf },
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("failed to register built-in modules: {0}")]
    Catalog(DiscoveryError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("failed to serialise the result document: {0}")]
    SerialiseDocument(serde_json::Error),
    #[error("failed to write output: {0}")]
    WriteOutput(io::Error),
}
