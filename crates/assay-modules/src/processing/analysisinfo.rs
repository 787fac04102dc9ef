//! Records which engine release processed an analysis, and when.

use assay_config::ModuleConfig;
use assay_plugins::{AnalysisTarget, ENGINE_VERSION, PluginModule, Processing, UnitError};
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Dotted path of the module.
pub const MODULE_PATH: &str = "modules.processing.analysisinfo";

/// Result key written by [`AnalysisInfo`].
pub const KEY: &str = "info";

/// Processing unit producing the `info` result.
#[derive(Debug, Default)]
pub struct AnalysisInfo {
    target: Option<AnalysisTarget>,
}

impl Processing for AnalysisInfo {
    fn key(&self) -> &str {
        KEY
    }

    fn bind(&mut self, target: &AnalysisTarget) {
        self.target = Some(target.clone());
    }

    fn configure(&mut self, _config: ModuleConfig) {}

    fn run(&mut self) -> Result<Value, UnitError> {
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| UnitError::unexpected("analysis target was not bound"))?;
        let processed_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|error| UnitError::from_source("failed to format processing time", error))?;

        Ok(json!({
            "version": ENGINE_VERSION,
            "id": target.path().file_name(),
            "analysis_path": target.path().as_str(),
            "processed_at": processed_at,
        }))
    }
}

/// Module registering [`AnalysisInfo`].
#[must_use]
pub fn module() -> PluginModule {
    PluginModule::new(MODULE_PATH, |registrar| {
        registrar.register_processing("analysisinfo", || Box::new(AnalysisInfo::default()))
    })
}
