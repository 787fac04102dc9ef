//! Flags analyses in which the sample dropped files.

use assay_plugins::{PluginModule, ResultDocument, Signature, SignatureMetadata, UnitError};
use serde_json::{Value, json};

use crate::processing::dropped;

/// Dotted path of the module.
pub const MODULE_PATH: &str = "modules.signatures.dropped_files";

/// Name of the signature.
pub const NAME: &str = "dropped_files";

/// Signature matching when the `dropped` result lists at least one file.
///
/// Each dropped file's name is recorded as evidence.
#[derive(Debug)]
pub struct DroppedFiles {
    metadata: SignatureMetadata,
}

impl Default for DroppedFiles {
    fn default() -> Self {
        Self {
            metadata: SignatureMetadata::new(NAME)
                .with_description("Drops files on the filesystem")
                .with_severity(1)
                .with_minimum("0.1"),
        }
    }
}

impl Signature for DroppedFiles {
    fn metadata(&self) -> &SignatureMetadata {
        &self.metadata
    }

    fn run(&mut self, results: ResultDocument) -> Result<bool, UnitError> {
        let Some(Value::Array(files)) = results.get(dropped::KEY) else {
            return Ok(false);
        };
        for file in files {
            if let Some(name) = file.get("name").and_then(Value::as_str) {
                self.metadata.data.push(json!({ "file": name }));
            }
        }
        Ok(!files.is_empty())
    }
}

/// Module registering [`DroppedFiles`].
#[must_use]
pub fn module() -> PluginModule {
    PluginModule::new(MODULE_PATH, |registrar| {
        registrar.register_signature(NAME, || Box::new(DroppedFiles::default()))
    })
}
