//! The aggregated result document and signature match records.
//!
//! A [`ResultDocument`] maps each processing unit's key to the value it
//! produced. Once every signature has run, the coordinator stores the ordered
//! [`MatchRecord`] list under the reserved [`SIGNATURES_KEY`]. The document
//! serialises as a plain JSON object; how (or whether) it is persisted is left
//! to the caller.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::contract::SignatureMetadata;

/// Reserved key holding the severity-ordered match list.
pub const SIGNATURES_KEY: &str = "signatures";

/// Mapping from result key to the value a processing unit produced.
///
/// Keys are unique: inserting an existing key replaces the earlier value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultDocument {
    entries: Map<String, Value>,
}

impl ResultDocument {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, returning the value it replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Looks up a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Looks up a value by key for modification.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.get_mut(key)
    }

    /// Removes a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Returns `true` when `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterates over the keys in the document.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterates over key/value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Number of keys in the document.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the document holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stores the match list under [`SIGNATURES_KEY`], replacing any value a
    /// processing unit may have written there.
    pub fn set_signatures(&mut self, matches: &[MatchRecord]) {
        let records = matches.iter().map(MatchRecord::to_value).collect();
        self.entries
            .insert(SIGNATURES_KEY.to_owned(), Value::Array(records));
    }

    /// Reads the match list back from [`SIGNATURES_KEY`].
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] when the stored value is not a list of
    /// match records.
    pub fn signatures(&self) -> Result<Vec<MatchRecord>, serde_json::Error> {
        match self.entries.get(SIGNATURES_KEY) {
            Some(value) => Vec::<MatchRecord>::deserialize(value),
            None => Ok(Vec::new()),
        }
    }

    /// Converts the document into a JSON object.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.entries)
    }

    /// Borrows the underlying JSON map.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.entries
    }
}

impl From<Map<String, Value>> for ResultDocument {
    fn from(entries: Map<String, Value>) -> Self {
        Self { entries }
    }
}

/// Immutable snapshot of a signature's metadata taken when it matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Signature name.
    pub name: String,
    /// Signature description.
    pub description: String,
    /// Ordinal severity used to order matches.
    pub severity: u32,
    /// External references.
    pub references: Vec<String>,
    /// Evidence collected by the signature.
    pub data: Vec<Value>,
    /// Whether the match should raise an alert.
    pub alert: bool,
}

impl MatchRecord {
    /// Renders the record as a JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "severity": self.severity,
            "references": self.references,
            "data": self.data,
            "alert": self.alert,
        })
    }
}

impl From<&SignatureMetadata> for MatchRecord {
    fn from(metadata: &SignatureMetadata) -> Self {
        Self {
            name: metadata.name.clone(),
            description: metadata.description.clone(),
            severity: metadata.severity,
            references: metadata.references.clone(),
            data: metadata.data.clone(),
            alert: metadata.alert,
        }
    }
}

/// Orders matches by ascending severity, keeping discovery order for ties.
pub fn sort_by_severity(matches: &mut [MatchRecord]) {
    matches.sort_by_key(|record| record.severity);
}
