//! The mirror's version index (`index.json`).
//!
//! ```json
//! { "versions": { "1.2.3": {}, "1.3.0": {} } }
//! ```
//!
//! Each version maps to a presence marker. Markers are empty today, but fields
//! written by other tools are kept and written back unchanged, as are unknown
//! fields at the document root.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Presence marker for one version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorIndex {
  #[serde(default)]
  pub versions: BTreeMap<String, IndexEntry>,

  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl MirrorIndex {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn contains(&self, version: &str) -> bool {
    self.versions.contains_key(version)
  }

  /// Mark `version` present. An existing marker is left as it is.
  pub fn insert(&mut self, version: &str) {
    self.versions.entry(version.to_string()).or_default();
  }

  pub fn versions(&self) -> impl Iterator<Item = &str> {
    self.versions.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.versions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.versions.is_empty()
  }

  pub fn to_json(&self) -> serde_json::Result<String> {
    serde_json::to_string_pretty(self)
  }

  pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
    serde_json::from_slice(bytes)
  }
}
