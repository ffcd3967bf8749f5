//! Per-version release manifests (`<version>.json`).
//!
//! A manifest maps `<platform>_<arch>` to the archive built for that target, in
//! the layout Terraform's network mirror protocol expects:
//!
//! ```json
//! {
//!   "archives": {
//!     "linux_amd64": { "url": "terraform-provider-x_1.2.3_linux_amd64.zip", "hashes": ["h1:..."] }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::archive::Archive;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseManifest {
  #[serde(default)]
  pub archives: BTreeMap<String, Archive>,
}

impl ReleaseManifest {
  pub fn new() -> Self {
    Self::default()
  }

  /// Key used for a `(platform, arch)` pair inside `archives`.
  pub fn target_key(platform: &str, arch: &str) -> String {
    format!("{}_{}", platform, arch)
  }

  /// Record the archive for a target. A later archive for the same target
  /// replaces the earlier one and is returned.
  pub fn add_archive(&mut self, platform: &str, arch: &str, archive: Archive) -> Option<Archive> {
    self.archives.insert(Self::target_key(platform, arch), archive)
  }

  pub fn get(&self, platform: &str, arch: &str) -> Option<&Archive> {
    self.archives.get(&Self::target_key(platform, arch))
  }

  pub fn len(&self) -> usize {
    self.archives.len()
  }

  pub fn is_empty(&self) -> bool {
    self.archives.is_empty()
  }

  pub fn archives(&self) -> impl Iterator<Item = &Archive> {
    self.archives.values()
  }

  pub fn to_json(&self) -> serde_json::Result<String> {
    serde_json::to_string_pretty(self)
  }

  pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
    serde_json::from_slice(bytes)
  }
}
