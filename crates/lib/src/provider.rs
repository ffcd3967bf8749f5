//! Provider identity and remote mirror locations.

use std::fmt;

/// Identifies the provider a mirror holds.
///
/// `name` is the binary/archive name (e.g. `terraform-provider-example`) and
/// `key_prefix` is the path under which the mirror lives in a bucket
/// (e.g. `registry.terraform.io/acme/example`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
  pub name: String,
  pub key_prefix: String,
}

impl Provider {
  pub fn new(name: impl Into<String>, key_prefix: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      key_prefix: normalize_prefix(&key_prefix.into()),
    }
  }

  /// File name of the archive for one `(version, platform, arch)` triple.
  pub fn archive_file_name(&self, version: &str, platform: &str, arch: &str) -> String {
    format!("{}_{}_{}_{}.zip", self.name, version, platform, arch)
  }

  /// The remote location of this provider's mirror in `bucket`.
  pub fn mirror_in(&self, bucket: impl Into<String>) -> RemoteMirror {
    RemoteMirror::new(bucket, self.key_prefix.clone())
  }
}

/// A provider mirror inside a bucket: the bucket plus the provider key prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMirror {
  pub bucket: String,
  pub prefix: String,
}

impl RemoteMirror {
  pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
    Self {
      bucket: bucket.into(),
      prefix: normalize_prefix(&prefix.into()),
    }
  }

  /// Full object key for a file name relative to the mirror root.
  pub fn key(&self, file_name: &str) -> String {
    if self.prefix.is_empty() {
      file_name.to_string()
    } else {
      format!("{}/{}", self.prefix, file_name)
    }
  }

  pub fn index_key(&self) -> String {
    self.key(crate::consts::INDEX_FILENAME)
  }

  pub fn release_key(&self, version: &str) -> String {
    self.key(&format!("{}.json", version))
  }
}

impl fmt::Display for RemoteMirror {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.bucket, self.prefix)
  }
}

fn normalize_prefix(prefix: &str) -> String {
  prefix.trim_matches('/').to_string()
}
