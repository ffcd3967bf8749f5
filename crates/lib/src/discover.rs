//! Discovery of built provider binaries in a local build tree.
//!
//! The expected layout is one directory per target, each holding the binary
//! for one version:
//!
//! ```text
//! {build_dir}/
//! ├── <name>_<platform>_<arch>/
//! │   └── <name>_v<version>[.exe]
//! └── ...
//! ```
//!
//! Directories and files that do not follow this naming are skipped.

use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum DiscoverError {
  #[error("failed to read build directory {path}: {source}")]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("invalid provider name pattern: {0}")]
  Pattern(#[from] regex::Error),
}

/// One binary found in the build tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredBinary {
  pub version: String,
  pub platform: String,
  pub arch: String,
  pub path: PathBuf,
}

struct Patterns {
  target_dir: Regex,
  binary: Regex,
}

impl Patterns {
  fn for_provider(name: &str) -> Result<Self, DiscoverError> {
    let name = regex::escape(name);
    Ok(Self {
      target_dir: Regex::new(&format!(r"^{}_([a-z0-9]+)_([a-z0-9]+)$", name))?,
      binary: Regex::new(&format!(
        r"^{}_v?([0-9]+\.[0-9]+\.[0-9]+(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?)(?:\.exe)?$",
        name
      ))?,
    })
  }
}

/// Find every `<name>_<platform>_<arch>/<name>_<version>` binary under `build_dir`.
///
/// Results are ordered by directory name, then file name.
pub fn discover_binaries(build_dir: &Path, provider_name: &str) -> Result<Vec<DiscoveredBinary>, DiscoverError> {
  let patterns = Patterns::for_provider(provider_name)?;
  let mut found = Vec::new();

  for entry in read_level(build_dir) {
    let entry = entry.map_err(|source| DiscoverError::Walk {
      path: build_dir.to_path_buf(),
      source,
    })?;
    if !entry.file_type().is_dir() {
      continue;
    }

    let dir_name = entry.file_name().to_string_lossy();
    let Some(target) = patterns.target_dir.captures(&dir_name) else {
      debug!(dir = %dir_name, "skipping directory");
      continue;
    };
    let (platform, arch) = (target[1].to_string(), target[2].to_string());

    for binary in read_level(entry.path()) {
      let binary = binary.map_err(|source| DiscoverError::Walk {
        path: entry.path().to_path_buf(),
        source,
      })?;
      if !binary.file_type().is_file() {
        continue;
      }

      let file_name = binary.file_name().to_string_lossy();
      let Some(version) = patterns.binary.captures(&file_name) else {
        debug!(file = %file_name, "skipping file");
        continue;
      };

      found.push(DiscoveredBinary {
        version: version[1].to_string(),
        platform: platform.clone(),
        arch: arch.clone(),
        path: binary.path().to_path_buf(),
      });
    }
  }

  Ok(found)
}

fn read_level(dir: &Path) -> walkdir::IntoIter {
  WalkDir::new(dir)
    .min_depth(1)
    .max_depth(1)
    .sort_by_file_name()
    .into_iter()
}
