//! Building a mirror from a local build tree and publishing it.
//!
//! The remote index is loaded before anything is inserted, so the published
//! index lists both the versions already in the mirror and the ones built now.

use std::path::Path;

use thiserror::Error;
use tracing::{Instrument, info, info_span};

use crate::artifacts::{Artifacts, ArtifactsError};
use crate::discover::{DiscoverError, discover_binaries};
use crate::provider::{Provider, RemoteMirror};
use crate::store::{BlobError, BlobStore};

#[derive(Debug, Error)]
pub enum PopulateError {
  #[error("bucket {bucket} is not accessible: {source}")]
  Bucket {
    bucket: String,
    #[source]
    source: BlobError,
  },

  #[error(transparent)]
  Discover(#[from] DiscoverError),

  #[error(transparent)]
  Artifacts(#[from] ArtifactsError),
}

#[derive(Debug, Clone, Default)]
pub struct PopulateReport {
  /// Versions built from the local tree, sorted and deduplicated.
  pub built_versions: Vec<String>,
  pub archives: usize,
  /// Every version in the published index.
  pub mirror_versions: Vec<String>,
  pub published: Vec<String>,
}

pub async fn populate(
  store: &dyn BlobStore,
  provider: &Provider,
  bucket: &str,
  build_dir: &Path,
) -> Result<PopulateReport, PopulateError> {
  let mirror = provider.mirror_in(bucket);
  let span = info_span!("populate", mirror = %mirror);
  run(store, provider, &mirror, build_dir).instrument(span).await
}

async fn run(
  store: &dyn BlobStore,
  provider: &Provider,
  mirror: &RemoteMirror,
  build_dir: &Path,
) -> Result<PopulateReport, PopulateError> {
  store.head_bucket(&mirror.bucket).await.map_err(|source| PopulateError::Bucket {
    bucket: mirror.bucket.clone(),
    source,
  })?;

  let artifacts = Artifacts::new(provider.clone())?;
  artifacts.load_remote_index(store, mirror).await?;

  let binaries = discover_binaries(build_dir, &provider.name)?;
  info!(build_dir = %build_dir.display(), binaries = binaries.len(), "discovered binaries");

  let mut built_versions = Vec::new();
  for binary in &binaries {
    artifacts
      .add_binary(&binary.version, &binary.platform, &binary.arch, &binary.path)
      .await?;
    built_versions.push(binary.version.clone());
  }
  built_versions.sort();
  built_versions.dedup();

  artifacts.write_metadata().await?;
  let published = artifacts.publish_to_remote_bucket(store, mirror).await?;
  let mirror_versions = artifacts.versions().await?;
  artifacts.discard().await;

  Ok(PopulateReport {
    built_versions,
    archives: binaries.len(),
    mirror_versions,
    published,
  })
}
