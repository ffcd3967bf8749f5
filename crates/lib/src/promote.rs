//! Promotion of one release from a source mirror to a destination mirror.
//!
//! Promotion runs these steps in order and stops at the first failure:
//! 1. Both buckets must be reachable.
//! 2. The source index is loaded and must list the version.
//! 3. The destination index is loaded and must not list the version.
//! 4. The release manifest and its archives are copied server-side.
//! 5. The destination index is read again. If the version has appeared it is
//!    rejected; otherwise it is added and the index is republished.
//!
//! The source mirror is only read. Until the final publish the destination
//! index does not list the version, so an interrupted promotion can be re-run;
//! the copies simply overwrite what was copied before.
//!
//! There is no lock on the destination index. Step 5 rejects a concurrent
//! promotion of the same version that published before it, and keeps versions
//! another writer added in the meantime. A writer that publishes between the
//! re-read and the upload is not detected.

use thiserror::Error;
use tracing::{Instrument, info, info_span};

use crate::artifacts::{Artifacts, ArtifactsError};
use crate::provider::{Provider, RemoteMirror};
use crate::store::{BlobError, BlobStore, ObjectRef};

#[derive(Debug, Error)]
pub enum PromoteError {
  #[error("source bucket {bucket} is not accessible: {source}")]
  SourceBucket {
    bucket: String,
    #[source]
    source: BlobError,
  },

  #[error("destination bucket {bucket} is not accessible: {source}")]
  DestinationBucket {
    bucket: String,
    #[source]
    source: BlobError,
  },

  #[error("version {version} not found in {mirror}")]
  VersionNotFound { version: String, mirror: String },

  #[error("version {version} already promoted to {mirror}")]
  AlreadyPromoted { version: String, mirror: String },

  #[error(transparent)]
  Artifacts(#[from] ArtifactsError),
}

/// What to promote and where.
#[derive(Debug, Clone)]
pub struct PromoteRequest {
  /// Provider binary name; only used to label the registries.
  pub provider_name: String,
  pub version: String,
  pub source: RemoteMirror,
  pub destination: RemoteMirror,
}

#[derive(Debug, Clone)]
pub struct PromoteReport {
  pub version: String,
  /// Objects written to the destination bucket by the copy phase.
  pub copied: Vec<ObjectRef>,
  /// Keys uploaded by the final publish.
  pub published: Vec<String>,
}

pub async fn promote(store: &dyn BlobStore, request: &PromoteRequest) -> Result<PromoteReport, PromoteError> {
  let span = info_span!("promote", version = %request.version);
  run(store, request).instrument(span).await
}

async fn run(store: &dyn BlobStore, request: &PromoteRequest) -> Result<PromoteReport, PromoteError> {
  let PromoteRequest {
    provider_name,
    version,
    source,
    destination,
  } = request;

  store
    .head_bucket(&source.bucket)
    .await
    .map_err(|e| PromoteError::SourceBucket {
      bucket: source.bucket.clone(),
      source: e,
    })?;
  store
    .head_bucket(&destination.bucket)
    .await
    .map_err(|e| PromoteError::DestinationBucket {
      bucket: destination.bucket.clone(),
      source: e,
    })?;

  let source_artifacts = Artifacts::new(Provider::new(provider_name.as_str(), source.prefix.as_str()))?
    .with_span(info_span!("source", mirror = %source));
  source_artifacts.load_remote_index(store, source).await?;
  if !source_artifacts.has_version(version).await? {
    return Err(PromoteError::VersionNotFound {
      version: version.clone(),
      mirror: source.to_string(),
    });
  }

  let destination_artifacts = Artifacts::new(Provider::new(provider_name.as_str(), destination.prefix.as_str()))?
    .with_span(info_span!("destination", mirror = %destination));
  destination_artifacts.load_remote_index(store, destination).await?;
  ensure_absent(&destination_artifacts, version, destination).await?;

  info!(from = %source, to = %destination, "copying release");
  let copied = source_artifacts
    .copy_release_artifacts_between_remote_buckets(store, source, destination, version)
    .await?;

  destination_artifacts.load_remote_index(store, destination).await?;
  ensure_absent(&destination_artifacts, version, destination).await?;
  destination_artifacts.record_copied_version(version).await?;
  destination_artifacts.write_metadata().await?;
  let published = destination_artifacts
    .publish_to_remote_bucket(store, destination)
    .await?;

  source_artifacts.discard().await;
  destination_artifacts.discard().await;

  info!(objects = copied.len(), "promotion complete");
  Ok(PromoteReport {
    version: version.clone(),
    copied,
    published,
  })
}

async fn ensure_absent(artifacts: &Artifacts, version: &str, mirror: &RemoteMirror) -> Result<(), PromoteError> {
  if artifacts.has_version(version).await? {
    return Err(PromoteError::AlreadyPromoted {
      version: version.to_string(),
      mirror: mirror.to_string(),
    });
  }
  Ok(())
}
