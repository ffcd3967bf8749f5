//! Object storage used to publish and promote mirrors.
//!
//! The mirror logic only needs five operations from a storage backend: bucket and
//! object existence checks, whole-object get and put, and a server-side copy that
//! may cross buckets. Retries, multipart transfers and credentials are the
//! backend's concern.
//!
//! Backends:
//! - [`FsBlobStore`]: buckets are directories under a root path
//! - [`MemoryBlobStore`]: in-process map, used by tests and dry runs
//! - `S3BlobStore` (feature `s3`): Amazon S3 and compatible services

mod fs;
mod memory;
#[cfg(feature = "s3")]
mod s3;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
#[cfg(feature = "s3")]
pub use s3::S3BlobStore;

/// A fully-qualified object location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
  pub bucket: String,
  pub key: String,
}

impl ObjectRef {
  pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
    Self {
      bucket: bucket.into(),
      key: key.into(),
    }
  }
}

impl fmt::Display for ObjectRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.bucket, self.key)
  }
}

#[derive(Debug, Error)]
pub enum BlobError {
  #[error("bucket not found or not accessible: {bucket}")]
  BucketNotFound { bucket: String },

  #[error("object not found: {bucket}/{key}")]
  NotFound { bucket: String, key: String },

  #[error("invalid object key: {key:?}")]
  InvalidKey { key: String },

  #[error("io error on {bucket}/{key}: {source}")]
  Io {
    bucket: String,
    key: String,
    #[source]
    source: std::io::Error,
  },

  #[error("{operation} failed for {bucket}/{key}: {message}")]
  Backend {
    operation: &'static str,
    bucket: String,
    key: String,
    message: String,
  },
}

impl BlobError {
  pub fn not_found(bucket: &str, key: &str) -> Self {
    BlobError::NotFound {
      bucket: bucket.to_string(),
      key: key.to_string(),
    }
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, BlobError::NotFound { .. })
  }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
  /// Succeeds if the bucket exists and is reachable with the current credentials.
  async fn head_bucket(&self, bucket: &str) -> Result<(), BlobError>;

  /// Size of the object in bytes, or `None` if it does not exist.
  async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<u64>, BlobError>;

  /// Fetch a whole object. A missing object is [`BlobError::NotFound`].
  async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, BlobError>;

  async fn put_object(&self, bucket: &str, key: &str, body: Bytes, content_type: &str) -> Result<(), BlobError>;

  /// Server-side copy of `source` to `dest_key` in `dest_bucket`. Overwrites the destination.
  async fn copy_object(&self, source: &ObjectRef, dest_bucket: &str, dest_key: &str) -> Result<(), BlobError>;
}
