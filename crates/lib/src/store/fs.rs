//! Filesystem-backed blob store.
//!
//! # Layout
//!
//! ```text
//! {root}/
//! └── <bucket>/
//!     └── <key...>        # object keys map to relative paths
//! ```
//!
//! Buckets must already exist as directories. Objects are written to a hidden
//! temp file next to the target and renamed into place.

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use super::{BlobError, BlobStore, ObjectRef};

#[derive(Debug, Clone)]
pub struct FsBlobStore {
  root: PathBuf,
}

impl FsBlobStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn bucket_path(&self, bucket: &str) -> Result<PathBuf, BlobError> {
    if bucket.is_empty() || !is_plain_relative(Path::new(bucket)) || bucket.contains('/') {
      return Err(BlobError::BucketNotFound {
        bucket: bucket.to_string(),
      });
    }
    Ok(self.root.join(bucket))
  }

  fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, BlobError> {
    let bucket_path = self.bucket_path(bucket)?;
    if key.is_empty() || !is_plain_relative(Path::new(key)) {
      return Err(BlobError::InvalidKey { key: key.to_string() });
    }
    Ok(bucket_path.join(key))
  }

  async fn ensure_bucket(&self, bucket: &str) -> Result<(), BlobError> {
    let path = self.bucket_path(bucket)?;
    match fs::metadata(&path).await {
      Ok(meta) if meta.is_dir() => Ok(()),
      _ => Err(BlobError::BucketNotFound {
        bucket: bucket.to_string(),
      }),
    }
  }

  async fn write_atomic(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), BlobError> {
    let io_err = |source| BlobError::Io {
      bucket: bucket.to_string(),
      key: key.to_string(),
      source,
    };

    self.ensure_bucket(bucket).await?;
    let path = self.object_path(bucket, key)?;
    let parent = path.parent().ok_or_else(|| BlobError::InvalidKey { key: key.to_string() })?;
    fs::create_dir_all(parent).await.map_err(io_err)?;

    let file_name = path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| BlobError::InvalidKey { key: key.to_string() })?;
    let temp_path = parent.join(format!(".{}.tmp", file_name));

    fs::write(&temp_path, body).await.map_err(io_err)?;
    fs::rename(&temp_path, &path).await.map_err(io_err)?;
    Ok(())
  }
}

/// Only normal components: no absolute paths, `..`, or `.`.
fn is_plain_relative(path: &Path) -> bool {
  path.components().all(|c| matches!(c, Component::Normal(_)))
}

#[async_trait]
impl BlobStore for FsBlobStore {
  async fn head_bucket(&self, bucket: &str) -> Result<(), BlobError> {
    self.ensure_bucket(bucket).await
  }

  async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<u64>, BlobError> {
    self.ensure_bucket(bucket).await?;
    let path = self.object_path(bucket, key)?;
    match fs::metadata(&path).await {
      Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
      Ok(_) => Ok(None),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
      Err(source) => Err(BlobError::Io {
        bucket: bucket.to_string(),
        key: key.to_string(),
        source,
      }),
    }
  }

  async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, BlobError> {
    self.ensure_bucket(bucket).await?;
    let path = self.object_path(bucket, key)?;
    match fs::read(&path).await {
      Ok(content) => Ok(Bytes::from(content)),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BlobError::not_found(bucket, key)),
      Err(source) => Err(BlobError::Io {
        bucket: bucket.to_string(),
        key: key.to_string(),
        source,
      }),
    }
  }

  async fn put_object(&self, bucket: &str, key: &str, body: Bytes, content_type: &str) -> Result<(), BlobError> {
    debug!(bucket, key, content_type, size = body.len(), "put object");
    self.write_atomic(bucket, key, &body).await
  }

  async fn copy_object(&self, source: &ObjectRef, dest_bucket: &str, dest_key: &str) -> Result<(), BlobError> {
    debug!(%source, dest_bucket, dest_key, "copy object");
    let body = self.get_object(&source.bucket, &source.key).await?;
    self.write_atomic(dest_bucket, dest_key, &body).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn store_with_bucket(bucket: &str) -> (TempDir, FsBlobStore) {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join(bucket)).unwrap();
    let store = FsBlobStore::new(temp.path());
    (temp, store)
  }

  #[tokio::test]
  async fn head_bucket_requires_directory() {
    let (_temp, store) = store_with_bucket("releases");
    store.head_bucket("releases").await.unwrap();
    assert!(matches!(
      store.head_bucket("missing").await,
      Err(BlobError::BucketNotFound { .. })
    ));
  }

  #[tokio::test]
  async fn put_then_get_and_head() {
    let (_temp, store) = store_with_bucket("releases");
    store
      .put_object("releases", "a/b/index.json", Bytes::from_static(b"{}"), "application/json")
      .await
      .unwrap();

    assert_eq!(store.head_object("releases", "a/b/index.json").await.unwrap(), Some(2));
    assert_eq!(store.get_object("releases", "a/b/index.json").await.unwrap(), Bytes::from_static(b"{}"));
  }

  #[tokio::test]
  async fn missing_object_is_none_on_head_and_not_found_on_get() {
    let (_temp, store) = store_with_bucket("releases");
    assert_eq!(store.head_object("releases", "index.json").await.unwrap(), None);
    assert!(store.get_object("releases", "index.json").await.unwrap_err().is_not_found());
  }

  #[tokio::test]
  async fn put_into_missing_bucket_fails() {
    let (_temp, store) = store_with_bucket("releases");
    let result = store
      .put_object("missing", "index.json", Bytes::from_static(b"{}"), "application/json")
      .await;
    assert!(matches!(result, Err(BlobError::BucketNotFound { .. })));
  }

  #[tokio::test]
  async fn keys_cannot_escape_bucket() {
    let (_temp, store) = store_with_bucket("releases");
    let result = store
      .put_object("releases", "../outside.json", Bytes::from_static(b"{}"), "application/json")
      .await;
    assert!(matches!(result, Err(BlobError::InvalidKey { .. })));
  }

  #[tokio::test]
  async fn copy_crosses_buckets() {
    let (temp, store) = store_with_bucket("staging");
    std::fs::create_dir_all(temp.path().join("production")).unwrap();
    store
      .put_object("staging", "p/1.0.0.json", Bytes::from_static(b"{\"archives\":{}}"), "application/json")
      .await
      .unwrap();

    store
      .copy_object(&ObjectRef::new("staging", "p/1.0.0.json"), "production", "p/1.0.0.json")
      .await
      .unwrap();

    assert_eq!(
      store.get_object("production", "p/1.0.0.json").await.unwrap(),
      Bytes::from_static(b"{\"archives\":{}}")
    );
  }

  #[tokio::test]
  async fn copy_of_missing_source_is_not_found() {
    let (_temp, store) = store_with_bucket("staging");
    let result = store
      .copy_object(&ObjectRef::new("staging", "nope.zip"), "staging", "copy.zip")
      .await;
    assert!(result.unwrap_err().is_not_found());
  }
}
