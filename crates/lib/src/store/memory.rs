//! In-memory blob store.
//!
//! Keeps every object in a mutex-guarded map and counts mutating calls, so
//! callers can check that an operation left storage untouched. Copy failures
//! can be injected to exercise partially completed promotions.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use super::{BlobError, BlobStore, ObjectRef};

#[derive(Debug, Clone)]
struct StoredObject {
  body: Bytes,
  content_type: String,
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
  buckets: Mutex<HashMap<String, BTreeMap<String, StoredObject>>>,
  failing_copy_suffix: Mutex<Option<String>>,
  writes: AtomicUsize,
}

impl MemoryBlobStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_buckets(buckets: &[&str]) -> Self {
    let store = Self::new();
    for bucket in buckets {
      store.create_bucket(bucket);
    }
    store
  }

  pub fn create_bucket(&self, bucket: &str) {
    self.lock().entry(bucket.to_string()).or_default();
  }

  /// Body of an object, if present.
  pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
    self.lock().get(bucket)?.get(key).map(|o| o.body.clone())
  }

  pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
    self.lock().get(bucket)?.get(key).map(|o| o.content_type.clone())
  }

  /// All keys in a bucket, sorted.
  pub fn keys(&self, bucket: &str) -> Vec<String> {
    self
      .lock()
      .get(bucket)
      .map(|objects| objects.keys().cloned().collect())
      .unwrap_or_default()
  }

  /// Number of successful `put_object` and `copy_object` calls so far.
  pub fn write_count(&self) -> usize {
    self.writes.load(Ordering::SeqCst)
  }

  /// Make every copy whose destination key ends with `suffix` fail until cleared.
  pub fn fail_copies_to(&self, suffix: Option<&str>) {
    *self.failing_copy_suffix.lock().unwrap_or_else(|e| e.into_inner()) = suffix.map(str::to_string);
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, BTreeMap<String, StoredObject>>> {
    self.buckets.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn store(&self, bucket: &str, key: &str, object: StoredObject) -> Result<(), BlobError> {
    let mut buckets = self.lock();
    let objects = buckets.get_mut(bucket).ok_or_else(|| BlobError::BucketNotFound {
      bucket: bucket.to_string(),
    })?;
    objects.insert(key.to_string(), object);
    self.writes.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }

  fn fetch(&self, bucket: &str, key: &str) -> Result<StoredObject, BlobError> {
    let buckets = self.lock();
    let objects = buckets.get(bucket).ok_or_else(|| BlobError::BucketNotFound {
      bucket: bucket.to_string(),
    })?;
    objects.get(key).cloned().ok_or_else(|| BlobError::not_found(bucket, key))
  }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
  async fn head_bucket(&self, bucket: &str) -> Result<(), BlobError> {
    if self.lock().contains_key(bucket) {
      Ok(())
    } else {
      Err(BlobError::BucketNotFound {
        bucket: bucket.to_string(),
      })
    }
  }

  async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<u64>, BlobError> {
    match self.fetch(bucket, key) {
      Ok(object) => Ok(Some(object.body.len() as u64)),
      Err(BlobError::NotFound { .. }) => Ok(None),
      Err(e) => Err(e),
    }
  }

  async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, BlobError> {
    self.fetch(bucket, key).map(|o| o.body)
  }

  async fn put_object(&self, bucket: &str, key: &str, body: Bytes, content_type: &str) -> Result<(), BlobError> {
    self.store(
      bucket,
      key,
      StoredObject {
        body,
        content_type: content_type.to_string(),
      },
    )
  }

  async fn copy_object(&self, source: &ObjectRef, dest_bucket: &str, dest_key: &str) -> Result<(), BlobError> {
    let failing = self
      .failing_copy_suffix
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .clone();
    if let Some(suffix) = failing
      && dest_key.ends_with(&suffix)
    {
      return Err(BlobError::Backend {
        operation: "copy_object",
        bucket: dest_bucket.to_string(),
        key: dest_key.to_string(),
        message: "injected failure".to_string(),
      });
    }

    let object = self.fetch(&source.bucket, &source.key)?;
    self.store(dest_bucket, dest_key, object)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn writes_are_counted() {
    let store = MemoryBlobStore::with_buckets(&["a", "b"]);
    store
      .put_object("a", "k", Bytes::from_static(b"v"), "text/plain")
      .await
      .unwrap();
    store.copy_object(&ObjectRef::new("a", "k"), "b", "k").await.unwrap();
    let _ = store.get_object("b", "k").await.unwrap();

    assert_eq!(store.write_count(), 2);
    assert_eq!(store.object("b", "k").unwrap(), Bytes::from_static(b"v"));
    assert_eq!(store.content_type("b", "k").as_deref(), Some("text/plain"));
  }

  #[tokio::test]
  async fn missing_bucket_and_object() {
    let store = MemoryBlobStore::with_buckets(&["a"]);
    assert!(store.head_bucket("b").await.is_err());
    assert_eq!(store.head_object("a", "k").await.unwrap(), None);
    assert!(matches!(
      store.head_object("b", "k").await,
      Err(BlobError::BucketNotFound { .. })
    ));
  }

  #[tokio::test]
  async fn injected_copy_failure() {
    let store = MemoryBlobStore::with_buckets(&["a", "b"]);
    store
      .put_object("a", "x.zip", Bytes::from_static(b"z"), "application/zip")
      .await
      .unwrap();
    store.fail_copies_to(Some(".zip"));

    let result = store.copy_object(&ObjectRef::new("a", "x.zip"), "b", "x.zip").await;
    assert!(matches!(result, Err(BlobError::Backend { .. })));
    assert!(store.object("b", "x.zip").is_none());

    store.fail_copies_to(None);
    store.copy_object(&ObjectRef::new("a", "x.zip"), "b", "x.zip").await.unwrap();
  }
}
