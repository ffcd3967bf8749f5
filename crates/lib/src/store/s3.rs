//! Amazon S3 blob store (feature `s3`).
//!
//! Credentials and region come from the standard AWS environment chain.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::head_bucket::HeadBucketError;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::debug;

use super::{BlobError, BlobStore, ObjectRef};

#[derive(Debug, Clone)]
pub struct S3BlobStore {
  client: Client,
}

impl S3BlobStore {
  pub fn new(client: Client) -> Self {
    Self { client }
  }

  /// Build a client from the default AWS configuration chain.
  pub async fn from_env() -> Self {
    let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    Self::new(Client::new(&config))
  }
}

/// Characters left as-is in a key segment of `x-amz-copy-source`.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// URL-encoded `bucket/key` for a server-side copy. Separators between key
/// segments stay literal.
fn copy_source(bucket: &str, key: &str) -> String {
  let key = key
    .split('/')
    .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT).to_string())
    .collect::<Vec<_>>()
    .join("/");
  format!("{}/{}", bucket, key)
}

fn backend_error(operation: &'static str, bucket: &str, key: &str, err: impl std::error::Error) -> BlobError {
  BlobError::Backend {
    operation,
    bucket: bucket.to_string(),
    key: key.to_string(),
    message: DisplayErrorContext(&err).to_string(),
  }
}

/// Only a missing bucket is `BucketNotFound`; auth, transport and timeout
/// failures keep their cause.
fn head_bucket_error(bucket: &str, err: SdkError<HeadBucketError>) -> BlobError {
  if let Some(service) = err.as_service_error()
    && service.is_not_found()
  {
    return BlobError::BucketNotFound {
      bucket: bucket.to_string(),
    };
  }
  backend_error("head_bucket", bucket, "", err)
}

#[async_trait]
impl BlobStore for S3BlobStore {
  async fn head_bucket(&self, bucket: &str) -> Result<(), BlobError> {
    self
      .client
      .head_bucket()
      .bucket(bucket)
      .send()
      .await
      .map_err(|err| head_bucket_error(bucket, err))?;
    Ok(())
  }

  async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<u64>, BlobError> {
    match self.client.head_object().bucket(bucket).key(key).send().await {
      Ok(output) => Ok(Some(output.content_length().unwrap_or(0).max(0) as u64)),
      Err(err) => {
        if let Some(service) = err.as_service_error()
          && service.is_not_found()
        {
          return Ok(None);
        }
        Err(backend_error("head_object", bucket, key, err))
      }
    }
  }

  async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, BlobError> {
    let output = match self.client.get_object().bucket(bucket).key(key).send().await {
      Ok(output) => output,
      Err(err) => {
        if let Some(service) = err.as_service_error()
          && service.is_no_such_key()
        {
          return Err(BlobError::not_found(bucket, key));
        }
        return Err(backend_error("get_object", bucket, key, err));
      }
    };

    let body = output
      .body
      .collect()
      .await
      .map_err(|err| backend_error("get_object", bucket, key, err))?;
    Ok(body.into_bytes())
  }

  async fn put_object(&self, bucket: &str, key: &str, body: Bytes, content_type: &str) -> Result<(), BlobError> {
    debug!(bucket, key, content_type, size = body.len(), "put object");
    self
      .client
      .put_object()
      .bucket(bucket)
      .key(key)
      .content_type(content_type)
      .body(ByteStream::from(body))
      .send()
      .await
      .map_err(|err| backend_error("put_object", bucket, key, err))?;
    Ok(())
  }

  async fn copy_object(&self, source: &ObjectRef, dest_bucket: &str, dest_key: &str) -> Result<(), BlobError> {
    debug!(%source, dest_bucket, dest_key, "copy object");
    self
      .client
      .copy_object()
      .copy_source(copy_source(&source.bucket, &source.key))
      .bucket(dest_bucket)
      .key(dest_key)
      .send()
      .await
      .map_err(|err| backend_error("copy_object", dest_bucket, dest_key, err))?;
    Ok(())
  }
}
