//! Command-line configuration shared by every subcommand.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Args, ValueEnum};
use tfmirror_lib::store::{BlobStore, FsBlobStore};

/// Default overall deadline for one command.
pub const DEFAULT_TIMEOUT: &str = "15m";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Backend {
  /// Buckets are directories under --store-root
  #[default]
  Fs,
  /// Amazon S3, configured from the standard AWS environment
  S3,
}

#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
  /// Storage backend holding the buckets
  #[arg(long, global = true, value_enum, env = "TFMIRROR_BACKEND", default_value_t = Backend::Fs)]
  pub backend: Backend,

  /// Directory whose subdirectories are the buckets (fs backend)
  #[arg(long, global = true, env = "TFMIRROR_STORE_ROOT")]
  pub store_root: Option<PathBuf>,

  /// Give up on the whole command after this long (e.g. "90s", "15m")
  #[arg(
    long,
    global = true,
    env = "TFMIRROR_TIMEOUT",
    default_value = DEFAULT_TIMEOUT,
    value_parser = humantime::parse_duration
  )]
  pub timeout: Duration,
}

impl GlobalArgs {
  /// Construct the configured blob store.
  pub async fn open_store(&self) -> Result<Box<dyn BlobStore>> {
    match self.backend {
      Backend::Fs => {
        let Some(root) = &self.store_root else {
          bail!("--store-root (or TFMIRROR_STORE_ROOT) is required with the fs backend");
        };
        Ok(Box::new(FsBlobStore::new(root)))
      }
      Backend::S3 => open_s3().await,
    }
  }
}

#[cfg(feature = "s3")]
async fn open_s3() -> Result<Box<dyn BlobStore>> {
  Ok(Box::new(tfmirror_lib::store::S3BlobStore::from_env().await))
}

#[cfg(not(feature = "s3"))]
async fn open_s3() -> Result<Box<dyn BlobStore>> {
  bail!("this build has no S3 support; rebuild with `--features s3`")
}

#[cfg(test)]
mod tests {
  use super::*;

  fn args(backend: Backend, store_root: Option<&str>) -> GlobalArgs {
    GlobalArgs {
      backend,
      store_root: store_root.map(PathBuf::from),
      timeout: humantime::parse_duration(DEFAULT_TIMEOUT).unwrap(),
    }
  }

  #[test]
  fn default_timeout_is_fifteen_minutes() {
    assert_eq!(args(Backend::Fs, None).timeout, Duration::from_secs(15 * 60));
  }

  #[tokio::test]
  async fn fs_backend_requires_root() {
    let err = args(Backend::Fs, None).open_store().await.err().unwrap();
    assert!(err.to_string().contains("--store-root"));
    assert!(args(Backend::Fs, Some("/tmp")).open_store().await.is_ok());
  }
}
