//! Packaging of provider binaries into mirror archives.
//!
//! Each archive is a single-entry zip holding one platform binary. The entry keeps
//! the source file's mode and modification time, and the archive is identified by
//! its Terraform `h1:` hash, computed over the uncompressed entries only. Two
//! archives of the same binary bytes therefore share a hash even when they were
//! built at different times or on different machines.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::consts::H1_HASH_PREFIX;

/// One published archive as referenced from a release manifest.
///
/// `url` is relative to the manifest document that lists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archive {
  pub url: String,
  pub hashes: Vec<String>,
}

impl Archive {
  pub fn new(url: impl Into<String>, hash: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      hashes: vec![hash.into()],
    }
  }
}

/// Result of packaging a binary: where the archive was written and its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArchive {
  pub path: PathBuf,
  pub hash: String,
  pub size: u64,
}

#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("failed to read {path}: {source}")]
  ReadSource {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("not a regular file: {0}")]
  NotAFile(PathBuf),

  #[error("file name is not valid UTF-8: {0}")]
  InvalidFileName(PathBuf),

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("zip error in {path}: {source}")]
  Zip {
    path: PathBuf,
    #[source]
    source: zip::result::ZipError,
  },

  #[error("archive entry name contains a newline: {0:?}")]
  NewlineInEntryName(String),
}

/// Package `source` as a single-entry zip at `dest` and hash the result.
///
/// The entry is named after the source file. I/O failures on either side are
/// returned as-is; nothing is retried.
pub fn build_archive(source: &Path, dest: &Path) -> Result<PackagedArchive, ArchiveError> {
  let read_err = |e| ArchiveError::ReadSource {
    path: source.to_path_buf(),
    source: e,
  };
  let write_err = |e| ArchiveError::Write {
    path: dest.to_path_buf(),
    source: e,
  };
  let zip_err = |e| ArchiveError::Zip {
    path: dest.to_path_buf(),
    source: e,
  };

  let metadata = fs::metadata(source).map_err(read_err)?;
  if !metadata.is_file() {
    return Err(ArchiveError::NotAFile(source.to_path_buf()));
  }

  let entry_name = source
    .file_name()
    .and_then(|n| n.to_str())
    .ok_or_else(|| ArchiveError::InvalidFileName(source.to_path_buf()))?;

  let mut options = SimpleFileOptions::default()
    .compression_method(CompressionMethod::Deflated)
    .last_modified_time(zip_timestamp(metadata.modified().ok()));

  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    options = options.unix_permissions(metadata.permissions().mode());
  }

  let mut input = File::open(source).map_err(read_err)?;
  let output = File::create(dest).map_err(write_err)?;

  let mut writer = ZipWriter::new(BufWriter::new(output));
  writer.start_file(entry_name, options).map_err(zip_err)?;
  io::copy(&mut input, &mut writer).map_err(write_err)?;
  let mut output = writer.finish().map_err(zip_err)?;
  output.flush().map_err(write_err)?;
  drop(output);

  let size = fs::metadata(dest).map_err(write_err)?.len();
  let hash = hash_zip(dest)?;

  debug!(source = %source.display(), archive = %dest.display(), %hash, size, "archive built");

  Ok(PackagedArchive {
    path: dest.to_path_buf(),
    hash,
    size,
  })
}

/// Compute the Terraform `h1:` hash of a zip file.
///
/// Entries are sorted by name; for each, the line
/// `"<hex sha256 of contents>  <name>\n"` is fed into an outer SHA-256 whose
/// digest is base64-encoded. Compression and timestamps do not contribute.
pub fn hash_zip(path: &Path) -> Result<String, ArchiveError> {
  let zip_err = |e| ArchiveError::Zip {
    path: path.to_path_buf(),
    source: e,
  };

  let file = File::open(path).map_err(|e| ArchiveError::ReadSource {
    path: path.to_path_buf(),
    source: e,
  })?;
  let mut archive = ZipArchive::new(BufReader::new(file)).map_err(zip_err)?;

  let mut lines = Vec::with_capacity(archive.len());
  for i in 0..archive.len() {
    let mut entry = archive.by_index(i).map_err(zip_err)?;
    let name = entry.name().to_string();
    if name.contains('\n') {
      return Err(ArchiveError::NewlineInEntryName(name));
    }

    let mut hasher = Sha256::new();
    io::copy(&mut entry, &mut hasher).map_err(|e| ArchiveError::ReadSource {
      path: path.to_path_buf(),
      source: e,
    })?;
    lines.push((name, hex::encode(hasher.finalize())));
  }
  lines.sort();

  let mut summary = Sha256::new();
  for (name, digest) in &lines {
    summary.update(format!("{}  {}\n", digest, name).as_bytes());
  }

  Ok(format!("{}{}", H1_HASH_PREFIX, BASE64.encode(summary.finalize())))
}

/// Zip timestamps only cover 1980..=2107; anything outside falls back to the epoch of the format.
fn zip_timestamp(modified: Option<SystemTime>) -> zip::DateTime {
  modified
    .and_then(|time| {
      let time = chrono::DateTime::<Utc>::from(time);
      zip::DateTime::from_date_and_time(
        u16::try_from(time.year()).ok()?,
        time.month() as u8,
        time.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
      )
      .ok()
    })
    .unwrap_or_default()
}
