//! The artifact registry for one provider mirror.
//!
//! [`Artifacts`] owns the mirror's version index, the release manifests built
//! during this run, and a private staging directory. Every operation takes the
//! same lock, so the index and the manifests are only ever changed together.
//!
//! # Staging Layout
//!
//! ```text
//! {staging}/
//! ├── index.json                                  # MirrorIndex
//! ├── <version>.json                              # ReleaseManifest per version
//! └── <name>_<version>_<platform>_<arch>.zip      # archives built this run
//! ```
//!
//! Publishing uploads the whole staging directory under the mirror's key
//! prefix, archives and manifests first and `index.json` last.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::TempDir;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use crate::archive::{Archive, ArchiveError, build_archive};
use crate::consts::{INDEX_FILENAME, content_type_for};
use crate::index::MirrorIndex;
use crate::provider::{Provider, RemoteMirror};
use crate::release::ReleaseManifest;
use crate::store::{BlobError, BlobStore, ObjectRef};

#[derive(Debug, Error)]
pub enum ArtifactsError {
  #[error("no index loaded")]
  NoIndexLoaded,

  #[error("failed to create staging directory: {0}")]
  CreateStaging(#[source] io::Error),

  #[error("failed to remove staging directory: {0}")]
  RemoveStaging(#[source] io::Error),

  #[error(transparent)]
  Archive(#[from] ArchiveError),

  #[error(transparent)]
  Blob(#[from] BlobError),

  #[error("release metadata for version {version} not found at {key}")]
  ReleaseNotFound { version: String, key: String },

  #[error("failed to parse {key}: {source}")]
  Parse {
    key: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize {name}: {source}")]
  Serialize {
    name: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to access staged file {path}: {source}")]
  Staging {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("release {version} references archive {url}, which is not inside the mirror")]
  ForeignArchiveUrl { version: String, url: String },

  #[error("release {version} is staged but missing from the index")]
  IncoherentIndex { version: String },

  #[error("archive task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
}

/// State guarded by the registry lock.
#[derive(Debug)]
struct State {
  /// `None` until an index is loaded or the first version is inserted.
  index: Option<MirrorIndex>,
  /// Manifests built by this run; each version here is also in `index`.
  releases: BTreeMap<String, ReleaseManifest>,
  /// Manifests fetched from remote mirrors, keyed by version.
  remote_releases: BTreeMap<String, ReleaseManifest>,
  staging: TempDir,
}

#[derive(Debug)]
pub struct Artifacts {
  provider: Provider,
  span: Span,
  state: Mutex<State>,
}

impl Artifacts {
  /// Create a registry with a fresh staging directory under the system temp dir.
  pub fn new(provider: Provider) -> Result<Self, ArtifactsError> {
    let staging = tempfile::Builder::new()
      .prefix("tfmirror-")
      .tempdir()
      .map_err(ArtifactsError::CreateStaging)?;
    Ok(Self::with_staging(provider, staging))
  }

  /// Create a registry whose staging directory lives under `parent`.
  pub fn new_in(provider: Provider, parent: &Path) -> Result<Self, ArtifactsError> {
    let staging = tempfile::Builder::new()
      .prefix("tfmirror-")
      .tempdir_in(parent)
      .map_err(ArtifactsError::CreateStaging)?;
    Ok(Self::with_staging(provider, staging))
  }

  fn with_staging(provider: Provider, staging: TempDir) -> Self {
    let span = info_span!("artifacts", provider = %provider.key_prefix);
    debug!(parent: &span, staging = %staging.path().display(), "staging directory created");
    Self {
      provider,
      span,
      state: Mutex::new(State {
        index: None,
        releases: BTreeMap::new(),
        remote_releases: BTreeMap::new(),
        staging,
      }),
    }
  }

  /// Run all of this registry's logging inside `span` instead of the default one.
  pub fn with_span(mut self, span: Span) -> Self {
    self.span = span;
    self
  }

  pub fn provider(&self) -> &Provider {
    &self.provider
  }

  pub async fn staging_dir(&self) -> PathBuf {
    self.state.lock().await.staging.path().to_path_buf()
  }

  /// Replace the in-memory index with the mirror's remote `index.json`.
  ///
  /// A missing index means the mirror has never been published; the registry
  /// continues with an empty index. Any other storage failure is returned.
  /// The previous in-memory index is discarded, so load before inserting.
  pub async fn load_remote_index(&self, store: &dyn BlobStore, mirror: &RemoteMirror) -> Result<(), ArtifactsError> {
    async {
      let mut state = self.state.lock().await;
      let index = fetch_index(store, mirror).await?;
      if let Some(previous) = &state.index
        && !previous.is_empty()
      {
        debug!(discarded = previous.len(), "replacing in-memory index");
      }
      state.index = Some(index);
      Ok(())
    }
    .instrument(self.span.clone())
    .await
  }

  /// Fetch and remember the manifest of one version from a remote mirror.
  ///
  /// Unlike the index, a missing manifest is an error.
  pub async fn load_release_metadata_for_version(
    &self,
    store: &dyn BlobStore,
    mirror: &RemoteMirror,
    version: &str,
  ) -> Result<ReleaseManifest, ArtifactsError> {
    async {
      let mut state = self.state.lock().await;
      load_release(&mut state, store, mirror, version).await
    }
    .instrument(self.span.clone())
    .await
  }

  /// Whether the loaded index lists `version`.
  pub async fn has_version(&self, version: &str) -> Result<bool, ArtifactsError> {
    let state = self.state.lock().await;
    let index = state.index.as_ref().ok_or(ArtifactsError::NoIndexLoaded)?;
    Ok(index.contains(version))
  }

  /// Versions in the loaded index, in sorted order.
  pub async fn versions(&self) -> Result<Vec<String>, ArtifactsError> {
    let state = self.state.lock().await;
    let index = state.index.as_ref().ok_or(ArtifactsError::NoIndexLoaded)?;
    Ok(index.versions().map(str::to_string).collect())
  }

  /// Record an archive for `(version, platform, arch)` and mark the version present.
  ///
  /// This is the only way a locally built release enters the registry, which
  /// keeps the staged manifests and the index in step.
  ///
  /// Inserting before any load starts an empty index, after which
  /// [`has_version`](Self::has_version) answers from it instead of failing with
  /// `NoIndexLoaded`. Such a registry only describes this run's builds; loading
  /// a remote index afterwards drops them from the index and
  /// [`write_metadata`](Self::write_metadata) then reports `IncoherentIndex`.
  pub async fn insert(&self, version: &str, platform: &str, arch: &str, archive: Archive) {
    let mut state = self.state.lock().await;
    insert_locked(&mut state, version, platform, arch, archive);
  }

  /// Archive a binary into the staging directory and insert it.
  pub async fn add_binary(
    &self,
    version: &str,
    platform: &str,
    arch: &str,
    binary: &Path,
  ) -> Result<Archive, ArtifactsError> {
    async {
      let file_name = self.provider.archive_file_name(version, platform, arch);
      let dest = self.staging_dir().await.join(&file_name);
      let source = binary.to_path_buf();

      let packaged = tokio::task::spawn_blocking(move || build_archive(&source, &dest)).await??;
      info!(version, platform, arch, hash = %packaged.hash, "archived binary");

      let archive = Archive::new(file_name, packaged.hash);
      let mut state = self.state.lock().await;
      insert_locked(&mut state, version, platform, arch, archive.clone());
      Ok(archive)
    }
    .instrument(self.span.clone())
    .await
  }

  /// Mark a version present whose manifest and archives were copied in from
  /// another mirror. The manifest itself is not staged.
  pub async fn record_copied_version(&self, version: &str) -> Result<(), ArtifactsError> {
    let mut state = self.state.lock().await;
    let index = state.index.as_mut().ok_or(ArtifactsError::NoIndexLoaded)?;
    index.insert(version);
    Ok(())
  }

  /// Write `index.json` and one `<version>.json` per staged release.
  pub async fn write_metadata(&self) -> Result<(), ArtifactsError> {
    async {
      let state = self.state.lock().await;
      let index = state.index.as_ref().ok_or(ArtifactsError::NoIndexLoaded)?;
      let staging = state.staging.path();

      for (version, manifest) in &state.releases {
        if !index.contains(version) {
          return Err(ArtifactsError::IncoherentIndex {
            version: version.clone(),
          });
        }
        let name = format!("{}.json", version);
        let content = manifest.to_json().map_err(|source| ArtifactsError::Serialize {
          name: name.clone(),
          source,
        })?;
        write_staged(&staging.join(&name), content).await?;
      }

      let content = index.to_json().map_err(|source| ArtifactsError::Serialize {
        name: INDEX_FILENAME.to_string(),
        source,
      })?;
      write_staged(&staging.join(INDEX_FILENAME), content).await?;

      debug!(
        versions = index.len(),
        releases = state.releases.len(),
        "metadata written"
      );
      Ok(())
    }
    .instrument(self.span.clone())
    .await
  }

  /// Upload every staged file to `mirror`, returning the keys written.
  ///
  /// Everything staged is uploaded on every call. `index.json` goes last so the
  /// index never names a release whose files are not yet in place.
  pub async fn publish_to_remote_bucket(
    &self,
    store: &dyn BlobStore,
    mirror: &RemoteMirror,
  ) -> Result<Vec<String>, ArtifactsError> {
    async {
      let state = self.state.lock().await;
      let staging = state.staging.path();

      let mut names = staged_files(staging).await?;
      names.sort_by(|a, b| (a == INDEX_FILENAME).cmp(&(b == INDEX_FILENAME)).then_with(|| a.cmp(b)));

      let mut published = Vec::with_capacity(names.len());
      for name in names {
        let path = staging.join(&name);
        let body = tokio::fs::read(&path)
          .await
          .map_err(|source| ArtifactsError::Staging { path, source })?;
        let key = mirror.key(&name);
        store
          .put_object(&mirror.bucket, &key, Bytes::from(body), content_type_for(&name))
          .await?;
        debug!(bucket = %mirror.bucket, %key, "uploaded");
        published.push(key);
      }

      info!(mirror = %mirror, files = published.len(), "published");
      Ok(published)
    }
    .instrument(self.span.clone())
    .await
  }

  /// Server-side copy of one release from `source` to `destination`.
  ///
  /// Loads the release manifest from `source`, then copies every archive it
  /// references followed by the manifest itself, keeping the same relative
  /// layout. Neither index is touched; a failure part way leaves copied
  /// objects behind without an index entry, and running again overwrites them.
  pub async fn copy_release_artifacts_between_remote_buckets(
    &self,
    store: &dyn BlobStore,
    source: &RemoteMirror,
    destination: &RemoteMirror,
    version: &str,
  ) -> Result<Vec<ObjectRef>, ArtifactsError> {
    async {
      let mut state = self.state.lock().await;
      let manifest = load_release(&mut state, store, source, version).await?;

      let mut files = Vec::with_capacity(manifest.len() + 1);
      for archive in manifest.archives() {
        if !is_mirror_relative(&archive.url) {
          return Err(ArtifactsError::ForeignArchiveUrl {
            version: version.to_string(),
            url: archive.url.clone(),
          });
        }
        files.push(archive.url.clone());
      }
      files.push(format!("{}.json", version));

      let mut copied = Vec::with_capacity(files.len());
      for file in files {
        let from = ObjectRef::new(source.bucket.clone(), source.key(&file));
        let to = ObjectRef::new(destination.bucket.clone(), destination.key(&file));
        store.copy_object(&from, &to.bucket, &to.key).await?;
        debug!(%from, %to, "copied");
        copied.push(to);
      }

      info!(version, objects = copied.len(), from = %source, to = %destination, "release copied");
      Ok(copied)
    }
    .instrument(self.span.clone())
    .await
  }

  /// Remove the staging directory, reporting any failure.
  ///
  /// Dropping the registry also removes it, but silently.
  pub async fn close(self) -> Result<(), ArtifactsError> {
    let state = self.state.into_inner();
    state.staging.close().map_err(ArtifactsError::RemoveStaging)
  }

  /// Like [`close`](Self::close), but a failure is logged instead of returned.
  ///
  /// Used once the mirror has been published, when a leftover temp directory
  /// must not turn a completed publish into a failed command.
  pub async fn discard(self) {
    let span = self.span.clone();
    if let Err(err) = self.close().await {
      warn!(parent: &span, error = %err, "failed to remove staging directory");
    }
  }
}

fn insert_locked(state: &mut State, version: &str, platform: &str, arch: &str, archive: Archive) {
  let manifest = state.releases.entry(version.to_string()).or_default();
  if manifest.add_archive(platform, arch, archive).is_some() {
    debug!(version, platform, arch, "replaced existing archive");
  }
  state.index.get_or_insert_with(MirrorIndex::new).insert(version);
}

async fn fetch_index(store: &dyn BlobStore, mirror: &RemoteMirror) -> Result<MirrorIndex, ArtifactsError> {
  let key = mirror.index_key();
  if store.head_object(&mirror.bucket, &key).await?.is_none() {
    info!(mirror = %mirror, "no index found, starting an empty mirror");
    return Ok(MirrorIndex::new());
  }

  let body = store.get_object(&mirror.bucket, &key).await?;
  let index = MirrorIndex::from_json(&body).map_err(|source| ArtifactsError::Parse { key, source })?;
  debug!(mirror = %mirror, versions = index.len(), "loaded index");
  Ok(index)
}

async fn load_release(
  state: &mut State,
  store: &dyn BlobStore,
  mirror: &RemoteMirror,
  version: &str,
) -> Result<ReleaseManifest, ArtifactsError> {
  let key = mirror.release_key(version);
  let body = match store.get_object(&mirror.bucket, &key).await {
    Ok(body) => body,
    Err(e) if e.is_not_found() => {
      warn!(mirror = %mirror, version, "index lists a version without release metadata");
      return Err(ArtifactsError::ReleaseNotFound {
        version: version.to_string(),
        key,
      });
    }
    Err(e) => return Err(e.into()),
  };

  let manifest = ReleaseManifest::from_json(&body).map_err(|source| ArtifactsError::Parse { key, source })?;
  state.remote_releases.insert(version.to_string(), manifest.clone());
  Ok(manifest)
}

async fn write_staged(path: &Path, content: String) -> Result<(), ArtifactsError> {
  tokio::fs::write(path, content)
    .await
    .map_err(|source| ArtifactsError::Staging {
      path: path.to_path_buf(),
      source,
    })
}

async fn staged_files(staging: &Path) -> Result<Vec<String>, ArtifactsError> {
  let staging_err = |source| ArtifactsError::Staging {
    path: staging.to_path_buf(),
    source,
  };

  let mut names = Vec::new();
  let mut entries = tokio::fs::read_dir(staging).await.map_err(staging_err)?;
  while let Some(entry) = entries.next_entry().await.map_err(staging_err)? {
    if !entry.file_type().await.map_err(staging_err)?.is_file() {
      continue;
    }
    if let Some(name) = entry.file_name().to_str() {
      names.push(name.to_string());
    } else {
      warn!(path = %entry.path().display(), "skipping staged file with non UTF-8 name");
    }
  }
  Ok(names)
}

/// Archive URLs are file names relative to the manifest.
fn is_mirror_relative(url: &str) -> bool {
  !url.is_empty() && !url.contains("://") && !url.starts_with('/') && !url.split('/').any(|s| s == "..")
}
