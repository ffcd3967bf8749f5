//! End-to-end mirror lifecycle against the filesystem blob store.
//!
//! Builds a staging mirror from a build tree, promotes a release to a
//! production mirror, and checks what a Terraform client would download.

use std::path::Path;

use tempfile::TempDir;
use tfmirror_lib::archive::hash_zip;
use tfmirror_lib::index::MirrorIndex;
use tfmirror_lib::populate::populate;
use tfmirror_lib::promote::{PromoteError, PromoteRequest, promote};
use tfmirror_lib::provider::{Provider, RemoteMirror};
use tfmirror_lib::release::ReleaseManifest;
use tfmirror_lib::store::FsBlobStore;

const NAME: &str = "terraform-provider-example";
const PREFIX: &str = "registry.terraform.io/acme/example";

fn setup() -> (TempDir, FsBlobStore) {
  let temp = TempDir::new().unwrap();
  for bucket in ["staging", "production"] {
    std::fs::create_dir_all(temp.path().join("store").join(bucket)).unwrap();
  }
  let store = FsBlobStore::new(temp.path().join("store"));
  (temp, store)
}

fn add_binary(build_dir: &Path, version: &str, platform: &str, arch: &str) {
  let dir = build_dir.join(format!("{}_{}_{}", NAME, platform, arch));
  std::fs::create_dir_all(&dir).unwrap();
  std::fs::write(dir.join(format!("{}_v{}", NAME, version)), format!("{} {} {}", version, platform, arch)).unwrap();
}

fn request(version: &str) -> PromoteRequest {
  PromoteRequest {
    provider_name: NAME.to_string(),
    version: version.to_string(),
    source: RemoteMirror::new("staging", PREFIX),
    destination: RemoteMirror::new("production", PREFIX),
  }
}

#[tokio::test]
async fn populate_then_promote() {
  let (temp, store) = setup();
  let build_dir = temp.path().join("dist");
  add_binary(&build_dir, "1.2.3", "linux", "amd64");
  add_binary(&build_dir, "1.2.3", "darwin", "arm64");

  let provider = Provider::new(NAME, PREFIX);
  let report = populate(&store, &provider, "staging", &build_dir).await.unwrap();
  assert_eq!(report.built_versions, vec!["1.2.3".to_string()]);

  promote(&store, &request("1.2.3")).await.unwrap();

  let production = store.root().join("production").join(PREFIX);
  let index = MirrorIndex::from_json(&std::fs::read(production.join("index.json")).unwrap()).unwrap();
  assert!(index.contains("1.2.3"));

  let manifest = ReleaseManifest::from_json(&std::fs::read(production.join("1.2.3.json")).unwrap()).unwrap();
  assert_eq!(manifest.len(), 2);
  for archive in manifest.archives() {
    let zip = production.join(&archive.url);
    assert_eq!(hash_zip(&zip).unwrap(), archive.hashes[0], "{}", archive.url);
  }
}

#[tokio::test]
async fn rebuilding_same_version_is_idempotent() {
  let (temp, store) = setup();
  let build_dir = temp.path().join("dist");
  add_binary(&build_dir, "1.0.0", "linux", "amd64");
  let provider = Provider::new(NAME, PREFIX);

  populate(&store, &provider, "staging", &build_dir).await.unwrap();
  let staging = store.root().join("staging").join(PREFIX);
  let first = std::fs::read(staging.join("1.0.0.json")).unwrap();

  populate(&store, &provider, "staging", &build_dir).await.unwrap();
  let second = std::fs::read(staging.join("1.0.0.json")).unwrap();

  assert_eq!(first, second);
  let index = MirrorIndex::from_json(&std::fs::read(staging.join("index.json")).unwrap()).unwrap();
  assert_eq!(index.len(), 1);
}

#[tokio::test]
async fn promotion_is_rejected_once_complete() {
  let (temp, store) = setup();
  let build_dir = temp.path().join("dist");
  add_binary(&build_dir, "1.0.0", "linux", "amd64");
  populate(&store, &Provider::new(NAME, PREFIX), "staging", &build_dir).await.unwrap();

  promote(&store, &request("1.0.0")).await.unwrap();
  let result = promote(&store, &request("1.0.0")).await;

  assert!(matches!(result, Err(PromoteError::AlreadyPromoted { .. })));
}
