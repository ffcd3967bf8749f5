//! CLI smoke tests for tfmirror.
//!
//! These run the binary against a filesystem-backed store in a temporary
//! directory and check exit codes, output, and the files left in the buckets.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

const NAME: &str = "terraform-provider-example";
const PREFIX: &str = "registry.terraform.io/acme/example";

/// Isolated store root with `staging` and `production` buckets and a build tree.
struct TestEnv {
  temp: TempDir,
}

impl TestEnv {
  fn new() -> Self {
    let temp = TempDir::new().unwrap();
    for bucket in ["staging", "production"] {
      std::fs::create_dir_all(temp.path().join("store").join(bucket)).unwrap();
    }
    Self { temp }
  }

  fn store_root(&self) -> PathBuf {
    self.temp.path().join("store")
  }

  fn build_dir(&self) -> PathBuf {
    self.temp.path().join("dist")
  }

  fn add_binary(&self, version: &str, platform: &str, arch: &str) {
    let dir = self.build_dir().join(format!("{}_{}_{}", NAME, platform, arch));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
      dir.join(format!("{}_v{}", NAME, version)),
      format!("binary {} {} {}", version, platform, arch),
    )
    .unwrap();
  }

  fn object(&self, bucket: &str, file: &str) -> PathBuf {
    self.store_root().join(bucket).join(PREFIX).join(file)
  }

  fn cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("tfmirror");
    cmd.env_remove("TFMIRROR_BACKEND");
    cmd.env_remove("TFMIRROR_TIMEOUT");
    cmd.env("TFMIRROR_STORE_ROOT", self.store_root());
    cmd
  }

  fn populate(&self, bucket: &str) -> Command {
    let mut cmd = self.cmd();
    cmd.arg("populate")
      .arg("--build-dir")
      .arg(self.build_dir())
      .args(["--bucket", bucket, "--provider-name", NAME, "--provider-id", PREFIX]);
    cmd
  }

  fn promote(&self, version: &str) -> Command {
    let mut cmd = self.cmd();
    cmd.args([
      "promote",
      version,
      "--source-bucket",
      "staging",
      "--dest-bucket",
      "production",
      "--provider-name",
      NAME,
      "--provider-id",
      PREFIX,
    ]);
    cmd
  }
}

fn read_json(path: &Path) -> serde_json::Value {
  serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  cargo_bin_cmd!("tfmirror")
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  cargo_bin_cmd!("tfmirror")
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("tfmirror"));
}

#[test]
fn subcommand_help_works() {
  for cmd in &["populate", "promote", "versions"] {
    cargo_bin_cmd!("tfmirror")
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

// =============================================================================
// Populate
// =============================================================================

#[test]
fn populate_publishes_mirror() {
  let env = TestEnv::new();
  env.add_binary("1.2.3", "linux", "amd64");
  env.add_binary("1.2.3", "darwin", "arm64");

  env
    .populate("staging")
    .assert()
    .success()
    .stdout(predicate::str::contains("Published mirror"));

  let index = read_json(&env.object("staging", "index.json"));
  assert_eq!(index, serde_json::json!({ "versions": { "1.2.3": {} } }));

  let manifest = read_json(&env.object("staging", "1.2.3.json"));
  let archives = manifest["archives"].as_object().unwrap();
  assert_eq!(archives.len(), 2);
  assert_eq!(
    archives["linux_amd64"]["url"],
    "terraform-provider-example_1.2.3_linux_amd64.zip"
  );
  assert!(archives["linux_amd64"]["hashes"][0].as_str().unwrap().starts_with("h1:"));
  assert!(env.object("staging", "terraform-provider-example_1.2.3_darwin_arm64.zip").is_file());
}

#[test]
fn populate_merges_with_existing_index() {
  let env = TestEnv::new();
  env.add_binary("1.0.0", "linux", "amd64");
  env.populate("staging").assert().success();

  std::fs::remove_dir_all(env.build_dir()).unwrap();
  env.add_binary("1.1.0", "linux", "amd64");
  env.populate("staging").assert().success();

  let index = read_json(&env.object("staging", "index.json"));
  assert_eq!(index, serde_json::json!({ "versions": { "1.0.0": {}, "1.1.0": {} } }));
  assert!(env.object("staging", "1.0.0.json").is_file());
}

#[test]
fn populate_missing_bucket_fails() {
  let env = TestEnv::new();
  env.add_binary("1.0.0", "linux", "amd64");

  env
    .populate("nonexistent")
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("nonexistent"));
}

#[test]
fn quiet_populate_still_reports_errors() {
  let env = TestEnv::new();
  env.add_binary("1.0.0", "linux", "amd64");

  env
    .populate("nonexistent")
    .arg("--quiet")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("nonexistent"));
}

#[test]
fn populate_without_store_root_fails() {
  let env = TestEnv::new();
  let mut cmd = env.populate("staging");
  cmd.env_remove("TFMIRROR_STORE_ROOT");

  cmd.assert().failure().stderr(predicate::str::contains("--store-root"));
}

// =============================================================================
// Promote
// =============================================================================

#[test]
fn promote_copies_release_to_destination() {
  let env = TestEnv::new();
  env.add_binary("1.2.3", "linux", "amd64");
  env.add_binary("1.2.3", "darwin", "arm64");
  env.populate("staging").assert().success();

  env
    .promote("1.2.3")
    .assert()
    .success()
    .stdout(predicate::str::contains("Promoted 1.2.3"));

  let index = read_json(&env.object("production", "index.json"));
  assert_eq!(index, serde_json::json!({ "versions": { "1.2.3": {} } }));
  for file in [
    "1.2.3.json",
    "terraform-provider-example_1.2.3_linux_amd64.zip",
    "terraform-provider-example_1.2.3_darwin_arm64.zip",
  ] {
    assert_eq!(
      std::fs::read(env.object("production", file)).unwrap(),
      std::fs::read(env.object("staging", file)).unwrap(),
      "{}",
      file
    );
  }
}

#[test]
fn promote_twice_is_rejected() {
  let env = TestEnv::new();
  env.add_binary("1.2.3", "linux", "amd64");
  env.populate("staging").assert().success();
  env.promote("1.2.3").assert().success();

  env
    .promote("1.2.3")
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("already promoted"));
}

#[test]
fn promote_unknown_version_fails_without_writing() {
  let env = TestEnv::new();
  env.add_binary("1.2.3", "linux", "amd64");
  env.populate("staging").assert().success();

  env
    .promote("2.0.0")
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("not found"));

  assert_eq!(std::fs::read_dir(env.store_root().join("production")).unwrap().count(), 0);
}

// =============================================================================
// Versions
// =============================================================================

#[test]
fn versions_of_unpublished_mirror_is_empty() {
  let env = TestEnv::new();
  env
    .cmd()
    .args(["versions", "--bucket", "staging", "--provider-name", NAME, "--provider-id", PREFIX])
    .assert()
    .success()
    .stdout(predicate::str::contains("No versions"));
}

#[test]
fn versions_json_lists_published_versions() {
  let env = TestEnv::new();
  env.add_binary("1.2.3", "linux", "amd64");
  env.populate("staging").assert().success();

  let output = env
    .cmd()
    .args([
      "versions",
      "--bucket",
      "staging",
      "--provider-name",
      NAME,
      "--provider-id",
      PREFIX,
      "--output",
      "json",
    ])
    .output()
    .unwrap();

  assert!(output.status.success());
  let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(value["versions"], serde_json::json!(["1.2.3"]));
}

#[cfg(not(feature = "s3"))]
#[test]
fn s3_backend_requires_feature() {
  let env = TestEnv::new();
  let mut cmd = env.cmd();
  cmd.args([
    "--backend",
    "s3",
    "versions",
    "--bucket",
    "staging",
    "--provider-name",
    NAME,
    "--provider-id",
    PREFIX,
  ]);

  cmd.assert().failure().stderr(predicate::str::contains("S3"));
}
