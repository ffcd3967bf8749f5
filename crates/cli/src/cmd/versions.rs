//! Implementation of the `tfmirror versions` command.
//!
//! Lists the versions in a remote mirror's index. A mirror that has never been
//! published has no versions.

use anyhow::{Context, Result};

use tfmirror_lib::artifacts::Artifacts;
use tfmirror_lib::provider::Provider;
use tfmirror_lib::store::BlobStore;

use crate::config::GlobalArgs;
use crate::output::{OutputFormat, print_info, print_json, symbols};

pub fn cmd_versions(global: &GlobalArgs, provider: &Provider, bucket: &str, output: OutputFormat) -> Result<()> {
  let mirror = provider.mirror_in(bucket);

  let versions = super::run_with_deadline(global.timeout, async {
    let store = global.open_store().await?;
    store
      .head_bucket(&mirror.bucket)
      .await
      .with_context(|| format!("Bucket {} is not accessible", mirror.bucket))?;

    let artifacts = Artifacts::new(provider.clone())?;
    artifacts
      .load_remote_index(store.as_ref(), &mirror)
      .await
      .context("Failed to load mirror index")?;
    let versions = artifacts.versions().await?;
    artifacts.close().await?;
    Ok(versions)
  })?;

  if output.is_json() {
    return print_json(&serde_json::json!({ "mirror": mirror.to_string(), "versions": versions }));
  }

  if versions.is_empty() {
    print_info(&format!("No versions in {}", mirror));
    return Ok(());
  }
  for version in &versions {
    println!("{} {}", symbols::INFO, version);
  }

  Ok(())
}
