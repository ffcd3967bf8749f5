//! Implementation of the `tfmirror populate` command.
//!
//! Archives every provider binary found in a build directory, merges the
//! result with the mirror's existing index and publishes it to a bucket.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;

use tfmirror_lib::populate::populate;
use tfmirror_lib::provider::Provider;

use crate::config::GlobalArgs;
use crate::output::{OutputFormat, format_duration, print_info, print_json, print_stat, print_success};

pub fn cmd_populate(
  global: &GlobalArgs,
  provider: &Provider,
  bucket: &str,
  build_dir: &Path,
  output: OutputFormat,
) -> Result<()> {
  let start = Instant::now();

  let report = super::run_with_deadline(global.timeout, async {
    let store = global.open_store().await?;
    populate(store.as_ref(), provider, bucket, build_dir)
      .await
      .context("Populate failed")
  })?;

  info!(versions = report.mirror_versions.len(), "mirror published");

  if output.is_json() {
    print_json(&serde_json::json!({
      "bucket": bucket,
      "prefix": provider.key_prefix,
      "built_versions": report.built_versions,
      "archives": report.archives,
      "mirror_versions": report.mirror_versions,
      "published": report.published,
    }))?;
    return Ok(());
  }

  if report.archives == 0 {
    print_info(&format!("No binaries for {} found in {}", provider.name, build_dir.display()));
  }
  print_success(&format!("Published mirror to {}/{}", bucket, provider.key_prefix));
  print_stat("Built versions", &report.built_versions.join(", "));
  print_stat("Archives", &report.archives.to_string());
  print_stat("Mirror versions", &report.mirror_versions.len().to_string());
  print_stat("Files uploaded", &report.published.len().to_string());
  print_stat("Duration", &format_duration(start.elapsed()));

  Ok(())
}
