//! Implementation of the `tfmirror promote` command.
//!
//! Copies one version from a source mirror to a destination mirror. Fails if
//! the version is missing at the source or already present at the destination.

use std::time::Instant;

use anyhow::{Context, Result};

use tfmirror_lib::promote::{PromoteRequest, promote};

use crate::config::GlobalArgs;
use crate::output::{OutputFormat, format_duration, print_json, print_stat, print_success, symbols};

pub fn cmd_promote(global: &GlobalArgs, request: &PromoteRequest, verbose: bool, output: OutputFormat) -> Result<()> {
  let start = Instant::now();

  let report = super::run_with_deadline(global.timeout, async {
    let store = global.open_store().await?;
    promote(store.as_ref(), request)
      .await
      .with_context(|| format!("Promotion of {} failed", request.version))
  })?;

  if output.is_json() {
    let copied: Vec<String> = report.copied.iter().map(|o| o.to_string()).collect();
    print_json(&serde_json::json!({
      "version": report.version,
      "source": request.source.to_string(),
      "destination": request.destination.to_string(),
      "copied": copied,
      "published": report.published,
    }))?;
    return Ok(());
  }

  print_success(&format!(
    "Promoted {} {} {}",
    report.version,
    symbols::ARROW,
    request.destination
  ));
  print_stat("Objects copied", &report.copied.len().to_string());
  if verbose {
    for object in &report.copied {
      println!("    {}", object);
    }
  }
  print_stat("Duration", &format_duration(start.elapsed()));

  Ok(())
}
