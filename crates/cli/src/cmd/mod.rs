mod populate;
mod promote;
mod versions;

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

pub use populate::cmd_populate;
pub use promote::cmd_promote;
pub use versions::cmd_versions;

/// Run `task` on a fresh runtime, failing if it does not finish within `timeout`.
///
/// When the deadline passes the task is dropped, cancelling any in-flight
/// storage calls.
fn run_with_deadline<T>(timeout: Duration, task: impl Future<Output = Result<T>>) -> Result<T> {
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(async {
    tokio::time::timeout(timeout, task)
      .await
      .map_err(|_| anyhow!("timed out after {}", humantime::format_duration(timeout)))?
  })
}
