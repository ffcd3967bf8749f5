use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tfmirror_lib::promote::PromoteRequest;
use tfmirror_lib::provider::{Provider, RemoteMirror};

mod cmd;
mod config;
mod output;

use config::GlobalArgs;
use output::{OutputFormat, print_error};

/// tfmirror - Build and promote Terraform provider network mirrors
#[derive(Parser)]
#[command(name = "tfmirror")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Only log errors
  #[arg(short, long, global = true, conflicts_with = "verbose")]
  quiet: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  #[command(flatten)]
  global: GlobalArgs,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Archive locally built binaries and publish them to a mirror
  Populate {
    /// Directory containing <name>_<platform>_<arch>/<name>_<version> build outputs
    #[arg(long, default_value = "dist")]
    build_dir: PathBuf,

    /// Bucket holding the mirror
    #[arg(long)]
    bucket: String,

    /// Provider binary name (e.g. terraform-provider-example)
    #[arg(long)]
    provider_name: String,

    /// Key prefix of the provider's mirror (e.g. registry.terraform.io/acme/example)
    #[arg(long)]
    provider_id: String,
  },

  /// Copy one version from a source mirror to a destination mirror
  Promote {
    /// Version to promote (e.g. 1.2.3)
    #[arg(value_name = "VERSION")]
    release: String,

    /// Bucket holding the source mirror
    #[arg(long)]
    source_bucket: String,

    /// Bucket holding the destination mirror
    #[arg(long)]
    dest_bucket: String,

    /// Provider binary name (e.g. terraform-provider-example)
    #[arg(long)]
    provider_name: String,

    /// Key prefix of the provider's mirror in the source bucket
    #[arg(long)]
    provider_id: String,

    /// Key prefix in the destination bucket (defaults to --provider-id)
    #[arg(long)]
    dest_provider_id: Option<String>,
  },

  /// List the versions published in a mirror
  Versions {
    /// Bucket holding the mirror
    #[arg(long)]
    bucket: String,

    /// Provider binary name (e.g. terraform-provider-example)
    #[arg(long)]
    provider_name: String,

    /// Key prefix of the provider's mirror
    #[arg(long)]
    provider_id: String,
  },
}

/// Log level used when `RUST_LOG` is not set.
fn default_level(verbose: bool, quiet: bool) -> &'static str {
  if verbose {
    "debug"
  } else if quiet {
    "error"
  } else {
    "warn"
  }
}

fn init_tracing(verbose: bool, quiet: bool) {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level(verbose, quiet)));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose, cli.quiet);

  let result = match &cli.command {
    Commands::Populate {
      build_dir,
      bucket,
      provider_name,
      provider_id,
    } => cmd::cmd_populate(
      &cli.global,
      &Provider::new(provider_name, provider_id),
      bucket,
      build_dir,
      cli.output,
    ),
    Commands::Promote {
      release,
      source_bucket,
      dest_bucket,
      provider_name,
      provider_id,
      dest_provider_id,
    } => {
      let request = PromoteRequest {
        provider_name: provider_name.clone(),
        version: release.clone(),
        source: RemoteMirror::new(source_bucket, provider_id),
        destination: RemoteMirror::new(dest_bucket, dest_provider_id.as_deref().unwrap_or(provider_id.as_str())),
      };
      cmd::cmd_promote(&cli.global, &request, cli.verbose, cli.output)
    }
    Commands::Versions {
      bucket,
      provider_name,
      provider_id,
    } => cmd::cmd_versions(
      &cli.global,
      &Provider::new(provider_name, provider_id),
      bucket,
      cli.output,
    ),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_error(&format!("{:#}", err));
      ExitCode::FAILURE
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn log_level_follows_flags() {
    assert_eq!(default_level(false, false), "warn");
    assert_eq!(default_level(true, false), "debug");
    assert_eq!(default_level(false, true), "error");
  }

  #[test]
  fn quiet_conflicts_with_verbose() {
    let args = ["versions", "--bucket", "b", "--provider-name", "n", "--provider-id", "p"];
    let parse = |flags: &[&str]| Cli::try_parse_from(["tfmirror"].iter().chain(flags).chain(&args));

    assert!(parse(&["--quiet"]).is_ok());
    assert!(parse(&["-q", "-v"]).is_err());
  }
}
