use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use broadcast_orchestrator::Config;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Fan out files from a source repo branch to many target repos via pull requests", long_about = None)]
pub struct Args {
  /// Path to the YAML configuration listing sync groups
  #[arg(short, long)]
  pub config: PathBuf,

  /// Compute branch names and PR bodies but never call the provider's create_pr
  #[arg(long)]
  pub dry_run: bool,

  /// Cancel the remaining run as soon as one target fails
  #[arg(long)]
  pub fail_fast: bool,

  /// Discover group state concurrently instead of sequentially
  #[arg(long)]
  pub parallel: bool,

  /// Upper bound on concurrent workers (and, with --parallel, concurrent group discovery)
  #[arg(long, default_value_t = 4)]
  pub max_concurrency: usize,

  /// Abort the whole run if it has not finished within this many seconds
  #[arg(long)]
  pub timeout_secs: Option<u64>,
}

/// Loads and parses the sync configuration. Validation against the data
/// model's invariants happens inside the orchestrator, not here.
pub fn load_config(path: &Path) -> Result<Config> {
  let contents = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
  let cfg: Config = serde_yaml::from_str(&contents).with_context(|| format!("parsing {} as YAML", path.display()))?;
  Ok(cfg)
}
