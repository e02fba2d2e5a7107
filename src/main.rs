//! Thin CLI harness: loads a YAML configuration, wires it into the
//! orchestrator against an in-memory provider, and prints a run summary.

mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use broadcast_orchestrator::{run, RunOptions};
use broadcast_test_support::InMemoryProvider;
use chrono::Utc;
use cli::Args;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_logging() {
  if tracing::dispatcher::has_been_set() {
    return;
  }
  let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
  let subscriber = tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer());
  subscriber.try_init().ok();
}

#[tokio::main]
async fn main() -> ExitCode {
  init_logging();

  match run_cli().await {
    Ok(code) => code,
    Err(err) => {
      tracing::error!(error = %err, "broadcast failed");
      eprintln!("error: {err:#}");
      ExitCode::FAILURE
    }
  }
}

async fn run_cli() -> Result<ExitCode> {
  let args = Args::parse();
  let cfg = cli::load_config(&args.config).with_context(|| format!("loading configuration from {}", args.config.display()))?;

  // No production git hosting client ships in this repository (see
  // broadcast-types::Provider's doc comment); the demo CLI runs against the
  // in-memory reference implementation used for tests.
  let provider: Arc<dyn broadcast_types::Provider> = Arc::new(InMemoryProvider::default());

  let opts = RunOptions {
    parallel: args.parallel,
    timeout: args.timeout_secs.map(std::time::Duration::from_secs),
    dry_run: args.dry_run,
    max_concurrency: args.max_concurrency,
    fail_fast: args.fail_fast,
  };

  let summary = run(&cfg, provider, opts, Arc::new(Utc::now)).await.context("run failed")?;

  println!("{summary}");
  for outcome in &summary.per_target {
    match &outcome.error_kind {
      Some(kind) => println!("  {} FAILED [{kind}] {}", outcome.target_repo, outcome.message.as_deref().unwrap_or_default()),
      None => println!("  {} {} branch={}", outcome.target_repo, outcome.status.as_wire_str(), outcome.branch_name),
    }
  }

  if summary.failed > 0 {
    Ok(ExitCode::FAILURE)
  } else {
    Ok(ExitCode::SUCCESS)
  }
}
