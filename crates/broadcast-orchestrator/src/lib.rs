//! Per-run orchestration: validates configuration, discovers source/target
//! state once, fans out target tasks to the worker pool, and aggregates
//! results into a `RunSummary`.

mod config;
mod task;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use config::{Config, ConfigGroup, GroupDefaults, SourceSpec, TargetSpec};
pub use task::TargetOutcome;

use broadcast_discover::{discover_state, GroupState};
use broadcast_types::{BroadcastError, PRMetadata, PerformanceStats, Provider, SyncMetadata, SyncStatus, Task};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use task::SyncTask;
use tokio::sync::Semaphore;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Options that shape one run, independent of the `Config` being run.
#[derive(Debug, Clone)]
pub struct RunOptions {
  pub parallel: bool,
  pub timeout: Option<Duration>,
  pub dry_run: bool,
  pub max_concurrency: usize,
  pub fail_fast: bool,
}

impl Default for RunOptions {
  fn default() -> Self {
    Self {
      parallel: false,
      timeout: None,
      dry_run: false,
      max_concurrency: 4,
      fail_fast: false,
    }
  }
}

/// Aggregate result of one run.
#[derive(Debug, Clone)]
pub struct RunSummary {
  pub passed: usize,
  pub failed: usize,
  pub total_duration: Duration,
  pub per_target: Vec<TargetOutcome>,
}

impl std::fmt::Display for RunSummary {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} passed, {} failed in {:.2}s", self.passed, self.failed, self.total_duration.as_secs_f64())
  }
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Runs one sync pass over `cfg`, returning once every target has either
/// produced a result or the run was canceled via `fail_fast`.
#[instrument(skip(cfg, provider, opts, clock))]
pub async fn run(cfg: &Config, provider: Arc<dyn Provider>, opts: RunOptions, clock: Clock) -> Result<RunSummary, BroadcastError> {
  match opts.timeout {
    Some(d) => match tokio::time::timeout(d, run_inner(cfg, provider, opts, clock)).await {
      Ok(result) => result,
      Err(_) => Err(BroadcastError::canceled("run timed out")),
    },
    None => run_inner(cfg, provider, opts, clock).await,
  }
}

async fn run_inner(cfg: &Config, provider: Arc<dyn Provider>, opts: RunOptions, clock: Clock) -> Result<RunSummary, BroadcastError> {
  let t0 = Instant::now();
  cfg.validate()?;

  let discover_groups: Vec<broadcast_discover::Group> = cfg.groups.iter().map(ConfigGroup::to_discover_group).collect();
  let target_count: usize = cfg.groups.iter().map(|g| g.targets.len()).sum();

  let workers = opts.max_concurrency.min(target_count).max(1);
  let queue_size = target_count.max(1);
  let pool = broadcast_pool::Pool::new(workers, queue_size)?;

  let cancel = CancellationToken::new();
  pool.start(cancel.clone()).await;

  let group_states = discover_all(&discover_groups, provider.clone(), &opts, &cancel).await?;

  let outcomes: Arc<DashMap<String, TargetOutcome>> = Arc::new(DashMap::new());
  let mut branch_by_target: HashMap<String, String> = HashMap::new();
  let mut tasks: Vec<Box<dyn Task>> = Vec::new();

  for (group, state) in cfg.groups.iter().zip(group_states.iter()) {
    for target in &state.targets {
      if target.status == SyncStatus::UpToDate {
        continue;
      }

      let branch_name = broadcast_branch::format_branch(&group.prefix, &group.id, clock(), &state.source.latest_commit);
      let metadata = PRMetadata {
        sync_metadata: SyncMetadata {
          source_repo: state.source.repo.as_str().to_string(),
          source_commit: state.source.latest_commit.clone(),
          target_repo: target.repo.as_str().to_string(),
          sync_commit: target.last_sync_commit.clone(),
          sync_time: clock(),
        },
        files: group.defaults.files.clone(),
        directories: group.defaults.directories.clone(),
        performance: Some(PerformanceStats {
          cache_hits: 0,
          cache_misses: 0,
          total_files_processed: 0,
          total_bytes_processed: 0,
        }),
      };

      let block = broadcast_metadata::format_enhanced(&metadata)?;
      let description = broadcast_metadata::render_description(&metadata, &group.defaults.pr_title);
      let body = format!("{description}\n\n{block}\n");

      branch_by_target.insert(target.repo.as_str().to_string(), branch_name.clone());

      tasks.push(Box::new(SyncTask {
        target_repo: target.repo.clone(),
        branch_name,
        base_branch: target.target_branch.clone(),
        pr_title: group.defaults.pr_title.clone(),
        pr_body: body,
        pr_labels: group.defaults.pr_labels.clone(),
        provider: provider.clone(),
        dry_run: opts.dry_run,
        outcomes: outcomes.clone(),
      }));
    }
  }

  let submitted = tasks.len();
  if submitted > 0 {
    pool.submit_batch(tasks)?;
  }

  let mut passed = 0;
  let mut failed = 0;

  if submitted > 0 {
    let mut stream = pool.results().expect("results stream is taken exactly once per pool");
    let mut received = 0;
    while received < submitted {
      let Some(result) = stream.next().await else {
        break;
      };
      received += 1;

      if result.outcome.is_err() {
        failed += 1;
        if opts.fail_fast {
          cancel.cancel();
        }
      } else {
        passed += 1;
      }

      if !outcomes.contains_key(&result.name) {
        let branch_name = branch_by_target.get(&result.name).cloned().unwrap_or_default();
        let fallback = match &result.outcome {
          Ok(()) => TargetOutcome {
            target_repo: result.name.clone(),
            branch_name,
            status: SyncStatus::Pending,
            pr_number: None,
            error_kind: None,
            message: None,
          },
          Err(err) => TargetOutcome {
            target_repo: result.name.clone(),
            branch_name,
            status: SyncStatus::Unknown,
            pr_number: None,
            error_kind: Some(err.sentinel()),
            message: Some(err.to_string()),
          },
        };
        outcomes.insert(result.name.clone(), fallback);
      }
    }
  }

  pool.shutdown().await;

  let per_target: Vec<TargetOutcome> = outcomes.iter().map(|entry| entry.value().clone()).collect();

  Ok(RunSummary {
    passed,
    failed,
    total_duration: t0.elapsed(),
    per_target,
  })
}

async fn discover_all(groups: &[broadcast_discover::Group], provider: Arc<dyn Provider>, opts: &RunOptions, cancel: &CancellationToken) -> Result<Vec<GroupState>, BroadcastError> {
  if !opts.parallel || groups.len() <= 1 {
    return discover_state(groups, provider.as_ref(), cancel).await;
  }

  info!(groups = groups.len(), "discovering group state concurrently");
  let semaphore = Arc::new(Semaphore::new(opts.max_concurrency.max(1)));
  let mut handles = Vec::with_capacity(groups.len());

  for group in groups {
    let permit = semaphore.clone().acquire_owned().await.expect("semaphore is never closed");
    let single = [group.clone()];
    let cancel = cancel.clone();
    let provider = provider.clone();
    handles.push(tokio::spawn(async move {
      let _permit = permit;
      discover_state(&single, provider.as_ref(), &cancel).await
    }));
  }

  let mut out = Vec::with_capacity(handles.len());
  for handle in handles {
    let state = handle.await.map_err(|e| BroadcastError::invariant(format!("group discovery task failed: {e}")))??;
    out.extend(state);
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use broadcast_test_support::{FixedClock, ProviderScenario};
  use broadcast_types::{FileMapping, RepoRef};
  use chrono::TimeZone;
  use pretty_assertions::assert_eq;

  fn clock() -> Clock {
    Arc::new(Utc::now)
  }

  fn cfg_with_one_target() -> Config {
    Config {
      groups: vec![ConfigGroup {
        id: "default".to_string(),
        prefix: "chore/sync-files".to_string(),
        source: SourceSpec {
          repo: RepoRef::new("company/template-repo").unwrap(),
          branch: "master".to_string(),
        },
        targets: vec![TargetSpec {
          repo: RepoRef::new("company/service").unwrap(),
          branch: "master".to_string(),
        }],
        defaults: GroupDefaults {
          files: vec![FileMapping {
            src: "ci/lint.yml".to_string(),
            dest: ".github/workflows/lint.yml".to_string(),
            from: "file".to_string(),
          }],
          directories: Vec::new(),
          pr_title: "Sync files from template".to_string(),
          pr_labels: vec!["automated-sync".to_string()],
        },
      }],
    }
  }

  #[tokio::test]
  async fn opens_a_pr_for_a_behind_target() {
    let provider = ProviderScenario::new().with_source("company/template-repo", "master", "abc123").with_target("company/service").build();
    let cfg = cfg_with_one_target();

    let summary = run(&cfg, Arc::new(provider), RunOptions::default(), clock()).await.unwrap();
    assert_eq!(summary.passed, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.per_target.len(), 1);
    assert!(summary.per_target[0].pr_number.is_some());
  }

  #[tokio::test]
  async fn skips_up_to_date_targets() {
    let provider = ProviderScenario::new()
      .with_source("company/template-repo", "master", "abc123")
      .with_target("company/service")
      .with_synced_branch("company/service", "chore/sync-files-default-20240101-000000-abc123", "abc123")
      .build();
    let cfg = cfg_with_one_target();

    let summary = run(&cfg, Arc::new(provider), RunOptions::default(), clock()).await.unwrap();
    assert_eq!(summary.passed, 0);
    assert_eq!(summary.failed, 0);
    assert!(summary.per_target.is_empty());
  }

  #[tokio::test]
  async fn dry_run_never_creates_a_pr() {
    let provider = ProviderScenario::new().with_source("company/template-repo", "master", "abc123").with_target("company/service").build();
    let cfg = cfg_with_one_target();
    let opts = RunOptions { dry_run: true, ..RunOptions::default() };

    let summary = run(&cfg, Arc::new(provider.clone()), opts, clock()).await.unwrap();
    assert_eq!(summary.passed, 1);
    assert!(summary.per_target[0].pr_number.is_none());

    let repo = RepoRef::new("company/service").unwrap();
    let prs = provider.list_prs(&repo, broadcast_types::PrState::All).await.unwrap();
    assert!(prs.is_empty());
  }

  #[tokio::test]
  async fn branch_conflict_is_reported_as_pending_not_failed() {
    let cfg = cfg_with_one_target();
    let fixed = FixedClock::new(chrono::Utc.with_ymd_and_hms(2024, 1, 15, 12, 5, 30).unwrap());
    let fixed_clock: Clock = fixed.as_fn();

    let branch_name = broadcast_branch::format_branch("chore/sync-files", "default", fixed.now(), "abc123");

    let provider = ProviderScenario::new()
      .with_source("company/template-repo", "master", "abc123")
      .with_target("company/service")
      .with_branch_conflict("company/service", &branch_name)
      .build();

    let summary = run(&cfg, Arc::new(provider), RunOptions::default(), fixed_clock).await.unwrap();
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.per_target[0].status, SyncStatus::Pending);
  }

  #[tokio::test]
  async fn rejects_invalid_configuration_before_any_provider_call() {
    let provider = ProviderScenario::new().build();
    let mut cfg = cfg_with_one_target();
    cfg.groups[0].targets.clear();

    let err = run(&cfg, Arc::new(provider), RunOptions::default(), clock()).await.unwrap_err();
    assert!(matches!(err, BroadcastError::Validation { .. }));
  }
}
