//! In-memory provider double and scenario builders shared across the
//! workspace's tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use broadcast_types::{BranchRef, CreatePrInput, PrState, Provider, ProviderError, PullRequest, RepoRef};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// A clock that always returns the same instant, for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
  pub fn new(t: DateTime<Utc>) -> Self {
    Self(t)
  }

  pub fn now(&self) -> DateTime<Utc> {
    self.0
  }

  /// Produces the `Fn() -> DateTime<Utc>` shape the orchestrator injects.
  pub fn as_fn(&self) -> Arc<dyn Fn() -> DateTime<Utc> + Send + Sync> {
    let t = self.0;
    Arc::new(move || t)
  }
}

/// Captures events emitted during a test for later assertion, modeled on the
/// teacher's progress-reporter test double.
#[derive(Clone)]
pub struct RecordingSink<T> {
  events: Arc<Mutex<Vec<T>>>,
}

impl<T> RecordingSink<T> {
  pub fn new() -> Self {
    Self { events: Arc::new(Mutex::new(Vec::new())) }
  }

  pub fn record(&self, event: T) {
    self.events.lock().unwrap().push(event);
  }

  pub fn events(&self) -> Vec<T>
  where
    T: Clone,
  {
    self.events.lock().unwrap().clone()
  }

  pub fn len(&self) -> usize {
    self.events.lock().unwrap().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<T> Default for RecordingSink<T> {
  fn default() -> Self {
    Self::new()
  }
}

#[derive(Default)]
struct RepoData {
  branches: DashMap<String, BranchRef>,
  prs: Mutex<Vec<PullRequest>>,
  conflicting_heads: Mutex<HashSet<String>>,
}

/// A `DashMap`-backed fake `Provider`, safe for concurrent use the way a real
/// hosting client would be.
#[derive(Clone, Default)]
pub struct InMemoryProvider {
  repos: Arc<DashMap<String, Arc<RepoData>>>,
  next_pr_number: Arc<AtomicU64>,
  cancel: Option<CancellationToken>,
}

impl InMemoryProvider {
  fn repo(&self, repo: &RepoRef) -> Option<Arc<RepoData>> {
    self.repos.get(repo.as_str()).map(|entry| entry.clone())
  }

  /// Attaches a cancellation check, honored by every method before it does
  /// any work. Lets discoverer-cancellation tests cancel mid-call instead of
  /// only between calls.
  pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
    self.cancel = Some(token);
    self
  }

  fn check_cancelled(&self) -> Result<(), ProviderError> {
    match &self.cancel {
      Some(token) if token.is_cancelled() => Err(ProviderError::Other { message: "canceled".to_string() }),
      _ => Ok(()),
    }
  }
}

#[async_trait]
impl Provider for InMemoryProvider {
  async fn get_branch(&self, repo: &RepoRef, branch: &str) -> Result<BranchRef, ProviderError> {
    self.check_cancelled()?;
    let data = self.repo(repo).ok_or_else(|| ProviderError::NotFound {
      repo: repo.to_string(),
      what: "repo".to_string(),
    })?;
    data.branches.get(branch).map(|entry| entry.clone()).ok_or_else(|| ProviderError::NotFound {
      repo: repo.to_string(),
      what: format!("branch '{branch}'"),
    })
  }

  async fn list_branches(&self, repo: &RepoRef) -> Result<Vec<BranchRef>, ProviderError> {
    self.check_cancelled()?;
    let data = self.repo(repo).ok_or_else(|| ProviderError::NotFound {
      repo: repo.to_string(),
      what: "repo".to_string(),
    })?;
    let mut branches: Vec<BranchRef> = data.branches.iter().map(|entry| entry.value().clone()).collect();
    branches.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(branches)
  }

  async fn list_prs(&self, repo: &RepoRef, state: PrState) -> Result<Vec<PullRequest>, ProviderError> {
    self.check_cancelled()?;
    let data = self.repo(repo).ok_or_else(|| ProviderError::NotFound {
      repo: repo.to_string(),
      what: "repo".to_string(),
    })?;
    let prs = data.prs.lock().unwrap();
    Ok(prs.iter().filter(|pr| state == PrState::All || pr.state == state).cloned().collect())
  }

  async fn create_pr(&self, repo: &RepoRef, input: CreatePrInput) -> Result<u64, ProviderError> {
    self.check_cancelled()?;
    let data = self.repo(repo).ok_or_else(|| ProviderError::NotFound {
      repo: repo.to_string(),
      what: "repo".to_string(),
    })?;

    if data.conflicting_heads.lock().unwrap().contains(&input.head) {
      return Err(ProviderError::BranchAlreadyExists {
        repo: repo.to_string(),
        branch: input.head.clone(),
      });
    }

    let number = self.next_pr_number.fetch_add(1, Ordering::SeqCst) + 1;
    data.branches.insert(
      input.head.clone(),
      BranchRef {
        name: input.head.clone(),
        commit_sha: String::new(),
      },
    );
    data.prs.lock().unwrap().push(PullRequest {
      number,
      title: input.title,
      body: input.body,
      state: PrState::Open,
      head_ref: input.head,
      head_sha: String::new(),
      base_ref: input.base,
      base_sha: String::new(),
      labels: input.labels,
    });
    Ok(number)
  }
}

/// Builds an `InMemoryProvider` preloaded with sources, target branches, open
/// PRs, and branch-creation conflicts, modeled on the teacher's test-repo
/// builder pattern.
#[derive(Default)]
pub struct ProviderScenario {
  provider: InMemoryProvider,
}

impl ProviderScenario {
  pub fn new() -> Self {
    Self::default()
  }

  fn ensure_repo(&self, repo: &str) -> Arc<RepoData> {
    self.provider.repos.entry(repo.to_string()).or_insert_with(|| Arc::new(RepoData::default())).clone()
  }

  pub fn with_source(self, repo: &str, branch: &str, commit_sha: &str) -> Self {
    let data = self.ensure_repo(repo);
    data.branches.insert(
      branch.to_string(),
      BranchRef {
        name: branch.to_string(),
        commit_sha: commit_sha.to_string(),
      },
    );
    self
  }

  pub fn with_target(self, repo: &str) -> Self {
    self.ensure_repo(repo);
    self
  }

  pub fn with_target_branch(self, repo: &str, branch_name: &str) -> Self {
    self.with_synced_branch(repo, branch_name, "0000000")
  }

  pub fn with_synced_branch(self, repo: &str, branch_name: &str, commit_sha: &str) -> Self {
    let data = self.ensure_repo(repo);
    data.branches.insert(
      branch_name.to_string(),
      BranchRef {
        name: branch_name.to_string(),
        commit_sha: commit_sha.to_string(),
      },
    );
    self
  }

  pub fn with_open_pr(self, repo: &str, pr: PullRequest) -> Self {
    let data = self.ensure_repo(repo);
    data.prs.lock().unwrap().push(pr);
    self
  }

  pub fn with_branch_conflict(self, repo: &str, branch_name: &str) -> Self {
    let data = self.ensure_repo(repo);
    data.conflicting_heads.lock().unwrap().insert(branch_name.to_string());
    self
  }

  pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
    self.provider = self.provider.with_cancellation(token);
    self
  }

  pub fn build(self) -> InMemoryProvider {
    self.provider
  }
}
