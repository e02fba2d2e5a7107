use std::sync::Arc;

use async_trait::async_trait;
use broadcast_types::{BroadcastError, CreatePrInput, Provider, ProviderError, RepoRef, SyncStatus, Task};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Per-target result recorded by a `SyncTask`, independent of `Task::execute`'s
/// `Result<(), BroadcastError>` so the orchestrator can report a status even
/// for targets whose PR creation was skipped or recoverably rejected.
#[derive(Debug, Clone)]
pub struct TargetOutcome {
  pub target_repo: String,
  pub branch_name: String,
  pub status: SyncStatus,
  pub pr_number: Option<u64>,
  pub error_kind: Option<&'static str>,
  pub message: Option<String>,
}

impl TargetOutcome {
  fn ok(target_repo: &str, branch_name: &str, status: SyncStatus, pr_number: Option<u64>) -> Self {
    Self {
      target_repo: target_repo.to_string(),
      branch_name: branch_name.to_string(),
      status,
      pr_number,
      error_kind: None,
      message: None,
    }
  }

  fn failed(target_repo: &str, branch_name: &str, err: &BroadcastError) -> Self {
    Self {
      target_repo: target_repo.to_string(),
      branch_name: branch_name.to_string(),
      status: SyncStatus::Unknown,
      pr_number: None,
      error_kind: Some(err.sentinel()),
      message: Some(err.to_string()),
    }
  }
}

/// One target repository's share of a run: open (or simulate, in dry-run) the
/// pull request carrying the sync branch, recording its outcome before
/// returning.
pub struct SyncTask {
  pub target_repo: RepoRef,
  pub branch_name: String,
  pub base_branch: String,
  pub pr_title: String,
  pub pr_body: String,
  pub pr_labels: Vec<String>,
  pub provider: Arc<dyn Provider>,
  pub dry_run: bool,
  pub outcomes: Arc<DashMap<String, TargetOutcome>>,
}

#[async_trait]
impl Task for SyncTask {
  fn name(&self) -> &str {
    self.target_repo.as_str()
  }

  #[instrument(skip(self, cancel), fields(target = %self.target_repo, branch = %self.branch_name))]
  async fn execute(&self, cancel: CancellationToken) -> Result<(), BroadcastError> {
    if cancel.is_cancelled() {
      let err = BroadcastError::canceled("sync task canceled before dispatch");
      self.outcomes.insert(self.name().to_string(), TargetOutcome::failed(self.target_repo.as_str(), &self.branch_name, &err));
      return Err(err);
    }

    if self.dry_run {
      info!("dry run: would open pull request");
      self
        .outcomes
        .insert(self.name().to_string(), TargetOutcome::ok(self.target_repo.as_str(), &self.branch_name, SyncStatus::Pending, None));
      return Ok(());
    }

    let input = CreatePrInput {
      head: self.branch_name.clone(),
      base: self.base_branch.clone(),
      title: self.pr_title.clone(),
      body: self.pr_body.clone(),
      labels: self.pr_labels.clone(),
    };

    match self.provider.create_pr(&self.target_repo, input).await {
      Ok(number) => {
        info!(pr = number, "opened pull request");
        self.outcomes.insert(
          self.name().to_string(),
          TargetOutcome::ok(self.target_repo.as_str(), &self.branch_name, SyncStatus::Pending, Some(number)),
        );
        Ok(())
      }
      Err(ProviderError::BranchAlreadyExists { branch, .. }) => {
        warn!(branch, "sync branch already exists, leaving existing pull request in place");
        let mut outcome = TargetOutcome::ok(self.target_repo.as_str(), &self.branch_name, SyncStatus::Pending, None);
        outcome.message = Some(format!("branch '{branch}' already exists; not force-pushed or retried"));
        self.outcomes.insert(self.name().to_string(), outcome);
        Ok(())
      }
      Err(other) => {
        let err = BroadcastError::provider(self.target_repo.as_str(), other.to_string());
        self.outcomes.insert(self.name().to_string(), TargetOutcome::failed(self.target_repo.as_str(), &self.branch_name, &err));
        Err(err)
      }
    }
  }
}
