//! Per-group state discovery: reconstructs, for every target, the last sync
//! commit and any open pull requests by listing branches/PRs and parsing
//! sync branch names.

use std::collections::HashMap;

use broadcast_branch::parse_branch;
use broadcast_types::{classify, BranchMetadata, BroadcastError, Provider, PrState, RepoRef, SourceState, TargetState};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

/// One `{source, targets, defaults}` bundle from the configuration.
#[derive(Debug, Clone)]
pub struct SourceRef {
  pub repo: RepoRef,
  pub branch: String,
}

#[derive(Debug, Clone)]
pub struct TargetRef {
  pub repo: RepoRef,
  pub branch: String,
}

#[derive(Debug, Clone)]
pub struct Group {
  pub id: String,
  pub source: SourceRef,
  pub targets: Vec<TargetRef>,
  pub prefix: String,
}

/// Discovered state for one group: its source and the classified state of
/// every one of its targets.
#[derive(Debug, Clone)]
pub struct GroupState {
  pub group_id: String,
  pub source: SourceState,
  pub targets: Vec<TargetState>,
}

fn cancel_check(cancel: &CancellationToken, step: &str) -> Result<(), BroadcastError> {
  if cancel.is_cancelled() {
    return Err(BroadcastError::canceled(step));
  }
  Ok(())
}

async fn source_state_for(provider: &dyn Provider, repo: &RepoRef, branch: &str) -> Result<SourceState, BroadcastError> {
  let branch_ref = provider.get_branch(repo, branch).await.map_err(|e| BroadcastError::provider(repo.as_str(), e.to_string()))?;
  Ok(SourceState {
    repo: repo.clone(),
    branch: branch.to_string(),
    latest_commit: branch_ref.commit_sha,
    last_checked: chrono::Utc::now(),
  })
}

async fn target_state_for(provider: &dyn Provider, repo: &RepoRef, target_branch: &str, prefix: &str) -> Result<TargetState, BroadcastError> {
  let branches = provider.list_branches(repo).await.map_err(|e| BroadcastError::provider(repo.as_str(), e.to_string()))?;
  let open_prs = provider
    .list_prs(repo, PrState::Open)
    .await
    .map_err(|e| BroadcastError::provider(repo.as_str(), e.to_string()))?;

  let needle = format!("{prefix}-");
  let mut sync_branches: Vec<(String, BranchMetadata)> = Vec::new();
  for branch in &branches {
    if !branch.name.starts_with(&needle) {
      continue;
    }
    match parse_branch(&branch.name, prefix) {
      Ok(meta) => sync_branches.push((branch.name.clone(), meta)),
      Err(err) => warn!(repo = %repo, branch = %branch.name, error = %err, "dropping unparseable sync branch"),
    }
  }

  Ok(TargetState::from_parts(repo.clone(), target_branch.to_string(), sync_branches, open_prs))
}

/// Discovers state for every group, memoizing source lookups within this
/// call by `"repo:branch"` so multiple groups sharing a source only hit the
/// provider once.
#[instrument(skip(groups, provider, cancel))]
pub async fn discover_state(groups: &[Group], provider: &dyn Provider, cancel: &CancellationToken) -> Result<Vec<GroupState>, BroadcastError> {
  let mut sources: HashMap<String, SourceState> = HashMap::new();
  let mut out = Vec::with_capacity(groups.len());

  for group in groups {
    cancel_check(cancel, "state discovery canceled")?;

    let key = format!("{}:{}", group.source.repo.as_str(), group.source.branch);
    let source = match sources.get(&key) {
      Some(existing) => existing.clone(),
      None => {
        let state = source_state_for(provider, &group.source.repo, &group.source.branch).await?;
        sources.insert(key, state.clone());
        state
      }
    };

    let mut targets = Vec::with_capacity(group.targets.len());
    for target in &group.targets {
      cancel_check(cancel, "target discovery canceled")?;
      let mut state = target_state_for(provider, &target.repo, &target.branch, &group.prefix).await?;
      state.status = classify(&source, &state);
      targets.push(state);
    }

    out.push(GroupState {
      group_id: group.id.clone(),
      source,
      targets,
    });
  }

  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use broadcast_test_support::{InMemoryProvider, ProviderScenario};

  fn group() -> Group {
    Group {
      id: "default".to_string(),
      source: SourceRef {
        repo: RepoRef::new("company/template-repo").unwrap(),
        branch: "master".to_string(),
      },
      targets: vec![TargetRef {
        repo: RepoRef::new("company/service").unwrap(),
        branch: "master".to_string(),
      }],
      prefix: "chore/sync-files".to_string(),
    }
  }

  #[tokio::test]
  async fn discovers_behind_when_never_synced() {
    let scenario = ProviderScenario::new().with_source("company/template-repo", "master", "abc123").with_target("company/service");
    let provider: InMemoryProvider = scenario.build();
    let cancel = CancellationToken::new();

    let result = discover_state(&[group()], &provider, &cancel).await.unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].targets[0].status, broadcast_types::SyncStatus::Behind);
  }

  #[tokio::test]
  async fn returns_canceled_when_token_already_cancelled() {
    let scenario = ProviderScenario::new().with_source("company/template-repo", "master", "abc123").with_target("company/service");
    let provider: InMemoryProvider = scenario.build();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = discover_state(&[group()], &provider, &cancel).await.unwrap_err();
    assert!(matches!(err, BroadcastError::Canceled { step } if step == "state discovery canceled"));
  }

  /// Delegates to an `InMemoryProvider`, cancelling the shared token the
  /// moment the named repo's branches are listed — lets a group's first
  /// target finish discovery before the second one sees cancellation.
  struct CancelAfterRepo {
    inner: InMemoryProvider,
    trigger_repo: String,
    cancel: CancellationToken,
  }

  #[async_trait::async_trait]
  impl broadcast_types::Provider for CancelAfterRepo {
    async fn get_branch(&self, repo: &RepoRef, branch: &str) -> Result<broadcast_types::BranchRef, broadcast_types::ProviderError> {
      self.inner.get_branch(repo, branch).await
    }

    async fn list_branches(&self, repo: &RepoRef) -> Result<Vec<broadcast_types::BranchRef>, broadcast_types::ProviderError> {
      let result = self.inner.list_branches(repo).await;
      if repo.as_str() == self.trigger_repo {
        self.cancel.cancel();
      }
      result
    }

    async fn list_prs(&self, repo: &RepoRef, state: PrState) -> Result<Vec<broadcast_types::PullRequest>, broadcast_types::ProviderError> {
      self.inner.list_prs(repo, state).await
    }

    async fn create_pr(&self, repo: &RepoRef, input: broadcast_types::CreatePrInput) -> Result<u64, broadcast_types::ProviderError> {
      self.inner.create_pr(repo, input).await
    }
  }

  #[tokio::test]
  async fn cancels_between_targets_within_the_same_group() {
    let mut two_targets = group();
    two_targets.targets.push(TargetRef {
      repo: RepoRef::new("company/service-two").unwrap(),
      branch: "master".to_string(),
    });

    let scenario = ProviderScenario::new()
      .with_source("company/template-repo", "master", "abc123")
      .with_target("company/service")
      .with_target("company/service-two");
    let cancel = CancellationToken::new();
    let provider = CancelAfterRepo {
      inner: scenario.build(),
      trigger_repo: "company/service".to_string(),
      cancel: cancel.clone(),
    };

    let err = discover_state(&[two_targets], &provider, &cancel).await.unwrap_err();
    assert!(matches!(err, BroadcastError::Canceled { step } if step == "target discovery canceled"));
  }

  #[tokio::test]
  async fn drops_unparseable_branches_without_failing() {
    let scenario = ProviderScenario::new()
      .with_source("company/template-repo", "master", "abc123")
      .with_target("company/service")
      .with_target_branch("company/service", "chore/sync-files-not-a-valid-suffix");
    let provider: InMemoryProvider = scenario.build();
    let cancel = CancellationToken::new();

    let result = discover_state(&[group()], &provider, &cancel).await.unwrap();
    assert!(result[0].targets[0].sync_branches.is_empty());
  }
}
