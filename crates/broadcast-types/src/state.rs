use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::PullRequest;
use crate::repo::RepoRef;
use crate::status::SyncStatus;

/// Fields parsed out of a sync branch name (see `broadcast-branch`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchMetadata {
  pub prefix: String,
  pub group_id: String,
  pub timestamp: DateTime<Utc>,
  pub commit_sha: String,
}

/// State of one `(repo, branch)` pair as observed at the start of a run.
///
/// Produced exactly once per distinct pair per run and immutable afterward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceState {
  pub repo: RepoRef,
  pub branch: String,
  pub latest_commit: String,
  pub last_checked: DateTime<Utc>,
}

/// State of one target repository as observed at the start of a run.
#[derive(Debug, Clone)]
pub struct TargetState {
  pub repo: RepoRef,
  pub target_branch: String,
  pub sync_branches: Vec<BranchMetadata>,
  pub open_prs: Vec<PullRequest>,
  pub last_sync_commit: Option<String>,
  pub last_sync_time: Option<DateTime<Utc>>,
  pub status: SyncStatus,
}

impl TargetState {
  /// Build target state from the raw sync branches parsed for this target.
  ///
  /// `last_sync_commit`/`last_sync_time` come from the entry with the newest
  /// `timestamp`, ties broken by lexicographic branch name.
  pub fn from_parts(repo: RepoRef, target_branch: String, sync_branches: Vec<(String, BranchMetadata)>, open_prs: Vec<PullRequest>) -> Self {
    let newest = sync_branches.iter().max_by(|a, b| a.1.timestamp.cmp(&b.1.timestamp).then_with(|| a.0.cmp(&b.0)));

    let (last_sync_commit, last_sync_time) = match newest {
      Some((_, meta)) => (Some(meta.commit_sha.clone()), Some(meta.timestamp)),
      None => (None, None),
    };

    Self {
      repo,
      target_branch,
      sync_branches: sync_branches.into_iter().map(|(_, meta)| meta).collect(),
      open_prs,
      last_sync_commit,
      last_sync_time,
      status: SyncStatus::Unknown,
    }
  }
}
