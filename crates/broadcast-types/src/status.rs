use serde::{Deserialize, Serialize};

use crate::state::{SourceState, TargetState};

/// Sync status of a single target repository relative to its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
  Unknown,
  UpToDate,
  Behind,
  Pending,
  Conflict,
}

impl SyncStatus {
  pub fn as_wire_str(&self) -> &'static str {
    match self {
      SyncStatus::Unknown => "unknown",
      SyncStatus::UpToDate => "up-to-date",
      SyncStatus::Behind => "behind",
      SyncStatus::Pending => "pending",
      SyncStatus::Conflict => "conflict",
    }
  }
}

/// Combine source and target state into a single sync status.
///
/// `Conflict` is never produced here; it is only ever assigned by a caller
/// that has read an explicit conflict signal from the provider.
pub fn classify(source: &SourceState, target: &TargetState) -> SyncStatus {
  match &target.last_sync_commit {
    None => SyncStatus::Behind,
    Some(_) if !target.open_prs.is_empty() => SyncStatus::Pending,
    Some(commit) if *commit == source.latest_commit => SyncStatus::UpToDate,
    Some(_) => SyncStatus::Behind,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::provider::PullRequest;
  use crate::repo::RepoRef;
  use chrono::Utc;
  use pretty_assertions::assert_eq;

  fn source(commit: &str) -> SourceState {
    SourceState {
      repo: RepoRef::new("company/template-repo").unwrap(),
      branch: "master".to_string(),
      latest_commit: commit.to_string(),
      last_checked: Utc::now(),
    }
  }

  fn target(last_sync_commit: Option<&str>, open_prs: Vec<PullRequest>) -> TargetState {
    TargetState {
      repo: RepoRef::new("company/service").unwrap(),
      target_branch: "master".to_string(),
      sync_branches: Vec::new(),
      open_prs,
      last_sync_commit: last_sync_commit.map(|s| s.to_string()),
      last_sync_time: None,
      status: SyncStatus::Unknown,
    }
  }

  fn pr() -> PullRequest {
    PullRequest {
      number: 10,
      title: "sync".to_string(),
      body: String::new(),
      state: crate::provider::PrState::Open,
      head_ref: "chore/sync-default-20240115-120530-abc123".to_string(),
      head_sha: "abc123".to_string(),
      base_ref: "master".to_string(),
      base_sha: "def456".to_string(),
      labels: Vec::new(),
    }
  }

  #[test]
  fn behind_when_never_synced() {
    assert_eq!(classify(&source("abc123"), &target(None, Vec::new())), SyncStatus::Behind);
  }

  #[test]
  fn pending_when_open_prs_exist() {
    assert_eq!(classify(&source("abc123"), &target(Some("old"), vec![pr()])), SyncStatus::Pending);
  }

  #[test]
  fn up_to_date_when_commits_match_and_no_open_prs() {
    assert_eq!(classify(&source("abc123"), &target(Some("abc123"), Vec::new())), SyncStatus::UpToDate);
  }

  #[test]
  fn behind_when_commits_differ_and_no_open_prs() {
    assert_eq!(classify(&source("abc123"), &target(Some("old"), Vec::new())), SyncStatus::Behind);
  }

  #[test]
  fn exhaustive_over_the_property_grid() {
    for last_sync in [None, Some("match"), Some("stale")] {
      for prs in [Vec::new(), vec![pr()]] {
        let src = source("match");
        let tgt = target(last_sync, prs.clone());
        let status = classify(&src, &tgt);
        let expected = match (last_sync, prs.is_empty()) {
          (None, _) => SyncStatus::Behind,
          (Some(_), false) => SyncStatus::Pending,
          (Some("match"), true) => SyncStatus::UpToDate,
          (Some(_), true) => SyncStatus::Behind,
        };
        assert_eq!(status, expected, "last_sync={last_sync:?} prs_empty={}", prs.is_empty());
      }
    }
  }

  #[test]
  fn wire_strings_match_the_vocabulary() {
    assert_eq!(SyncStatus::Unknown.as_wire_str(), "unknown");
    assert_eq!(SyncStatus::UpToDate.as_wire_str(), "up-to-date");
    assert_eq!(SyncStatus::Behind.as_wire_str(), "behind");
    assert_eq!(SyncStatus::Pending.as_wire_str(), "pending");
    assert_eq!(SyncStatus::Conflict.as_wire_str(), "conflict");
  }

  #[test]
  fn serde_uses_kebab_case() {
    let json = serde_json::to_string(&SyncStatus::UpToDate).unwrap();
    assert_eq!(json, "\"up-to-date\"");
  }
}
