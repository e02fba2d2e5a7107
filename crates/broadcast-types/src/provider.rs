use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::repo::RepoRef;

/// A branch as reported by the hosting provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
  pub name: String,
  pub commit_sha: String,
}

/// Open/closed/all filter for listing pull requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
  Open,
  Closed,
  All,
}

/// A pull request as reported by the hosting provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
  pub number: u64,
  pub title: String,
  pub body: String,
  pub state: PrState,
  pub head_ref: String,
  pub head_sha: String,
  pub base_ref: String,
  pub base_sha: String,
  pub labels: Vec<String>,
}

/// Input to create a new pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePrInput {
  pub head: String,
  pub base: String,
  pub title: String,
  pub body: String,
  pub labels: Vec<String>,
}

/// Errors reported by the hosting provider, distinct from `BroadcastError`
/// because the provider's failure modes (rate limits, not-found, conflicting
/// branch names) are specific to the remote collaborator, not to the core.
#[derive(Debug, Clone)]
pub enum ProviderError {
  NotFound { repo: String, what: String },
  BranchAlreadyExists { repo: String, branch: String },
  RateLimited { retry_after_secs: Option<u64> },
  Network { message: String },
  Other { message: String },
}

impl fmt::Display for ProviderError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ProviderError::NotFound { repo, what } => write!(f, "{repo}: {what} not found"),
      ProviderError::BranchAlreadyExists { repo, branch } => write!(f, "{repo}: branch '{branch}' already exists"),
      ProviderError::RateLimited { retry_after_secs } => match retry_after_secs {
        Some(secs) => write!(f, "rate limited, retry after {secs}s"),
        None => write!(f, "rate limited"),
      },
      ProviderError::Network { message } => write!(f, "network error: {message}"),
      ProviderError::Other { message } => write!(f, "{message}"),
    }
  }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
  /// Whether this failure means the branch the caller tried to create
  /// already exists — the recoverable "don't force-push" case.
  pub fn is_branch_already_exists(&self) -> bool {
    matches!(self, ProviderError::BranchAlreadyExists { .. })
  }
}

/// The git hosting client the core consumes. Out of scope to implement
/// against a real provider in this repository; `InMemoryProvider` in
/// `broadcast-test-support` is the only implementation shipped here.
#[async_trait]
pub trait Provider: Send + Sync {
  async fn get_branch(&self, repo: &RepoRef, branch: &str) -> Result<BranchRef, ProviderError>;
  async fn list_branches(&self, repo: &RepoRef) -> Result<Vec<BranchRef>, ProviderError>;
  async fn list_prs(&self, repo: &RepoRef, state: PrState) -> Result<Vec<PullRequest>, ProviderError>;
  async fn create_pr(&self, repo: &RepoRef, input: CreatePrInput) -> Result<u64, ProviderError>;
}
