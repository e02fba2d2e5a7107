use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One file copied verbatim from source to target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMapping {
  pub src: String,
  pub dest: String,
  pub from: String,
}

/// One directory copied recursively from source to target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryMapping {
  pub src: String,
  pub dest: String,
  #[serde(default)]
  pub excluded: Vec<String>,
  pub files_synced: u64,
  pub files_excluded: u64,
  pub processing_time_ms: u64,
}

/// Aggregate counters surfaced in the PR body so a reviewer can see how the
/// PR was produced without digging through CI logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceStats {
  pub cache_hits: u64,
  pub cache_misses: u64,
  pub total_files_processed: u64,
  pub total_bytes_processed: u64,
}

/// The `sync_metadata` mapping required in every enhanced-format PR body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
  pub source_repo: String,
  pub source_commit: String,
  pub target_repo: String,
  #[serde(default)]
  pub sync_commit: Option<String>,
  pub sync_time: DateTime<Utc>,
}

/// The machine-readable part of a sync pull request, embedded as a fenced
/// YAML block inside an HTML comment in the PR body (see `broadcast-metadata`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PRMetadata {
  pub sync_metadata: SyncMetadata,
  #[serde(default)]
  pub files: Vec<FileMapping>,
  #[serde(default)]
  pub directories: Vec<DirectoryMapping>,
  #[serde(default)]
  pub performance: Option<PerformanceStats>,
}

/// Pre-enhanced PR bodies: a flat payload with no nested `sync_metadata` and
/// no per-file structure. Still accepted on read so pull requests opened
/// before the enhanced format shipped keep classifying correctly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyMetadata {
  pub source_commit: String,
  pub source_repo: String,
  pub source_branch: String,
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub files: Vec<String>,
  #[serde(default)]
  pub transforms_applied: Vec<String>,
}
