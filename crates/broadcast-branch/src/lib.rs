//! Formats and parses sync branch names.
//!
//! Branch names carry enough state to reconstruct `BranchMetadata` without a
//! round-trip to the provider: `{prefix}-{group_id}-{YYYYMMDD}-{HHMMSS}-{sha}`.

use std::sync::Arc;

use broadcast_types::{BranchMetadata, BroadcastError};
use chrono::{DateTime, NaiveDateTime, Utc};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

/// Process-wide cache of compiled patterns keyed by prefix.
///
/// `parse_branch` runs once per branch per target per run, so a cold regex
/// compile on every call would dominate discovery time for large fan-outs.
/// Lock-free reads make redundant compiles on the race window harmless.
static PATTERN_CACHE: Lazy<DashMap<String, Arc<Regex>>> = Lazy::new(DashMap::new);

fn pattern_for(prefix: &str) -> Arc<Regex> {
  if let Some(existing) = PATTERN_CACHE.get(prefix) {
    return existing.clone();
  }
  let escaped = regex::escape(prefix);
  let pattern = format!(r"^{escaped}-(?P<group>[A-Za-z0-9_-]+)-(?P<date>\d{{8}})-(?P<time>\d{{6}})-(?P<sha>[0-9a-fA-F]+)$");
  let compiled = Arc::new(Regex::new(&pattern).expect("generated branch pattern is always valid"));
  PATTERN_CACHE.insert(prefix.to_string(), compiled.clone());
  compiled
}

fn legacy_pattern_for(prefix: &str) -> Regex {
  let escaped = regex::escape(prefix);
  let pattern = format!(r"^{escaped}-(?P<date>\d{{8}})-(?P<time>\d{{6}})-(?P<sha>[0-9a-fA-F]+)$");
  Regex::new(&pattern).expect("generated legacy branch pattern is always valid")
}

/// Rejects a blank prefix or one containing characters outside `[A-Za-z0-9/_-]`.
pub fn validate_prefix(prefix: &str) -> Result<(), BroadcastError> {
  if prefix.is_empty() {
    return Err(BroadcastError::PrefixEmpty);
  }
  if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '/' || c == '_' || c == '-') {
    return Err(BroadcastError::PrefixInvalid { prefix: prefix.to_string() });
  }
  Ok(())
}

/// Builds the canonical branch name. Never emits the legacy (groupless) form.
pub fn format_branch(prefix: &str, group_id: &str, t: DateTime<Utc>, sha: &str) -> String {
  format!("{prefix}-{group_id}-{}-{sha}", t.format("%Y%m%d-%H%M%S"))
}

fn parse_timestamp(date: &str, time: &str) -> Option<DateTime<Utc>> {
  let combined = format!("{date}{time}");
  let naive = NaiveDateTime::parse_from_str(&combined, "%Y%m%d%H%M%S").ok()?;
  Some(naive.and_utc())
}

/// Parses a branch name produced by `format_branch`, or a legacy (groupless)
/// name, anchored against the full string.
///
/// Structural mismatch (wrong shape, wrong prefix) yields `NotSyncBranch`. A
/// name matching the shape but carrying a calendar-invalid date or time (the
/// regex only constrains digit widths, e.g. month `13` or hour `99` still
/// match) yields `InvalidTimestamp` instead, so callers can tell "not one of
/// ours" apart from "ours, but corrupt."
pub fn parse_branch(name: &str, prefix: &str) -> Result<BranchMetadata, BroadcastError> {
  validate_prefix(prefix)?;

  let pattern = pattern_for(prefix);
  if let Some(caps) = pattern.captures(name) {
    let date = &caps["date"];
    let time = &caps["time"];
    let timestamp = parse_timestamp(date, time).ok_or_else(|| {
      tracing::warn!(branch = name, "sync branch matches shape but has an invalid timestamp");
      BroadcastError::InvalidTimestamp { name: name.to_string() }
    })?;
    trace!(branch = name, "parsed sync branch");
    return Ok(BranchMetadata {
      prefix: prefix.to_string(),
      group_id: caps["group"].to_string(),
      timestamp,
      commit_sha: caps["sha"].to_string(),
    });
  }

  let legacy = legacy_pattern_for(prefix);
  if let Some(caps) = legacy.captures(name) {
    let date = &caps["date"];
    let time = &caps["time"];
    let timestamp = parse_timestamp(date, time).ok_or_else(|| {
      tracing::warn!(branch = name, "legacy sync branch matches shape but has an invalid timestamp");
      BroadcastError::InvalidTimestamp { name: name.to_string() }
    })?;
    trace!(branch = name, "parsed legacy sync branch");
    return Ok(BranchMetadata {
      prefix: prefix.to_string(),
      group_id: String::new(),
      timestamp,
      commit_sha: caps["sha"].to_string(),
    });
  }

  Err(BroadcastError::NotSyncBranch { name: name.to_string() })
}
