//! Encodes and decodes the metadata block embedded in sync pull request bodies.
//!
//! The block is spliced into the body inside an HTML comment so rendered
//! markdown hides it from reviewers, the same delimiter-splicing idiom used
//! elsewhere for stack-metadata blocks in pull request bodies.

use broadcast_types::{BroadcastError, DirectoryMapping, FileMapping, LegacyMetadata, PRMetadata, PerformanceStats, SyncMetadata};
use serde::Deserialize;

const PREFERRED_START: &str = "<!-- go-broadcast-metadata";
const LEGACY_START: &str = "<!-- go-broadcast:metadata";
const END_MARKER: &str = "-->";

/// Same shape as `PRMetadata` but with `sync_metadata` optional, so a missing
/// key can be distinguished from a structurally malformed document.
#[derive(Debug, Deserialize)]
struct RawPRMetadata {
  #[serde(default)]
  sync_metadata: Option<SyncMetadata>,
  #[serde(default)]
  files: Vec<FileMapping>,
  #[serde(default)]
  directories: Vec<DirectoryMapping>,
  #[serde(default)]
  performance: Option<PerformanceStats>,
}

/// Finds the YAML payload between `marker` and the next `-->`, trimmed.
pub fn extract_block<'a>(body: &'a str, marker: &str) -> Result<&'a str, BroadcastError> {
  let marker_start = body.find(marker).ok_or(BroadcastError::PRNoMetadataBlock)?;
  let inner_start = marker_start + marker.len();
  let end_offset = body[inner_start..].find(END_MARKER).ok_or(BroadcastError::PRMetadataNotClosed)?;
  let inner = body[inner_start..inner_start + end_offset].trim();
  if inner.is_empty() {
    return Err(BroadcastError::PRNoMetadataBlock);
  }
  Ok(inner)
}

/// Parses the enhanced (authoritative) metadata form, trying the preferred
/// marker first and falling back to the legacy marker.
pub fn extract_enhanced(body: &str) -> Result<PRMetadata, BroadcastError> {
  let yaml = match extract_block(body, PREFERRED_START) {
    Ok(block) => block,
    Err(_) => extract_block(body, LEGACY_START)?,
  };

  let raw: RawPRMetadata = serde_yaml::from_str(yaml).map_err(|_| BroadcastError::PRNoMetadataBlock)?;
  let sync_metadata = raw.sync_metadata.ok_or(BroadcastError::PRMissingSyncMetadata)?;

  Ok(PRMetadata {
    sync_metadata,
    files: raw.files,
    directories: raw.directories,
    performance: raw.performance,
  })
}

/// Parses the pre-enhanced flat payload directly, with no nested `sync_metadata`.
fn parse_flat_legacy(body: &str) -> Result<LegacyMetadata, BroadcastError> {
  let yaml = match extract_block(body, LEGACY_START) {
    Ok(block) => block,
    Err(_) => extract_block(body, PREFERRED_START)?,
  };
  serde_yaml::from_str(yaml).map_err(|_| BroadcastError::PRNoMetadataBlock)
}

/// Reads a PR body as `LegacyMetadata`, projecting an enhanced body down to
/// the flat shape when that is what is present.
///
/// Tries the enhanced parse first; only on failure does it fall back to
/// parsing the flat form directly.
pub fn extract_legacy(body: &str) -> Result<LegacyMetadata, BroadcastError> {
  if let Ok(enhanced) = extract_enhanced(body) {
    let files = enhanced
      .files
      .iter()
      .map(|f| f.dest.clone())
      .chain(enhanced.directories.iter().map(|d| format!("{}/*", d.dest)))
      .collect();

    return Ok(LegacyMetadata {
      source_commit: enhanced.sync_metadata.source_commit,
      source_repo: enhanced.sync_metadata.source_repo,
      source_branch: String::new(),
      created_at: enhanced.sync_metadata.sync_time,
      files,
      transforms_applied: Vec::new(),
    });
  }

  parse_flat_legacy(body)
}

/// Renders the enhanced metadata as an HTML-comment-delimited YAML block.
pub fn format_enhanced(md: &PRMetadata) -> Result<String, BroadcastError> {
  let yaml = serde_yaml::to_string(md).map_err(|e| BroadcastError::validation(format!("failed to serialize sync metadata: {e}")))?;
  Ok(format!("{PREFERRED_START}\n{}\n{END_MARKER}", yaml.trim_end()))
}

/// Renders the human-facing description shown above the metadata block.
pub fn render_description(md: &PRMetadata, summary: &str) -> String {
  let mut out = String::new();
  out.push_str(summary.trim());
  out.push('\n');

  if md.files.len() <= 10 {
    for f in &md.files {
      out.push('\n');
      if f.src == f.dest {
        out.push_str(&format!("- `{}`", f.dest));
      } else {
        out.push_str(&format!("- `{}` -> `{}`", f.src, f.dest));
      }
    }
  } else {
    out.push_str(&format!("\n- {} files synced", md.files.len()));
  }

  if md.directories.len() <= 5 {
    for d in &md.directories {
      out.push('\n');
      out.push_str(&format!(
        "- `{}` -> `{}` ({} synced, {} excluded, {}ms)",
        d.src, d.dest, d.files_synced, d.files_excluded, d.processing_time_ms
      ));
      if !d.excluded.is_empty() {
        out.push_str(&format!(" [excluded: {}]", d.excluded.join(", ")));
      }
    }
  } else {
    out.push_str(&format!("\n- {} directories synced", md.directories.len()));
  }

  if let Some(perf) = &md.performance {
    let total = perf.cache_hits + perf.cache_misses;
    if total > 0 {
      let hit_rate = perf.cache_hits as f64 / total as f64 * 100.0;
      out.push_str(&format!("\n\nCache hit rate: {hit_rate:.1}%"));
    }
  }

  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use broadcast_types::{DirectoryMapping, FileMapping, PerformanceStats};
  use chrono::{TimeZone, Utc};
  use pretty_assertions::assert_eq;

  fn sample_metadata() -> PRMetadata {
    PRMetadata {
      sync_metadata: SyncMetadata {
        source_repo: "company/template-repo".to_string(),
        source_commit: "abc123".to_string(),
        target_repo: "company/service".to_string(),
        sync_commit: Some("def456".to_string()),
        sync_time: Utc.with_ymd_and_hms(2024, 1, 15, 12, 5, 30).unwrap(),
      },
      files: vec![FileMapping {
        src: "ci/lint.yml".to_string(),
        dest: ".github/workflows/lint.yml".to_string(),
        from: "file".to_string(),
      }],
      directories: vec![DirectoryMapping {
        src: "ci/scripts".to_string(),
        dest: "scripts".to_string(),
        excluded: vec!["scripts/local.sh".to_string()],
        files_synced: 3,
        files_excluded: 1,
        processing_time_ms: 42,
      }],
      performance: Some(PerformanceStats {
        cache_hits: 9,
        cache_misses: 1,
        total_files_processed: 4,
        total_bytes_processed: 2048,
      }),
    }
  }

  #[test]
  fn format_then_extract_enhanced_round_trips() {
    let md = sample_metadata();
    let block = format_enhanced(&md).unwrap();
    let body = format!("Some description.\n\n{block}\n");
    let parsed = extract_enhanced(&body).unwrap();
    assert_eq!(parsed, md);
  }

  #[test]
  fn extract_block_reports_missing_marker() {
    assert!(matches!(extract_block("no markers here", PREFERRED_START), Err(BroadcastError::PRNoMetadataBlock)));
  }

  #[test]
  fn extract_block_reports_unclosed_marker() {
    let body = format!("{PREFERRED_START}\nfoo: bar\n");
    assert!(matches!(extract_block(&body, PREFERRED_START), Err(BroadcastError::PRMetadataNotClosed)));
  }

  #[test]
  fn extract_enhanced_requires_sync_metadata() {
    let body = format!("{PREFERRED_START}\nfiles: []\n{END_MARKER}");
    assert!(matches!(extract_enhanced(&body), Err(BroadcastError::PRMissingSyncMetadata)));
  }

  #[test]
  fn extract_enhanced_falls_back_to_legacy_marker() {
    let md = sample_metadata();
    let yaml = serde_yaml::to_string(&md).unwrap();
    let body = format!("{LEGACY_START}\n{yaml}\n{END_MARKER}");
    let parsed = extract_enhanced(&body).unwrap();
    assert_eq!(parsed, md);
  }

  #[test]
  fn extract_legacy_projects_enhanced_body() {
    let md = sample_metadata();
    let block = format_enhanced(&md).unwrap();
    let body = format!("desc\n\n{block}\n");
    let legacy = extract_legacy(&body).unwrap();
    assert_eq!(legacy.source_commit, "abc123");
    assert_eq!(legacy.source_repo, "company/template-repo");
    assert_eq!(legacy.source_branch, "");
    assert_eq!(legacy.files, vec![".github/workflows/lint.yml".to_string(), "scripts/*".to_string()]);
  }

  #[test]
  fn extract_legacy_reads_flat_form_directly() {
    let yaml = "source_commit: abc123\nsource_repo: company/template-repo\nsource_branch: master\ncreated_at: 2024-01-15T12:05:30Z\nfiles:\n  - a.txt\ntransforms_applied: []\n";
    let body = format!("{LEGACY_START}\n{yaml}{END_MARKER}");
    let legacy = extract_legacy(&body).unwrap();
    assert_eq!(legacy.source_branch, "master");
    assert_eq!(legacy.files, vec!["a.txt".to_string()]);
  }

  #[test]
  fn render_description_lists_files_under_threshold() {
    let md = sample_metadata();
    let rendered = render_description(&md, "Sync files");
    assert!(rendered.contains("ci/lint.yml` -> `.github/workflows/lint.yml"));
    assert!(rendered.contains("Cache hit rate: 90.0%"));
  }

  #[test]
  fn render_description_summarizes_beyond_threshold() {
    let mut md = sample_metadata();
    md.files = (0..11)
      .map(|i| FileMapping {
        src: format!("f{i}"),
        dest: format!("f{i}"),
        from: "file".to_string(),
      })
      .collect();
    let rendered = render_description(&md, "Sync files");
    assert!(rendered.contains("11 files synced"));
  }
}
