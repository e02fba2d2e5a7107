use broadcast_types::{BroadcastError, DirectoryMapping, FileMapping, RepoRef};
use serde::{Deserialize, Serialize};

fn default_branch() -> String {
  "main".to_string()
}

fn default_pr_title() -> String {
  "Sync files from source".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceSpec {
  pub repo: RepoRef,
  pub branch: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetSpec {
  pub repo: RepoRef,
  #[serde(default = "default_branch")]
  pub branch: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupDefaults {
  #[serde(default)]
  pub files: Vec<FileMapping>,
  #[serde(default)]
  pub directories: Vec<DirectoryMapping>,
  #[serde(default = "default_pr_title")]
  pub pr_title: String,
  #[serde(default)]
  pub pr_labels: Vec<String>,
}

impl Default for GroupDefaults {
  fn default() -> Self {
    Self {
      files: Vec::new(),
      directories: Vec::new(),
      pr_title: default_pr_title(),
      pr_labels: Vec::new(),
    }
  }
}

/// One `{source, targets, defaults}` bundle, as loaded from the config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfigGroup {
  pub id: String,
  pub prefix: String,
  pub source: SourceSpec,
  pub targets: Vec<TargetSpec>,
  #[serde(default)]
  pub defaults: GroupDefaults,
}

impl ConfigGroup {
  pub(crate) fn validate(&self) -> Result<(), BroadcastError> {
    broadcast_branch::validate_prefix(&self.prefix)?;
    if self.targets.is_empty() {
      return Err(BroadcastError::validation(format!("group '{}' has no targets", self.id)));
    }
    Ok(())
  }

  pub(crate) fn to_discover_group(&self) -> broadcast_discover::Group {
    broadcast_discover::Group {
      id: self.id.clone(),
      source: broadcast_discover::SourceRef {
        repo: self.source.repo.clone(),
        branch: self.source.branch.clone(),
      },
      targets: self
        .targets
        .iter()
        .map(|t| broadcast_discover::TargetRef {
          repo: t.repo.clone(),
          branch: t.branch.clone(),
        })
        .collect(),
      prefix: self.prefix.clone(),
    }
  }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
  pub groups: Vec<ConfigGroup>,
}

impl Config {
  pub fn validate(&self) -> Result<(), BroadcastError> {
    if self.groups.is_empty() {
      return Err(BroadcastError::validation("configuration has no groups"));
    }
    for group in &self.groups {
      group.validate()?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> Config {
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
          branch: default_branch(),
        }],
        defaults: GroupDefaults::default(),
      }],
    }
  }

  #[test]
  fn validates_a_well_formed_config() {
    assert!(sample().validate().is_ok());
  }

  #[test]
  fn rejects_empty_groups() {
    let cfg = Config { groups: Vec::new() };
    assert!(matches!(cfg.validate(), Err(BroadcastError::Validation { .. })));
  }

  #[test]
  fn rejects_a_group_with_no_targets() {
    let mut cfg = sample();
    cfg.groups[0].targets.clear();
    assert!(matches!(cfg.validate(), Err(BroadcastError::Validation { .. })));
  }

  #[test]
  fn rejects_an_invalid_prefix() {
    let mut cfg = sample();
    cfg.groups[0].prefix = "bad prefix".to_string();
    assert!(matches!(cfg.validate(), Err(BroadcastError::PrefixInvalid { .. })));
  }

  #[test]
  fn deserializes_from_yaml() {
    let yaml = r#"
groups:
  - id: default
    prefix: chore/sync-files
    source:
      repo: company/template-repo
      branch: master
    targets:
      - repo: company/service
"#;
    let cfg: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.groups.len(), 1);
    assert_eq!(cfg.groups[0].targets[0].branch, "main");
  }
}
