use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BroadcastError;

/// An opaque `owner/name` repository handle.
///
/// Validated on construction: non-empty, exactly one `/`, each side matching
/// `[A-Za-z0-9._-]+`, neither side starting with `-`, and no `..` substrings
/// anywhere in the handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoRef(String);

impl RepoRef {
  pub fn new(value: impl Into<String>) -> Result<Self, BroadcastError> {
    let value = value.into();
    validate_repo(&value)?;
    Ok(Self(value))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn owner(&self) -> &str {
    self.0.split('/').next().unwrap_or_default()
  }

  pub fn name(&self) -> &str {
    self.0.rsplit('/').next().unwrap_or_default()
  }
}

fn is_valid_side(side: &str) -> bool {
  !side.is_empty() && !side.starts_with('-') && side.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}

fn validate_repo(value: &str) -> Result<(), BroadcastError> {
  if value.is_empty() {
    return Err(BroadcastError::validation("repo handle cannot be blank"));
  }
  if value.contains("..") {
    return Err(BroadcastError::validation(format!("repo handle '{value}' must not contain '..'")));
  }
  let mut parts = value.split('/');
  let (owner, name, rest) = (parts.next(), parts.next(), parts.next());
  match (owner, name, rest) {
    (Some(owner), Some(name), None) if is_valid_side(owner) && is_valid_side(name) => Ok(()),
    _ => Err(BroadcastError::validation(format!("repo handle '{value}' must be exactly one 'owner/name' pair"))),
  }
}

impl fmt::Display for RepoRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl FromStr for RepoRef {
  type Err = BroadcastError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::new(s)
  }
}

impl TryFrom<String> for RepoRef {
  type Error = BroadcastError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Self::new(value)
  }
}

impl From<RepoRef> for String {
  fn from(value: RepoRef) -> Self {
    value.0
  }
}
