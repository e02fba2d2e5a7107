use std::fmt;

/// What went wrong, independent of where it surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Validation,
  Provider,
  Parse,
  Panic,
  Canceled,
  Invariant,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ErrorKind::Validation => "validation",
      ErrorKind::Provider => "provider",
      ErrorKind::Parse => "parse",
      ErrorKind::Panic => "panic",
      ErrorKind::Canceled => "canceled",
      ErrorKind::Invariant => "invariant",
    };
    write!(f, "{s}")
  }
}

/// Stable, matchable error type for the sync engine.
///
/// Each variant corresponds to one of the sentinel error names in the
/// external interface contract. Display output names the sentinel first so
/// tests and log lines can grep for it without downcasting.
#[derive(Debug, Clone)]
pub enum BroadcastError {
  NotSyncBranch { name: String },
  InvalidTimestamp { name: String },
  PrefixEmpty,
  PrefixInvalid { prefix: String },
  PRNoDescription,
  PRNoMetadataBlock,
  PRMetadataNotClosed,
  PRMissingSyncMetadata,
  PoolShuttingDown,
  TaskQueueFull,
  TaskPanicked { payload: String },
  NilTask,
  InvalidWorkers,
  InvalidQueueSize,
  Canceled { step: String },
  Validation { message: String },
  Provider { repo: String, message: String },
  Invariant { message: String },
}

impl BroadcastError {
  pub fn validation(message: impl Into<String>) -> Self {
    BroadcastError::Validation { message: message.into() }
  }

  pub fn provider(repo: impl Into<String>, message: impl Into<String>) -> Self {
    BroadcastError::Provider {
      repo: repo.into(),
      message: message.into(),
    }
  }

  pub fn canceled(step: impl Into<String>) -> Self {
    BroadcastError::Canceled { step: step.into() }
  }

  pub fn invariant(message: impl Into<String>) -> Self {
    BroadcastError::Invariant { message: message.into() }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      BroadcastError::NotSyncBranch { .. }
      | BroadcastError::InvalidTimestamp { .. }
      | BroadcastError::PRNoDescription
      | BroadcastError::PRNoMetadataBlock
      | BroadcastError::PRMetadataNotClosed
      | BroadcastError::PRMissingSyncMetadata => ErrorKind::Parse,
      BroadcastError::PrefixEmpty | BroadcastError::PrefixInvalid { .. } | BroadcastError::Validation { .. } | BroadcastError::InvalidWorkers | BroadcastError::InvalidQueueSize | BroadcastError::NilTask => {
        ErrorKind::Validation
      }
      BroadcastError::PoolShuttingDown | BroadcastError::TaskQueueFull => ErrorKind::Invariant,
      BroadcastError::TaskPanicked { .. } => ErrorKind::Panic,
      BroadcastError::Canceled { .. } => ErrorKind::Canceled,
      BroadcastError::Provider { .. } => ErrorKind::Provider,
      BroadcastError::Invariant { .. } => ErrorKind::Invariant,
    }
  }

  /// The stable sentinel name, as named in the external interface contract.
  pub fn sentinel(&self) -> &'static str {
    match self {
      BroadcastError::NotSyncBranch { .. } => "NotSyncBranch",
      BroadcastError::InvalidTimestamp { .. } => "InvalidTimestamp",
      BroadcastError::PrefixEmpty => "BranchPrefixEmpty",
      BroadcastError::PrefixInvalid { .. } => "BranchPrefixInvalid",
      BroadcastError::PRNoDescription => "PRNoDescription",
      BroadcastError::PRNoMetadataBlock => "PRNoMetadataBlock",
      BroadcastError::PRMetadataNotClosed => "PRMetadataNotClosed",
      BroadcastError::PRMissingSyncMetadata => "PRMissingSyncMetadata",
      BroadcastError::PoolShuttingDown => "PoolShuttingDown",
      BroadcastError::TaskQueueFull => "TaskQueueFull",
      BroadcastError::TaskPanicked { .. } => "TaskPanicked",
      BroadcastError::NilTask => "NilTask",
      BroadcastError::InvalidWorkers => "InvalidWorkers",
      BroadcastError::InvalidQueueSize => "InvalidQueueSize",
      BroadcastError::Canceled { .. } => "Canceled",
      BroadcastError::Validation { .. } => "Validation",
      BroadcastError::Provider { .. } => "Provider",
      BroadcastError::Invariant { .. } => "Invariant",
    }
  }
}

impl fmt::Display for BroadcastError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BroadcastError::NotSyncBranch { name } => write!(f, "{}: '{name}' is not a sync branch", self.sentinel()),
      BroadcastError::InvalidTimestamp { name } => write!(f, "{}: '{name}' has a sync-branch shape but an invalid timestamp", self.sentinel()),
      BroadcastError::PrefixEmpty => write!(f, "{}: branch prefix cannot be blank", self.sentinel()),
      BroadcastError::PrefixInvalid { prefix } => write!(f, "{}: branch prefix '{prefix}' contains invalid characters", self.sentinel()),
      BroadcastError::PRNoDescription => write!(f, "{}: pull request has no description", self.sentinel()),
      BroadcastError::PRNoMetadataBlock => write!(f, "{}: no metadata block found in pull request body", self.sentinel()),
      BroadcastError::PRMetadataNotClosed => write!(f, "{}: metadata block is missing its closing marker", self.sentinel()),
      BroadcastError::PRMissingSyncMetadata => write!(f, "{}: metadata block is missing required syncMetadata", self.sentinel()),
      BroadcastError::PoolShuttingDown => write!(f, "{}: pool is shutting down", self.sentinel()),
      BroadcastError::TaskQueueFull => write!(f, "{}: task queue is full", self.sentinel()),
      BroadcastError::TaskPanicked { payload } => write!(f, "{}: task panicked: {payload}", self.sentinel()),
      BroadcastError::NilTask => write!(f, "{}: task cannot be nil", self.sentinel()),
      BroadcastError::InvalidWorkers => write!(f, "{}: worker count must be at least 1", self.sentinel()),
      BroadcastError::InvalidQueueSize => write!(f, "{}: queue size must be at least 1", self.sentinel()),
      BroadcastError::Canceled { step } => write!(f, "{}: {step}", self.sentinel()),
      BroadcastError::Validation { message } => write!(f, "{}: {message}", self.sentinel()),
      BroadcastError::Provider { repo, message } => write!(f, "{}: {repo}: {message}", self.sentinel()),
      BroadcastError::Invariant { message } => write!(f, "{}: {message}", self.sentinel()),
    }
  }
}

impl std::error::Error for BroadcastError {}
