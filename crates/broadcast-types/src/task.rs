use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::BroadcastError;

/// One unit of pool-executed work: syncing a single target repository.
///
/// `name` is used only for logging/diagnostics; it carries no semantics the
/// pool depends on.
#[async_trait]
pub trait Task: Send + Sync {
  fn name(&self) -> &str;
  async fn execute(&self, cancel: CancellationToken) -> Result<(), BroadcastError>;
}
