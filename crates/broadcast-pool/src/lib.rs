//! A fixed-size pool of workers sharing a bounded task queue, with cooperative
//! cancellation, panic isolation, and back-pressure.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use broadcast_types::{BroadcastError, Task};
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Errors from the pool, all one-to-one with a `BroadcastError` sentinel.
pub type PoolError = BroadcastError;

/// The outcome of one task, as delivered on the pool's result channel.
#[derive(Debug, Clone)]
pub struct TaskResult {
  pub name: String,
  pub outcome: Result<(), BroadcastError>,
  pub duration: Duration,
}

/// A cheap, read-only snapshot of pool activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
  pub processed: usize,
  pub active: usize,
  pub queued: usize,
}

impl std::fmt::Display for PoolStats {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "processed={} active={} queued={}", self.processed, self.active, self.queued)
  }
}

#[derive(Default)]
struct StatsInner {
  processed: AtomicUsize,
  active: AtomicUsize,
}

struct PoolInner {
  workers: usize,
  queue_size: usize,
  task_tx: mpsc::Sender<Box<dyn Task>>,
  task_rx: AsyncMutex<mpsc::Receiver<Box<dyn Task>>>,
  result_tx: AsyncMutex<Option<mpsc::Sender<TaskResult>>>,
  result_rx: std::sync::Mutex<Option<mpsc::Receiver<TaskResult>>>,
  started: AtomicBool,
  shutting_down: AtomicBool,
  cancel: AsyncMutex<Option<CancellationToken>>,
  handles: AsyncMutex<Vec<JoinHandle<()>>>,
  stats: StatsInner,
}

/// A bounded worker pool. Cheaply `Clone`-able; clones share the same queue,
/// workers, and stats.
#[derive(Clone)]
pub struct Pool {
  inner: Arc<PoolInner>,
}

impl Pool {
  /// `w` workers sharing a task queue and result channel of capacity `q`.
  pub fn new(workers: usize, queue_size: usize) -> Result<Pool, PoolError> {
    if workers == 0 {
      return Err(PoolError::InvalidWorkers);
    }
    if queue_size == 0 {
      return Err(PoolError::InvalidQueueSize);
    }

    let (task_tx, task_rx) = mpsc::channel(queue_size);
    let (result_tx, result_rx) = mpsc::channel(queue_size);

    Ok(Pool {
      inner: Arc::new(PoolInner {
        workers,
        queue_size,
        task_tx,
        task_rx: AsyncMutex::new(task_rx),
        result_tx: AsyncMutex::new(Some(result_tx)),
        result_rx: std::sync::Mutex::new(Some(result_rx)),
        started: AtomicBool::new(false),
        shutting_down: AtomicBool::new(false),
        cancel: AsyncMutex::new(None),
        handles: AsyncMutex::new(Vec::new()),
        stats: StatsInner::default(),
      }),
    })
  }

  /// Spawns `workers` tasks pulling from the shared queue. A second call is a
  /// no-op.
  #[instrument(skip(self, parent))]
  pub async fn start(&self, parent: CancellationToken) {
    if self.inner.started.swap(true, Ordering::SeqCst) {
      return;
    }

    let child = parent.child_token();
    *self.inner.cancel.lock().await = Some(child.clone());

    let result_tx = self.inner.result_tx.lock().await.clone();
    let Some(result_tx) = result_tx else {
      return;
    };

    let mut handles = Vec::with_capacity(self.inner.workers);
    for _ in 0..self.inner.workers {
      let inner = self.inner.clone();
      let cancel = child.clone();
      let result_tx = result_tx.clone();
      handles.push(tokio::spawn(run_worker(inner, cancel, result_tx)));
    }
    *self.inner.handles.lock().await = handles;
  }

  /// Enqueues a task without blocking. Non-blocking by design: a full queue
  /// is back-pressure, not a reason to stall the caller.
  pub fn submit(&self, task: Box<dyn Task>) -> Result<(), PoolError> {
    if self.inner.shutting_down.load(Ordering::SeqCst) {
      return Err(PoolError::PoolShuttingDown);
    }
    self.inner.task_tx.try_send(task).map_err(|err| match err {
      mpsc::error::TrySendError::Full(_) => PoolError::TaskQueueFull,
      mpsc::error::TrySendError::Closed(_) => PoolError::PoolShuttingDown,
    })
  }

  /// Submits every task in order, stopping at the first failure. Tasks
  /// already enqueued keep running.
  pub fn submit_batch(&self, tasks: Vec<Box<dyn Task>>) -> Result<(), PoolError> {
    for task in tasks {
      self.submit(task)?;
    }
    Ok(())
  }

  /// Hands over the result stream. Returns `None` if already taken.
  pub fn results(&self) -> Option<ReceiverStream<TaskResult>> {
    self.inner.result_rx.lock().unwrap().take().map(ReceiverStream::new)
  }

  pub fn stats(&self) -> PoolStats {
    let queued = self.inner.queue_size.saturating_sub(self.inner.task_tx.capacity());
    PoolStats {
      processed: self.inner.stats.processed.load(Ordering::SeqCst),
      active: self.inner.stats.active.load(Ordering::SeqCst),
      queued,
    }
  }

  /// Cancels the pool's scope, closes the task queue so workers drain and
  /// exit, then joins every worker. A second call is a no-op.
  pub async fn shutdown(&self) {
    if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
      return;
    }
    if let Some(cancel) = self.inner.cancel.lock().await.as_ref() {
      cancel.cancel();
    }
    self.inner.task_rx.lock().await.close();

    let handles: Vec<_> = self.inner.handles.lock().await.drain(..).collect();
    for handle in handles {
      let _ = handle.await;
    }

    self.inner.result_tx.lock().await.take();
  }
}

async fn run_worker(inner: Arc<PoolInner>, cancel: CancellationToken, result_tx: mpsc::Sender<TaskResult>) {
  loop {
    let task = {
      let mut rx = inner.task_rx.lock().await;
      rx.recv().await
    };
    let Some(task) = task else {
      break;
    };

    let name = task.name().to_string();
    inner.stats.active.fetch_add(1, Ordering::SeqCst);
    let t0 = Instant::now();

    let outcome = if cancel.is_cancelled() {
      Err(BroadcastError::canceled("task execution canceled"))
    } else {
      match AssertUnwindSafe(task.execute(cancel.clone())).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(BroadcastError::TaskPanicked { payload: panic_payload_to_string(panic) }),
      }
    };

    let duration = t0.elapsed();
    inner.stats.active.fetch_sub(1, Ordering::SeqCst);
    inner.stats.processed.fetch_add(1, Ordering::SeqCst);

    let result = TaskResult { name, outcome, duration };
    tokio::select! {
      send_res = result_tx.send(result) => {
        if send_res.is_err() {
          debug!("result receiver dropped, discarding result");
        }
      }
      _ = cancel.cancelled() => {
        debug!("dropping task result: cancellation observed while send was pending");
      }
    }
  }
}

fn panic_payload_to_string(payload: Box<dyn std::any::Any + Send>) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic payload".to_string()
  }
}
