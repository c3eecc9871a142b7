//! Single-flight operation queue.
//!
//! Every mutation of the dataset or the bucket is submitted here under a
//! name. One drain task runs the queue strictly FIFO, one operation at a
//! time:
//! - a name that is already pending or running is not queued again
//! - each operation is bounded by its timeout; on expiry the caller gets
//!   `OperationTimeout` and the queue moves on, but the operation's task is
//!   left to finish on its own (network calls are not cancelled)
//! - a failure is reported to its caller only; the next operation runs

use crate::error::{SyncError, SyncResult};
use futures::future::{BoxFuture, FutureExt};
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Scheduled daily run.
pub const OP_DAILY_SYNC: &str = "daily-sync";
/// User-triggered sync, push or pull.
pub const OP_MANUAL_SYNC: &str = "manual-sync";
/// Settings save.
pub const OP_SETTINGS_CHANGE: &str = "settings-change";
/// Restore of a specific backup.
pub const OP_RESTORE: &str = "restore-backup";
/// Named snapshot upload.
pub const OP_SNAPSHOT: &str = "create-snapshot";

type Action = Box<dyn FnOnce() -> BoxFuture<'static, SyncResult<()>> + Send>;

struct QueuedOperation {
    id: Uuid,
    name: String,
    action: Action,
    timeout: Duration,
    enqueued_at: Instant,
    reply: oneshot::Sender<SyncResult<()>>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueuedOperation>,
    running: Option<String>,
    completed: HashSet<String>,
    last_error: Option<String>,
    closed: bool,
}

impl QueueState {
    fn is_active(&self, name: &str) -> bool {
        self.running.as_deref() == Some(name) || self.pending.iter().any(|op| op.name == name)
    }
}

struct Shared {
    state: Mutex<QueueState>,
    wake: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Never held across an await, and every update is a single step.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Result of submitting an operation.
#[derive(Debug)]
pub enum EnqueueOutcome {
    Queued(OperationTicket),
    /// An operation with the same name is already pending or running.
    Duplicate,
}

impl EnqueueOutcome {
    pub fn into_ticket(self) -> Option<OperationTicket> {
        match self {
            EnqueueOutcome::Queued(ticket) => Some(ticket),
            EnqueueOutcome::Duplicate => None,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, EnqueueOutcome::Duplicate)
    }
}

/// Completion handle for a queued operation.
#[derive(Debug)]
pub struct OperationTicket {
    id: Uuid,
    name: String,
    rx: oneshot::Receiver<SyncResult<()>>,
}

impl OperationTicket {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for the operation to finish and returns its result.
    pub async fn wait(self) -> SyncResult<()> {
        self.rx.await.map_err(|_| SyncError::QueueClosed)?
    }
}

/// Serializes named operations onto one execution lane.
pub struct OperationQueue {
    shared: Arc<Shared>,
    drain: Mutex<Option<JoinHandle<()>>>,
}

impl OperationQueue {
    /// Creates the queue and spawns its drain task on the current runtime.
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            wake: Notify::new(),
        });
        let drain = tokio::spawn(drain(shared.clone()));
        Self {
            shared,
            drain: Mutex::new(Some(drain)),
        }
    }

    /// Submits `action` under `name`, bounded by `timeout`.
    pub fn enqueue<F, Fut>(
        &self,
        name: impl Into<String>,
        timeout: Duration,
        action: F,
    ) -> SyncResult<EnqueueOutcome>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = SyncResult<()>> + Send + 'static,
    {
        let name = name.into();
        let mut state = self.shared.lock();

        if state.closed {
            return Err(SyncError::QueueClosed);
        }
        if state.is_active(&name) {
            debug!("operation {name} already queued, skipping");
            return Ok(EnqueueOutcome::Duplicate);
        }

        let (reply, rx) = oneshot::channel();
        let id = Uuid::now_v7();
        state.pending.push_back(QueuedOperation {
            id,
            name: name.clone(),
            action: Box::new(move || action().boxed()),
            timeout,
            enqueued_at: Instant::now(),
            reply,
        });
        debug!(
            "queued operation {name} ({id}), {} pending",
            state.pending.len()
        );
        drop(state);

        self.shared.wake.notify_one();
        Ok(EnqueueOutcome::Queued(OperationTicket { id, name, rx }))
    }

    /// Number of operations waiting to run (excluding the running one).
    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Name of the operation currently running.
    pub fn running(&self) -> Option<String> {
        self.shared.lock().running.clone()
    }

    /// True if `name` is pending or running.
    pub fn is_active(&self, name: &str) -> bool {
        self.shared.lock().is_active(name)
    }

    /// True if an operation named `name` has succeeded since the last
    /// [`clear_completed`](Self::clear_completed).
    pub fn has_completed(&self, name: &str) -> bool {
        self.shared.lock().completed.contains(name)
    }

    pub fn clear_completed(&self, name: &str) {
        self.shared.lock().completed.remove(name);
    }

    /// Most recent failure, as `"<name>: <error>"`.
    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().last_error.clone()
    }

    /// Stops accepting work, runs what is already queued, then stops the
    /// drain task.
    pub async fn shutdown(&self) {
        self.shared.lock().closed = true;
        self.shared.wake.notify_one();

        let handle = self
            .drain
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("operation queue drain task ended abnormally: {e}");
            }
        }
        info!("operation queue stopped");
    }
}

impl Default for OperationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for OperationQueue {
    fn drop(&mut self) {
        self.shared.lock().closed = true;
        self.shared.wake.notify_one();
    }
}

async fn drain(shared: Arc<Shared>) {
    loop {
        let next = {
            let mut state = shared.lock();
            match state.pending.pop_front() {
                Some(op) => {
                    state.running = Some(op.name.clone());
                    Some(op)
                }
                None if state.closed => return,
                None => None,
            }
        };

        let Some(op) = next else {
            shared.wake.notified().await;
            continue;
        };

        let QueuedOperation {
            id,
            name,
            action,
            timeout,
            enqueued_at,
            reply,
        } = op;

        debug!(
            "running operation {name} ({id}) after {:?} in queue",
            enqueued_at.elapsed()
        );
        let started = Instant::now();
        let result = run_bounded(&name, action, timeout).await;

        {
            let mut state = shared.lock();
            state.running = None;
            match &result {
                Ok(()) => {
                    state.completed.insert(name.clone());
                }
                Err(e) => {
                    state.last_error = Some(format!("{name}: {e}"));
                }
            }
        }

        match &result {
            Ok(()) => info!("operation {name} completed in {:?}", started.elapsed()),
            Err(e) => error!("operation {name} failed: {e}"),
        }

        // The caller may have stopped waiting; that is not an error here.
        let _ = reply.send(result);
    }
}

async fn run_bounded(name: &str, action: Action, timeout: Duration) -> SyncResult<()> {
    let task = tokio::spawn(action());

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => {
            let reason = if join_err.is_panic() {
                "operation panicked".to_string()
            } else {
                join_err.to_string()
            };
            Err(SyncError::OperationFailed {
                name: name.to_string(),
                reason,
            })
        }
        Err(_) => {
            warn!("operation {name} exceeded {timeout:?}; leaving it to finish in the background");
            Err(SyncError::OperationTimeout {
                name: name.to_string(),
                timeout,
            })
        }
    }
}
