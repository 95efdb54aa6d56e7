//! Sequential task queue.
//!
//! Serialises asynchronous, side-effecting work with concurrency one. Pending
//! tasks are ordered by ascending priority and first-in-first-out among equal
//! priorities. A more urgent submission is inserted ahead of less urgent
//! pending work but never preempts the task that is already running.
//!
//! ```text
//!  submit(p=5) ─┐
//!  submit(p=1) ─┼─► [ p1 | p3 | p5 | p5 ] ──► worker ──► TaskHandle
//!  submit(p=3) ─┘        pending (sorted)      (one at a time)
//!  bypass ───────────────────────────────────► spawned directly
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::task::{Context, Poll};

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch, Notify};

use crate::{FiberError, FiberResult};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Scheduling options for a single task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskOptions {
    /// Lower runs first; `None` counts as `0`.
    pub priority: Option<i32>,
    /// Run immediately outside the queue.
    pub bypass: bool,
}

impl TaskOptions {
    /// Options with a fixed priority.
    #[must_use]
    pub const fn with_priority(priority: i32) -> Self {
        Self {
            priority: Some(priority),
            bypass: false,
        }
    }

    /// Options that skip the queue.
    #[must_use]
    pub const fn bypass() -> Self {
        Self {
            priority: None,
            bypass: true,
        }
    }

    /// Effective priority.
    #[must_use]
    pub const fn effective_priority(&self) -> i32 {
        match self.priority {
            Some(priority) => priority,
            None => 0,
        }
    }
}

enum HandleState<T> {
    Waiting(oneshot::Receiver<FiberResult<T>>),
    Failed(Option<FiberError>),
}

/// Resolves with the outcome of a submitted task.
///
/// Dropping the handle does not cancel the task.
pub struct TaskHandle<T> {
    state: HandleState<T>,
}

impl<T> TaskHandle<T> {
    fn failed(error: FiberError) -> Self {
        Self {
            state: HandleState::Failed(Some(error)),
        }
    }

    /// A handle that is already resolved to [`FiberError::Discarded`].
    #[must_use]
    pub fn discarded() -> Self {
        Self::failed(FiberError::Discarded)
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = FiberResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            HandleState::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(FiberError::Discarded))),
            HandleState::Failed(error) => {
                Poll::Ready(Err(error.take().unwrap_or(FiberError::Discarded)))
            }
        }
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            HandleState::Waiting(_) => "waiting",
            HandleState::Failed(_) => "failed",
        };
        f.debug_struct("TaskHandle").field("state", &state).finish()
    }
}

/// Wrap a task into a type-erased job plus the handle observing it.
///
/// Panics inside the task are caught and reported as
/// [`FiberError::TaskPanicked`]; dropping the job unrun resolves the handle to
/// [`FiberError::Discarded`].
fn package<F, Fut, T>(task: F) -> (Job, TaskHandle<T>)
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = FiberResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let job: Job = Box::pin(async move {
        let outcome = AssertUnwindSafe(async move { task().await })
            .catch_unwind()
            .await
            .unwrap_or(Err(FiberError::TaskPanicked));
        if let Err(FiberError::TaskPanicked) = &outcome {
            tracing::error!("Queued task panicked");
        }
        // The caller may have dropped the handle.
        let _ = tx.send(outcome);
    });
    let handle = TaskHandle {
        state: HandleState::Waiting(rx),
    };
    (job, handle)
}

/// Run a task on the current runtime right away, outside any queue.
///
/// The handle resolves to [`FiberError::NoRuntime`] when called outside a
/// tokio runtime.
pub fn spawn_detached<F, Fut, T>(task: F) -> TaskHandle<T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = FiberResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let Ok(runtime) = Handle::try_current() else {
        return TaskHandle::failed(FiberError::NoRuntime);
    };
    let (job, handle) = package(task);
    runtime.spawn(job);
    handle
}

struct PendingTask {
    priority: i32,
    job: Job,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Paused,
    Running,
    Closed,
}

struct QueueState {
    pending: VecDeque<PendingTask>,
    phase: Phase,
    worker_spawned: bool,
}

struct QueueInner {
    state: Mutex<QueueState>,
    wake: Arc<Notify>,
    /// Pending plus running tasks, bypassed ones included.
    outstanding: watch::Sender<usize>,
}

impl QueueInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track(&self) {
        self.outstanding.send_modify(|n| *n += 1);
    }

    fn finish(&self, count: usize) {
        if count > 0 {
            self.outstanding.send_modify(|n| *n = n.saturating_sub(count));
        }
    }
}

impl Drop for QueueInner {
    fn drop(&mut self) {
        // Let a parked worker observe that the queue is gone.
        self.wake.notify_one();
    }
}

/// Priority/FIFO task queue with concurrency one.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct SequentialTaskQueue {
    inner: Arc<QueueInner>,
}

impl SequentialTaskQueue {
    /// Create a paused queue. Submissions are buffered until [`start`](Self::start).
    #[must_use]
    pub fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    phase: Phase::Paused,
                    worker_spawned: false,
                }),
                wake: Arc::new(Notify::new()),
                outstanding,
            }),
        }
    }

    /// Submit a task.
    ///
    /// Bypassed tasks are spawned at once; others wait for their turn. After
    /// [`close`](Self::close) the handle resolves to [`FiberError::Discarded`].
    pub fn submit<F, Fut, T>(&self, task: F, options: TaskOptions) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FiberResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        if options.bypass {
            return self.submit_bypass(task);
        }

        let priority = options.effective_priority();
        let (job, handle) = package(task);
        let mut state = self.inner.lock();
        if state.phase == Phase::Closed {
            return TaskHandle::discarded();
        }
        let index = state.pending.partition_point(|t| t.priority <= priority);
        state.pending.insert(index, PendingTask { priority, job });
        let pending = state.pending.len();
        drop(state);

        self.inner.track();
        tracing::debug!(priority, position = index, pending, "Queued task");
        self.inner.wake.notify_one();
        handle
    }

    fn submit_bypass<F, Fut, T>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FiberResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            return TaskHandle::discarded();
        }
        let Ok(runtime) = Handle::try_current() else {
            return TaskHandle::failed(FiberError::NoRuntime);
        };
        let (job, handle) = package(task);
        self.inner.track();
        let inner = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            job.await;
            if let Some(inner) = inner.upgrade() {
                inner.finish(1);
            }
        });
        tracing::debug!("Bypassed queue");
        handle
    }

    /// Begin (or resume) draining pending tasks.
    ///
    /// # Errors
    ///
    /// Returns [`FiberError::NoRuntime`] outside a tokio runtime and
    /// [`FiberError::InvalidOperation`] once the queue is closed.
    pub fn start(&self) -> FiberResult<()> {
        let mut state = self.inner.lock();
        match state.phase {
            Phase::Closed => {
                return Err(FiberError::InvalidOperation(
                    "cannot start a closed queue".to_string(),
                ))
            }
            Phase::Running => return Ok(()),
            Phase::Paused => {}
        }
        if !state.worker_spawned {
            let runtime = Handle::try_current().map_err(|_| FiberError::NoRuntime)?;
            runtime.spawn(drain(
                Arc::downgrade(&self.inner),
                Arc::clone(&self.inner.wake),
            ));
            state.worker_spawned = true;
        }
        state.phase = Phase::Running;
        let pending = state.pending.len();
        drop(state);

        tracing::debug!(pending, "Queue started");
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Stop dispatching after the running task completes.
    pub fn pause(&self) {
        let mut state = self.inner.lock();
        if state.phase == Phase::Running {
            state.phase = Phase::Paused;
            tracing::debug!("Queue paused");
        }
    }

    /// Discard pending tasks and stop the worker. Irreversible.
    ///
    /// Handles of discarded tasks resolve to [`FiberError::Discarded`]; a task
    /// that is already running completes normally.
    pub fn close(&self) {
        let discarded: Vec<PendingTask> = {
            let mut state = self.inner.lock();
            if state.phase == Phase::Closed {
                return;
            }
            state.phase = Phase::Closed;
            state.pending.drain(..).collect()
        };
        let count = discarded.len();
        drop(discarded);

        self.inner.finish(count);
        self.inner.wake.notify_one();
        tracing::debug!(discarded = count, "Queue closed");
    }

    /// Resolve once no task is pending or running.
    ///
    /// A paused queue with pending tasks never becomes idle.
    pub async fn on_idle(&self) {
        let mut rx = self.inner.outstanding.subscribe();
        // The sender lives in `self.inner`, so the channel stays open.
        let _ = rx.wait_for(|outstanding| *outstanding == 0).await;
    }

    /// Number of tasks waiting for their turn.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Whether nothing is pending or running.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        *self.inner.outstanding.borrow() == 0
    }

    /// Whether the queue is currently dispatching.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.inner.lock().phase == Phase::Running
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().phase == Phase::Closed
    }
}

impl Default for SequentialTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SequentialTaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("SequentialTaskQueue")
            .field("phase", &state.phase)
            .field("pending", &state.pending.len())
            .finish_non_exhaustive()
    }
}

/// Worker loop: runs one task at a time until the queue is closed or dropped.
async fn drain(queue: Weak<QueueInner>, wake: Arc<Notify>) {
    loop {
        let next = {
            let Some(inner) = queue.upgrade() else {
                return;
            };
            let mut state = inner.lock();
            match state.phase {
                Phase::Closed => {
                    state.worker_spawned = false;
                    return;
                }
                Phase::Paused => None,
                Phase::Running => state.pending.pop_front(),
            }
        };

        match next {
            Some(task) => {
                tracing::trace!(priority = task.priority, "Running queued task");
                task.job.await;
                match queue.upgrade() {
                    Some(inner) => inner.finish(1),
                    None => return,
                }
            }
            None => wake.notified().await,
        }
    }
}
