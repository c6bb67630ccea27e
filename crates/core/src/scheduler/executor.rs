//! Scheduler implementation.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::{Notify, oneshot};
use tracing::{trace, warn};

use super::error::SchedulerError;
use super::priority::Priority;

pub(super) type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// A submitted operation waiting for a free slot.
pub(super) struct QueuedTask {
    priority: Priority,
    seq: u64,
    job: Job,
}

impl QueuedTask {
    pub(super) fn new(priority: Priority, seq: u64, job: Job) -> Self {
        Self { priority, seq, job }
    }

    #[cfg(test)]
    pub(super) fn priority(&self) -> Priority {
        self.priority
    }

    #[cfg(test)]
    pub(super) fn seq(&self) -> u64 {
        self.seq
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl Ord for QueuedTask {
    // `BinaryHeap` pops the greatest element, so the lowest (priority, seq)
    // must compare greatest.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct State {
    queue: BinaryHeap<QueuedTask>,
    in_flight: usize,
    next_seq: u64,
}

struct Inner {
    max_concurrency: usize,
    state: Mutex<State>,
    idle: Notify,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_idle(&self) -> bool {
        let state = self.lock();
        state.in_flight == 0 && state.queue.is_empty()
    }

    /// Starts queued tasks until the concurrency bound is reached.
    fn dispatch(self: &Arc<Self>) {
        let Ok(handle) = Handle::try_current() else {
            warn!("no tokio runtime available, queued storage tasks stay pending");
            return;
        };

        let ready = {
            let mut state = self.lock();
            let mut ready = Vec::new();
            while state.in_flight < self.max_concurrency {
                let Some(task) = state.queue.pop() else {
                    break;
                };
                state.in_flight += 1;
                ready.push(task);
            }
            ready
        };

        for task in ready {
            trace!(priority = %task.priority, seq = task.seq, "starting scheduled task");
            let slot = Slot {
                inner: Arc::clone(self),
            };
            handle.spawn(async move {
                let _slot = slot;
                (task.job)().await;
            });
        }
    }

    fn release(self: &Arc<Self>) {
        let idle = {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            state.in_flight == 0 && state.queue.is_empty()
        };
        if idle {
            self.idle.notify_waiters();
        }
        self.dispatch();
    }
}

/// Occupied concurrency slot, released on drop (including on panic).
struct Slot {
    inner: Arc<Inner>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.inner.release();
    }
}

/// Bounded-concurrency, priority-ordered executor.
///
/// One instance per storage client. Started operations run as tokio tasks,
/// so a caller dropping its [`TaskHandle`] does not cancel the operation; the
/// slot stays occupied until the operation settles.
pub struct TaskScheduler {
    inner: Arc<Inner>,
}

impl TaskScheduler {
    /// Creates a scheduler running at most `max_concurrency` operations at
    /// once. A bound of zero is treated as one.
    #[must_use]
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                max_concurrency: max_concurrency.max(1),
                state: Mutex::new(State::default()),
                idle: Notify::new(),
            }),
        }
    }

    /// Submits an operation and returns a handle resolving to its output.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit<F, Fut, T>(&self, priority: Priority, operation: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let job: Job = Box::new(move || {
            async move {
                let output = operation().await;
                // The caller may have stopped waiting.
                let _ = sender.send(output);
            }
            .boxed()
        });

        {
            let mut state = self.inner.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.queue.push(QueuedTask::new(priority, seq, job));
        }
        self.inner.dispatch();

        TaskHandle { receiver }
    }

    /// Maximum number of concurrently running operations.
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.inner.max_concurrency
    }

    /// Number of operations currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight
    }

    /// Number of operations waiting for a slot.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Waits until no operation is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("TaskScheduler")
            .field("max_concurrency", &self.inner.max_concurrency)
            .field("in_flight", &state.in_flight)
            .field("queued", &state.queue.len())
            .finish()
    }
}

/// Pending result of a scheduled operation.
#[must_use = "the operation's result is only observable through its handle"]
pub struct TaskHandle<T> {
    receiver: oneshot::Receiver<T>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, SchedulerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.map_err(|_| SchedulerError::TaskAborted))
    }
}
