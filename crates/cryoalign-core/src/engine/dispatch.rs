//! # Task Dispatch
//!
//! A small submit/poll/wait abstraction over the executors that run batches of
//! particle alignments.
//!
//! ## Architecture
//!
//! - [`AlignTask`] is a self-contained unit of work that owns (or shares through
//!   `Arc`) everything it reads and reports progress through a
//!   [`ProgressReporter`].
//! - [`TaskQueue::submit`] hands a task to an executor and returns a
//!   [`TaskHandle`] that can be polled for a [`TaskStatus`] or waited on. Waiting
//!   blocks on a condition variable until the task finishes.
//! - [`InlineQueue`] runs a task to completion inside `submit`. With the
//!   `parallel` feature, [`ThreadPoolQueue`] runs tasks on a dedicated rayon pool.
//!
//! A panicking task is reported as [`TaskStatus::Failed`] and surfaces from
//! [`TaskHandle::wait`] as [`DispatchError::TaskFailed`]. Nothing is retried.

use super::error::EngineError;
use super::progress::{PercentTracker, ProgressReporter};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Task '{task}' failed: {reason}")]
    TaskFailed { task: String, reason: String },

    #[error("Task '{task}' was dropped by its executor before completing")]
    Disconnected { task: String },

    #[error("Failed to start worker pool: {0}")]
    Pool(String),
}

pub trait AlignTask: Send + 'static {
    type Output: Send + 'static;

    fn name(&self) -> String;

    fn execute(&self, progress: &ProgressReporter) -> Result<Self::Output, EngineError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Queued,
    Running { percent: u8 },
    Finished,
    Failed(String),
}

enum Slot<O> {
    Queued,
    Running(u8),
    Done(Result<O, EngineError>),
    Panicked(String),
    Lost,
    Taken,
}

struct Shared<O> {
    slot: Mutex<Slot<O>>,
    ready: Condvar,
}

impl<O> Shared<O> {
    fn lock(&self) -> MutexGuard<'_, Slot<O>> {
        // A poisoned slot still holds a consistent state; only whole values are stored.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn finish(&self, slot: Slot<O>) {
        *self.lock() = slot;
        self.ready.notify_all();
    }
}

pub struct TaskHandle<O> {
    task: String,
    shared: Arc<Shared<O>>,
}

impl<O> TaskHandle<O> {
    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn poll(&self) -> TaskStatus {
        match &*self.shared.lock() {
            Slot::Queued => TaskStatus::Queued,
            Slot::Running(percent) => TaskStatus::Running { percent: *percent },
            Slot::Done(Ok(_)) | Slot::Taken => TaskStatus::Finished,
            Slot::Done(Err(e)) => TaskStatus::Failed(e.to_string()),
            Slot::Panicked(reason) => TaskStatus::Failed(reason.clone()),
            Slot::Lost => TaskStatus::Failed("dropped by executor".to_string()),
        }
    }

    /// Blocks until the task completes and returns its output.
    pub fn wait(self) -> Result<O, EngineError> {
        let mut slot = self.shared.lock();
        while matches!(*slot, Slot::Queued | Slot::Running(_)) {
            slot = self
                .shared
                .ready
                .wait(slot)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        match std::mem::replace(&mut *slot, Slot::Taken) {
            Slot::Done(result) => result,
            Slot::Panicked(reason) => Err(DispatchError::TaskFailed {
                task: self.task,
                reason,
            }
            .into()),
            Slot::Lost => Err(DispatchError::Disconnected { task: self.task }.into()),
            Slot::Taken | Slot::Queued | Slot::Running(_) => Err(EngineError::Internal(format!(
                "task '{}' result already taken",
                self.task
            ))),
        }
    }
}

pub trait TaskQueue {
    /// Number of tasks the queue runs at once.
    fn workers(&self) -> usize;

    fn submit<T: AlignTask>(&self, task: T) -> TaskHandle<T::Output>;
}

/// Marks the task as lost if the executor drops it without running it.
struct Completion<O> {
    shared: Arc<Shared<O>>,
    completed: bool,
}

impl<O> Drop for Completion<O> {
    fn drop(&mut self) {
        if !self.completed {
            self.shared.finish(Slot::Lost);
        }
    }
}

fn new_handle<O>(task: String) -> (TaskHandle<O>, Completion<O>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot::Queued),
        ready: Condvar::new(),
    });
    let completion = Completion {
        shared: Arc::clone(&shared),
        completed: false,
    };
    (TaskHandle { task, shared }, completion)
}

fn run_task<T: AlignTask>(task: T, mut completion: Completion<T::Output>) {
    let name = task.name();
    let shared = Arc::clone(&completion.shared);
    *shared.lock() = Slot::Running(0);

    let tracker = PercentTracker::default();
    let progress_slot = Arc::clone(&shared);
    let reporter = ProgressReporter::with_callback(Box::new(move |event| {
        if let Some(percent) = tracker.observe(&event) {
            let mut slot = progress_slot.lock();
            if matches!(*slot, Slot::Running(_)) {
                *slot = Slot::Running(percent);
            }
        }
    }));

    let outcome = catch_unwind(AssertUnwindSafe(|| task.execute(&reporter)));
    let slot = match outcome {
        Ok(result) => {
            if let Err(e) = &result {
                debug!(task = %name, error = %e, "Task returned an error");
            }
            Slot::Done(result)
        }
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            warn!(task = %name, reason = %reason, "Task panicked");
            Slot::Panicked(reason)
        }
    };
    completion.completed = true;
    shared.finish(slot);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "task panicked".to_string())
}

/// Runs every task on the submitting thread before `submit` returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineQueue;

impl TaskQueue for InlineQueue {
    fn workers(&self) -> usize {
        1
    }

    fn submit<T: AlignTask>(&self, task: T) -> TaskHandle<T::Output> {
        let (handle, completion) = new_handle(task.name());
        run_task(task, completion);
        handle
    }
}

/// Runs tasks on a dedicated rayon thread pool.
#[cfg(feature = "parallel")]
pub struct ThreadPoolQueue {
    pool: rayon::ThreadPool,
}

#[cfg(feature = "parallel")]
impl ThreadPoolQueue {
    /// `workers == 0` lets rayon pick the number of threads.
    pub fn new(workers: usize) -> Result<Self, DispatchError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("cryoalign-worker-{}", i))
            .build()
            .map_err(|e| DispatchError::Pool(e.to_string()))?;
        Ok(Self { pool })
    }
}

#[cfg(feature = "parallel")]
impl TaskQueue for ThreadPoolQueue {
    fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn submit<T: AlignTask>(&self, task: T) -> TaskHandle<T::Output> {
        let (handle, completion) = new_handle(task.name());
        self.pool.spawn(move || run_task(task, completion));
        handle
    }
}

/// Number of batches for `items` particles on `workers` workers.
pub fn batch_count(items: usize, workers: usize) -> usize {
    (items / 4).min(workers).max(1)
}

/// Deals `items` round-robin into [`batch_count`] batches, tagging every item with
/// its input position.
pub fn split_batches<T>(items: Vec<T>, workers: usize) -> Vec<Vec<(usize, T)>> {
    let count = batch_count(items.len(), workers);
    let mut batches: Vec<Vec<(usize, T)>> = (0..count).map(|_| Vec::new()).collect();
    for (position, item) in items.into_iter().enumerate() {
        batches[position % count].push((position, item));
    }
    batches
}

/// Flattens position-tagged batch outputs back into input order.
pub fn merge_in_order<O>(batches: Vec<Vec<(usize, O)>>) -> Vec<O> {
    let mut tagged: Vec<(usize, O)> = batches.into_iter().flatten().collect();
    tagged.sort_by_key(|(position, _)| *position);
    tagged.into_iter().map(|(_, output)| output).collect()
}
