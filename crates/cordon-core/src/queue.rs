//! Cooperative task queue for deferred and delayed work.
//!
//! Cordon runs on a single logical thread: mutation delivery, write batches,
//! and focus moves are all posted here and processed strictly in order. The
//! queue is the serialization boundary the engine relies on: a batch posted
//! while another batch runs queues behind it and never interleaves.
//!
//! Delays are expressed through [`Delay`], an injectable capability:
//! [`Delay::NextTick`] defers to the next processing checkpoint,
//! [`Delay::Millis`] defers by wall-clock time, and [`Delay::Hook`] hands the
//! continuation to host code (e.g. an animation-frame callback). Tests use
//! `NextTick` together with [`TaskQueue::run_until_idle`] for determinism.
//!
//! # Example
//!
//! ```
//! use cordon_core::TaskQueue;
//!
//! let queue = TaskQueue::new();
//! queue.post(|| println!("runs at the next checkpoint"));
//! queue.run_until_idle();
//! ```

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

use crate::error::{QueueError, Result};

new_key_type! {
    /// A unique identifier for a posted task.
    ///
    /// Use this ID to cancel a pending task via [`TaskQueue::cancel`]. The ID
    /// becomes invalid once the task has executed or been cancelled.
    pub struct TaskId;
}

/// A deferral policy for posted work.
///
/// This is the injectable "delay hook" capability: the engine never sleeps or
/// spins, it describes *when* a continuation should become runnable and the
/// queue (or host code, for [`Delay::Hook`]) makes it so.
#[derive(Clone, Default)]
pub enum Delay {
    /// Run at the next queue checkpoint. The default.
    #[default]
    NextTick,
    /// Run after the given number of milliseconds has elapsed.
    Millis(u64),
    /// Hand the continuation to host code, which invokes it when ready.
    ///
    /// The continuation re-enters the queue as a next-tick task, so ordering
    /// relative to other posted work is preserved from the moment the host
    /// fires it.
    Hook(Arc<dyn Fn(Box<dyn FnOnce() + Send>) + Send + Sync>),
}

impl fmt::Debug for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NextTick => write!(f, "Delay::NextTick"),
            Self::Millis(ms) => write!(f, "Delay::Millis({ms})"),
            Self::Hook(_) => write!(f, "Delay::Hook(..)"),
        }
    }
}

/// A boxed task closure.
type BoxedTask = Box<dyn FnOnce() + Send + 'static>;

/// Internal state of a posted task.
enum TaskState {
    /// In the ready FIFO, runs at the next checkpoint.
    Ready(BoxedTask),
    /// In the delayed heap, runs once its time arrives.
    Delayed(BoxedTask),
    /// Handed to a host delay hook; runs when the hook releases it.
    Parked(BoxedTask),
}

/// An entry in the delayed heap (min-heap by run time, FIFO within a tick).
struct DelayedEntry {
    id: TaskId,
    run_time: Instant,
    seq: u64,
}

impl PartialEq for DelayedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.run_time == other.run_time && self.seq == other.seq
    }
}

impl Eq for DelayedEntry {}

impl PartialOrd for DelayedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap behavior; seq keeps same-time FIFO.
        other
            .run_time
            .cmp(&self.run_time)
            .then(other.seq.cmp(&self.seq))
    }
}

/// Internal queue state behind the shared handle.
struct QueueInner {
    tasks: SlotMap<TaskId, TaskState>,
    ready: VecDeque<TaskId>,
    delayed: BinaryHeap<DelayedEntry>,
    next_seq: u64,
}

impl QueueInner {
    fn new() -> Self {
        Self {
            tasks: SlotMap::with_key(),
            ready: VecDeque::new(),
            delayed: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Move delayed entries whose time has arrived onto the ready FIFO.
    fn promote_due(&mut self, now: Instant) {
        while let Some(entry) = self.delayed.peek() {
            if entry.run_time > now {
                break;
            }
            let entry = self.delayed.pop().expect("peeked entry");
            // Stale entries (cancelled tasks) are dropped silently.
            if let Some(state) = self.tasks.get_mut(entry.id) {
                let task = match std::mem::replace(state, TaskState::Ready(Box::new(|| {}))) {
                    TaskState::Delayed(task) => task,
                    other => {
                        // Task was re-parked or already readied; keep as-is.
                        *state = other;
                        continue;
                    }
                };
                *state = TaskState::Ready(task);
                self.ready.push_back(entry.id);
            }
        }
    }

    /// Pop the next runnable task, if any.
    fn pop_ready(&mut self) -> Option<BoxedTask> {
        while let Some(id) = self.ready.pop_front() {
            if let Some(TaskState::Ready(task)) = self.tasks.remove(id) {
                return Some(task);
            }
            // Cancelled between queuing and processing; skip.
        }
        None
    }
}

/// The cooperative task queue.
///
/// `TaskQueue` is a cheap-to-clone shared handle; all clones refer to the
/// same queue. Work posted here runs when the host drives a checkpoint via
/// [`process_ready`](Self::process_ready) or
/// [`run_until_idle`](Self::run_until_idle).
///
/// # Ordering
///
/// Tasks run strictly in post order within the ready FIFO. A task posted by
/// a running task queues behind everything already ready, which is what
/// serializes the engine's write batches.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Mutex<QueueInner>>,
}

impl TaskQueue {
    /// Create a new empty queue.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner::new())),
        }
    }

    /// Post a task to run at the next checkpoint.
    ///
    /// Returns the task ID, which can be used to cancel the task before it
    /// runs.
    pub fn post<F>(&self, task: F) -> TaskId
    where
        F: FnOnce() + Send + 'static,
    {
        let mut inner = self.inner.lock();
        let id = inner.tasks.insert(TaskState::Ready(Box::new(task)));
        inner.ready.push_back(id);
        id
    }

    /// Post a task deferred by the given [`Delay`].
    pub fn post_after<F>(&self, delay: &Delay, task: F) -> TaskId
    where
        F: FnOnce() + Send + 'static,
    {
        match delay {
            Delay::NextTick => self.post(task),
            Delay::Millis(ms) => {
                let run_time = Instant::now() + Duration::from_millis(*ms);
                let mut inner = self.inner.lock();
                let id = inner.tasks.insert(TaskState::Delayed(Box::new(task)));
                let seq = inner.next_seq;
                inner.next_seq += 1;
                inner.delayed.push(DelayedEntry { id, run_time, seq });
                id
            }
            Delay::Hook(hook) => {
                let id = {
                    let mut inner = self.inner.lock();
                    inner.tasks.insert(TaskState::Parked(Box::new(task)))
                };
                let queue = self.clone();
                hook(Box::new(move || queue.release(id)));
                id
            }
        }
    }

    /// Cancel a pending task.
    ///
    /// Returns `Ok(())` if the task was pending and is now removed, or
    /// [`QueueError::InvalidTaskId`] if it already ran or was cancelled.
    pub fn cancel(&self, id: TaskId) -> Result<()> {
        if self.inner.lock().tasks.remove(id).is_some() {
            Ok(())
        } else {
            Err(QueueError::InvalidTaskId.into())
        }
    }

    /// Release a parked task back onto the ready FIFO.
    ///
    /// Called by delay-hook continuations. Releasing a task that has been
    /// cancelled or already released is a no-op.
    fn release(&self, id: TaskId) {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.tasks.get_mut(id) {
            if let TaskState::Parked(_) = state {
                let task = match std::mem::replace(state, TaskState::Ready(Box::new(|| {}))) {
                    TaskState::Parked(task) => task,
                    _ => unreachable!("checked Parked above"),
                };
                *state = TaskState::Ready(task);
                inner.ready.push_back(id);
            }
        }
    }

    /// Number of tasks currently pending (ready, delayed, or parked).
    pub fn pending_count(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    /// Check whether any task is runnable right now.
    pub fn has_ready(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.promote_due(Instant::now());
        // Skip over cancelled IDs left in the FIFO.
        while let Some(&id) = inner.ready.front() {
            if inner.tasks.contains_key(id) {
                return true;
            }
            inner.ready.pop_front();
        }
        false
    }

    /// Run every task that is ready at this checkpoint.
    ///
    /// Tasks posted *during* processing are not run in the same call; they
    /// belong to the next checkpoint. Returns the number of tasks executed.
    #[tracing::instrument(skip(self), target = "cordon_core::queue", level = "trace")]
    pub fn process_ready(&self) -> usize {
        let mut executed = 0;
        let batch: Vec<BoxedTask> = {
            let mut inner = self.inner.lock();
            inner.promote_due(Instant::now());
            let mut batch = Vec::new();
            while let Some(task) = inner.pop_ready() {
                batch.push(task);
            }
            batch
        };
        for task in batch {
            task();
            executed += 1;
        }
        tracing::trace!(target: "cordon_core::queue", executed, "processed checkpoint");
        executed
    }

    /// Run checkpoints until no task is runnable.
    ///
    /// Delayed tasks whose time has not arrived are left pending. Returns
    /// the total number of tasks executed.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let executed = self.process_ready();
            if executed == 0 {
                return total;
            }
            total += executed;
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.pending_count())
            .finish()
    }
}
