//! Reference timer worker
//!
//! Keeps suspended tasks in a min-heap keyed by their deadline and waits on a
//! condvar until the earliest one is due. Everything due at once goes back to
//! its owner as one batch per processor.

use crate::decision::Decision;
use crate::defaults::DEFAULT_JOIN_TIMEOUT;
use crate::processor::{ProcessorHandle, ProcessorId};
use crate::queue::TaskQueue;
use crate::task::Task;
use crate::worker::{join_with_timeout, Worker, WorkerKind};
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Entry in the timer heap
struct SleepEntry {
    wake_at: Instant,
    /// Insertion order, so equal deadlines wake FIFO
    seq: u64,
    task: Box<Task>,
}

// Reverse ordering for min-heap (earliest wake time first)
impl Ord for SleepEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .wake_at
            .cmp(&self.wake_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for SleepEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SleepEntry {
    fn eq(&self, other: &Self) -> bool {
        self.wake_at == other.wake_at && self.seq == other.seq
    }
}

impl Eq for SleepEntry {}

struct TimerState {
    sleeping: BinaryHeap<SleepEntry>,
    next_seq: u64,
}

struct TimerInner {
    state: Mutex<TimerState>,
    /// Wakes the thread when an earlier entry arrives or on shutdown
    notify: Condvar,
    shutdown: AtomicBool,
}

impl TimerInner {
    /// Block until at least one entry is due, then pop all due entries.
    /// Returns `None` on shutdown.
    fn next_expired(&self) -> Option<TaskQueue> {
        let mut state = self.state.lock();
        loop {
            if self.shutdown.load(AtomicOrdering::Acquire) {
                return None;
            }
            let now = Instant::now();
            match state.sleeping.peek().map(|entry| entry.wake_at) {
                Some(wake_at) if wake_at <= now => break,
                Some(wake_at) => {
                    self.notify.wait_for(&mut state, wake_at - now);
                }
                None => self.notify.wait(&mut state),
            }
        }

        let now = Instant::now();
        let mut expired = TaskQueue::new();
        while state.sleeping.peek().is_some_and(|entry| entry.wake_at <= now) {
            if let Some(entry) = state.sleeping.pop() {
                expired.push_back(entry.task);
            }
        }
        Some(expired)
    }
}

/// Thread-backed timer worker
pub struct TimerWorker {
    id: usize,
    inner: Arc<TimerInner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimerWorker {
    /// Start a timer worker thread
    pub fn start(id: usize) -> io::Result<Arc<Self>> {
        let inner = Arc::new(TimerInner {
            state: Mutex::new(TimerState {
                sleeping: BinaryHeap::new(),
                next_seq: 0,
            }),
            notify: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let thread_inner = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name(format!("tasklet-timer-{}", id))
            .spawn(move || {
                while let Some(mut expired) = thread_inner.next_expired() {
                    Self::hand_back(id, &mut expired);
                }
            })?;

        debug!(worker = id, "timer worker started");
        Ok(Arc::new(Self {
            id,
            inner,
            handle: Mutex::new(Some(handle)),
        }))
    }

    /// Worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Number of tasks waiting for their deadline
    pub fn sleeping_count(&self) -> usize {
        self.inner.state.lock().sleeping.len()
    }

    /// Whether the worker thread is still running
    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some() && !self.inner.shutdown.load(AtomicOrdering::Acquire)
    }

    /// Stop the timer thread. Sleeping tasks are dropped.
    pub fn stop(&self) {
        self.inner.shutdown.store(true, AtomicOrdering::Release);
        {
            // Notify under the lock so a thread between its shutdown check and
            // its wait cannot miss the wakeup
            let _state = self.inner.state.lock();
            self.inner.notify.notify_all();
        }

        if let Some(handle) = self.handle.lock().take() {
            join_with_timeout(handle, DEFAULT_JOIN_TIMEOUT);
            debug!(worker = self.id, "timer worker stopped");
        }
    }

    /// Return expired tasks to their owners, one batch per owner
    fn hand_back(id: usize, expired: &mut TaskQueue) {
        let mut batches: FxHashMap<ProcessorId, (ProcessorHandle, TaskQueue)> = FxHashMap::default();

        for task in expired.drain() {
            if let Some((_, batch)) = batches.get_mut(&task.owner()) {
                batch.push_back(task);
                continue;
            }
            match task.owner_handle() {
                Some(owner) => {
                    let mut batch = TaskQueue::new();
                    let owner_id = task.owner();
                    batch.push_back(task);
                    batches.insert(owner_id, (owner, batch));
                }
                None => warn!(worker = id, task = task.id().as_u64(), "owner gone, dropping task"),
            }
        }

        for (owner, mut batch) in batches.into_values() {
            trace!(worker = id, processor = owner.id().as_u64(), count = batch.len(), "timers fired");
            owner.return_batch_from_timer(&mut batch);
        }
    }
}

impl Worker for TimerWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Timer
    }

    fn push_tasks(&self, tasks: &mut TaskQueue) {
        if tasks.is_empty() {
            return;
        }
        let now = Instant::now();
        let mut state = self.inner.state.lock();
        for task in tasks.drain() {
            let wake_at = task.pending().and_then(Decision::deadline).unwrap_or(now);
            let seq = state.next_seq;
            state.next_seq += 1;
            state.sleeping.push(SleepEntry { wake_at, seq, task });
        }
        // The new entries might be due earlier than the current wait
        self.inner.notify.notify_one();
    }
}

impl Drop for TimerWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for TimerWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerWorker").field("id", &self.id).finish()
    }
}
