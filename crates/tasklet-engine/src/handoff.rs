//! Thread-safe bridges into the driving thread
//!
//! Producers append under a lock scoped to one resource. The driving thread
//! drains with an adaptive policy: small batches arriving while the ready
//! queue already has work are taken only if the lock is free right now,
//! otherwise they wait for the next pass. Large batches, or an idle ready
//! queue, take the lock unconditionally.

use crate::queue::TaskQueue;
use crate::task::{Submission, Task};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Whether intake should wait for the lock on a source holding `pending`
/// entries
pub(crate) fn must_block(pending: usize, ready_is_empty: bool, batch_threshold: usize) -> bool {
    pending >= batch_threshold || ready_is_empty
}

/// Handoff queue for tasks returned by workers.
///
/// Critical sections are a handful of pointer writes, so the lock spins
/// instead of parking.
pub(crate) struct HandoffQueue {
    pub(crate) queue: spin::Mutex<TaskQueue>,

    /// Mirror of `queue.len()`, readable without the lock
    len: AtomicUsize,
}

impl HandoffQueue {
    pub(crate) fn new() -> Self {
        Self {
            queue: spin::Mutex::new(TaskQueue::new()),
            len: AtomicUsize::new(0),
        }
    }

    pub(crate) fn push(&self, task: Box<Task>) {
        let mut queue = self.queue.lock();
        queue.push_back(task);
        self.len.store(queue.len(), Ordering::Release);
    }

    pub(crate) fn push_all(&self, tasks: &mut TaskQueue) {
        let mut queue = self.queue.lock();
        queue.append(tasks);
        self.len.store(queue.len(), Ordering::Release);
    }

    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move everything into `dst`. Returns `None` if `blocking` is false and
    /// the lock was contended.
    pub(crate) fn drain_into(&self, dst: &mut TaskQueue, blocking: bool) -> Option<usize> {
        let mut queue = if blocking {
            self.queue.lock()
        } else {
            self.queue.try_lock()?
        };
        let moved = queue.len();
        dst.append(&mut *queue);
        self.len.store(0, Ordering::Release);
        Some(moved)
    }
}

/// Pending submissions, guarded by a parking mutex
pub(crate) struct SubmissionList {
    list: parking_lot::Mutex<Vec<Box<dyn Submission>>>,
    len: AtomicUsize,
}

impl SubmissionList {
    pub(crate) fn new() -> Self {
        Self {
            list: parking_lot::Mutex::new(Vec::new()),
            len: AtomicUsize::new(0),
        }
    }

    pub(crate) fn push(&self, submission: Box<dyn Submission>) {
        let mut list = self.list.lock();
        list.push(submission);
        self.len.store(list.len(), Ordering::Release);
    }

    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the whole list. Returns `None` if `blocking` is false and the lock
    /// was contended.
    pub(crate) fn take(&self, blocking: bool) -> Option<Vec<Box<dyn Submission>>> {
        let mut list = if blocking {
            self.list.lock()
        } else {
            self.list.try_lock()?
        };
        let batch = std::mem::take(&mut *list);
        self.len.store(0, Ordering::Release);
        Some(batch)
    }
}
