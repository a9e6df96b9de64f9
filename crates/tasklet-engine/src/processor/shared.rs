//! Cross-thread half of a processor
//!
//! Holds everything producers may touch: the submission list, the two
//! handoff queues and the running flag with its condition variable. Each has
//! its own lock and no lock is taken while another is held.

use crate::handoff::{HandoffQueue, SubmissionList};
use crate::queue::TaskQueue;
use crate::task::{Submission, Task};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Unique identifier for a Processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessorId(u64);

impl ProcessorId {
    /// Create a new unique processor ID
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for ProcessorId {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct Shared {
    pub(crate) id: ProcessorId,
    pub(crate) submissions: SubmissionList,
    pub(crate) from_io: HandoffQueue,
    pub(crate) from_timer: HandoffQueue,

    /// Tasks submitted and not yet finished
    active: AtomicUsize,

    /// Running flag; also the mutex paired with `wake`
    running: Mutex<bool>,
    wake: Condvar,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            id: ProcessorId::new(),
            submissions: SubmissionList::new(),
            from_io: HandoffQueue::new(),
            from_timer: HandoffQueue::new(),
            active: AtomicUsize::new(0),
            running: Mutex::new(true),
            wake: Condvar::new(),
        }
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.submissions.is_empty() || !self.from_io.is_empty() || !self.from_timer.is_empty()
    }

    pub(crate) fn retire_task(&self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn is_running(&self) -> bool {
        *self.running.lock()
    }

    /// Wake the driving thread. Producers call this after releasing their
    /// queue lock; taking `running` orders the notify after any waiter's check.
    fn notify(&self) {
        let _running = self.running.lock();
        self.wake.notify_one();
    }

    /// Block until something is pending or the processor is stopped
    pub(crate) fn wait(&self) {
        let mut running = self.running.lock();
        while *running && !self.has_pending() {
            self.wake.wait(&mut running);
        }
    }

    fn stop(&self) {
        let mut running = self.running.lock();
        *running = false;
        self.wake.notify_all();
    }
}

/// Thread-safe entry points of a [`Processor`](crate::Processor).
///
/// Cheap to clone. Workers get one through
/// [`Task::owner_handle`](crate::Task::owner_handle); producers get one from
/// [`Processor::handle`](crate::Processor::handle).
#[derive(Clone)]
pub struct ProcessorHandle {
    shared: Arc<Shared>,
}

impl ProcessorHandle {
    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// ID of the processor behind this handle
    pub fn id(&self) -> ProcessorId {
        self.shared.id
    }

    /// Queue a submission. The task is created on the driving thread at the
    /// next intake.
    pub fn submit<S: Submission>(&self, submission: S) {
        self.submit_boxed(Box::new(submission));
    }

    /// Queue an already boxed submission
    pub fn submit_boxed(&self, submission: Box<dyn Submission>) {
        self.shared.active.fetch_add(1, Ordering::AcqRel);
        self.shared.submissions.push(submission);
        self.shared.notify();
    }

    /// Hand back one task whose I/O wait is satisfied
    pub fn return_from_io(&self, task: Box<Task>) {
        self.shared.from_io.push(task);
        self.shared.notify();
    }

    /// Hand back one task whose timer fired
    pub fn return_from_timer(&self, task: Box<Task>) {
        self.shared.from_timer.push(task);
        self.shared.notify();
    }

    /// Hand back every task in `tasks`, leaving it empty
    pub fn return_batch_from_timer(&self, tasks: &mut TaskQueue) {
        if tasks.is_empty() {
            return;
        }
        self.shared.from_timer.push_all(tasks);
        self.shared.notify();
    }

    /// Clear the running flag and wake a blocked driving thread
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Whether `stop` has not been called yet
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Tasks submitted and not yet finished, wherever they are
    pub fn active_tasks(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    pub(crate) fn retire_task(&self) {
        self.shared.retire_task();
    }

    /// Submissions waiting for intake
    pub fn pending_submissions(&self) -> usize {
        self.shared.submissions.len()
    }

    /// Tasks returned from I/O workers waiting for intake
    pub fn pending_io(&self) -> usize {
        self.shared.from_io.len()
    }

    /// Tasks returned from timer workers waiting for intake
    pub fn pending_timer(&self) -> usize {
        self.shared.from_timer.len()
    }
}

impl std::fmt::Debug for ProcessorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorHandle")
            .field("id", &self.shared.id)
            .finish()
    }
}
