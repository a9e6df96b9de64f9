//! Task representation
//!
//! A [`Coroutine`] is the user-supplied resumable body. The processor wraps
//! each body in a [`Task`], which adds what scheduling needs: a unique id,
//! the immutable owning processor, the pending decision slot and the
//! intrusive link used by [`TaskQueue`](crate::TaskQueue).

use crate::decision::Decision;
use crate::processor::{ProcessorHandle, ProcessorId, Shared};
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

/// Unique identifier for a Task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Create a new unique TaskId
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        TaskId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

/// A resumable unit of cooperative computation.
///
/// The processor calls [`step`](Coroutine::step) repeatedly on the driving
/// thread until [`finished`](Coroutine::finished) reports true. A step must
/// never block; it returns a [`Decision`] instead. Failures are the body's
/// own business: a failing body records its failure and reports finished.
pub trait Coroutine: Send + 'static {
    /// Advance the computation by one step
    fn step(&mut self) -> Decision;

    /// Whether the computation has completed
    fn finished(&self) -> bool;

    /// Called on the driving thread when a worker hands the task back, with
    /// the decision that suspended it.
    fn resume(&mut self, _woken_by: &Decision) {}
}

/// A deferred request to run a coroutine.
///
/// Construction is deferred until intake on the driving thread, so it never
/// races with stepping.
pub trait Submission: Send + 'static {
    /// Build the coroutine body
    fn create(self: Box<Self>) -> Box<dyn Coroutine>;
}

impl<F, C> Submission for F
where
    F: FnOnce() -> C + Send + 'static,
    C: Coroutine,
{
    fn create(self: Box<Self>) -> Box<dyn Coroutine> {
        Box::new((*self)())
    }
}

/// A coroutine bound to its owning processor.
///
/// A live task is owned by exactly one queue (ready, staging, a worker's own
/// queue, or a handoff queue) at any instant; moving it is a move of its
/// `Box`.
pub struct Task {
    id: TaskId,

    /// Owning processor, fixed at creation
    owner: ProcessorId,

    /// Entry points of the owning processor, for workers handing the task back
    home: Weak<Shared>,

    /// Decision that suspended the task, kept until resumption
    pending: Option<Decision>,

    body: Box<dyn Coroutine>,

    /// Intrusive link, managed by `TaskQueue`
    pub(crate) next: Option<NonNull<Task>>,
}

// SAFETY: `next` is only dereferenced by the `TaskQueue` that owns both this
// task and its successor; every other field is `Send`.
unsafe impl Send for Task {}

impl Task {
    pub(crate) fn new(owner: ProcessorId, home: Weak<Shared>, body: Box<dyn Coroutine>) -> Box<Self> {
        Box::new(Self {
            id: TaskId::new(),
            owner,
            home,
            pending: None,
            body,
            next: None,
        })
    }

    /// Get the task ID
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Get the owning processor ID
    pub fn owner(&self) -> ProcessorId {
        self.owner
    }

    /// Handle to the owning processor, or `None` if it has been dropped
    pub fn owner_handle(&self) -> Option<ProcessorHandle> {
        self.home.upgrade().map(ProcessorHandle::from_shared)
    }

    /// The decision the task is currently suspended on
    pub fn pending(&self) -> Option<&Decision> {
        self.pending.as_ref()
    }

    /// Whether the body has completed
    pub fn finished(&self) -> bool {
        self.body.finished()
    }

    pub(crate) fn step(&mut self) -> Decision {
        self.body.step()
    }

    pub(crate) fn set_pending(&mut self, decision: Decision) {
        self.pending = Some(decision);
    }

    pub(crate) fn take_pending(&mut self) -> Option<Decision> {
        self.pending.take()
    }

    /// Hand the pending decision to the body, clearing the slot
    pub(crate) fn resume(&mut self) {
        if let Some(decision) = self.take_pending() {
            self.body.resume(&decision);
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Instant;

    struct Countdown {
        left: usize,
        resumed: Arc<AtomicUsize>,
    }

    impl Coroutine for Countdown {
        fn step(&mut self) -> Decision {
            self.left = self.left.saturating_sub(1);
            Decision::Continue
        }

        fn finished(&self) -> bool {
            self.left == 0
        }

        fn resume(&mut self, woken_by: &Decision) {
            assert!(woken_by.deadline().is_some());
            self.resumed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_task_id_unique() {
        let a = TaskId::new();
        let b = TaskId::new();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_submission_closure() {
        let submission: Box<dyn Submission> = Box::new(|| Countdown {
            left: 2,
            resumed: Arc::new(AtomicUsize::new(0)),
        });
        let mut body = submission.create();
        assert!(!body.finished());
        body.step();
        body.step();
        assert!(body.finished());
    }

    #[test]
    fn test_resume_takes_pending() {
        let resumed = Arc::new(AtomicUsize::new(0));
        let owner = ProcessorId::new();
        let mut task = Task::new(
            owner,
            Weak::new(),
            Box::new(Countdown { left: 1, resumed: resumed.clone() }),
        );
        assert_eq!(task.owner(), owner);
        assert!(task.owner_handle().is_none());

        task.set_pending(Decision::SuspendOnTimer(Instant::now()));
        assert!(task.pending().is_some());

        task.resume();
        assert!(task.pending().is_none());
        assert_eq!(resumed.load(Ordering::SeqCst), 1);

        // Nothing pending: resume is a no-op
        task.resume();
        assert_eq!(resumed.load(Ordering::SeqCst), 1);
    }
}
