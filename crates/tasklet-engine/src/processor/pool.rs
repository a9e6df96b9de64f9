//! Worker pools and their staging queues
//!
//! Suspended tasks are sharded into one staging queue per worker and handed
//! over in a single `push_tasks` call per worker after a full `iterate`.
//! The balancer is touched only by the driving thread, so it needs no
//! synchronization.

use crate::queue::TaskQueue;
use crate::task::Task;
use crate::worker::{Worker, WorkerKind};
use std::sync::Arc;

pub(crate) struct WorkerPool {
    kind: WorkerKind,
    workers: Vec<Arc<dyn Worker>>,

    /// One staging queue per worker, same index
    staging: Vec<TaskQueue>,

    /// Pre-incremented round-robin counter
    balancer: usize,
}

impl WorkerPool {
    pub(crate) fn new(kind: WorkerKind) -> Self {
        Self {
            kind,
            workers: Vec::new(),
            staging: Vec::new(),
            balancer: 0,
        }
    }

    pub(crate) fn register(&mut self, worker: Arc<dyn Worker>) {
        debug_assert_eq!(worker.kind(), self.kind);
        self.workers.push(worker);
        self.staging.push(TaskQueue::new());
    }

    pub(crate) fn len(&self) -> usize {
        self.workers.len()
    }

    /// Pick the staging slot for the next suspended task, or `None` if the
    /// pool is empty
    pub(crate) fn next_slot(&mut self) -> Option<usize> {
        if self.staging.is_empty() {
            return None;
        }
        self.balancer = self.balancer.wrapping_add(1);
        Some(self.balancer % self.staging.len())
    }

    pub(crate) fn stage(&mut self, slot: usize, task: Box<Task>) {
        self.staging[slot].push_back(task);
    }

    /// Tasks currently staged across all slots
    pub(crate) fn staged(&self) -> usize {
        self.staging.iter().map(TaskQueue::len).sum()
    }

    /// Hand every non-empty staging queue to its worker
    pub(crate) fn flush(&mut self) -> usize {
        let mut moved = 0;
        for (worker, queue) in self.workers.iter().zip(self.staging.iter_mut()) {
            if queue.is_empty() {
                continue;
            }
            moved += queue.len();
            worker.push_tasks(queue);
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Decision;
    use crate::processor::ProcessorId;
    use crate::task::{Coroutine, TaskId};
    use parking_lot::Mutex;
    use std::sync::Weak;

    struct Idle;

    impl Coroutine for Idle {
        fn step(&mut self) -> Decision {
            Decision::Continue
        }

        fn finished(&self) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct Recorder {
        held: Mutex<TaskQueue>,
    }

    impl Worker for Recorder {
        fn kind(&self) -> WorkerKind {
            WorkerKind::Io
        }

        fn push_tasks(&self, tasks: &mut TaskQueue) {
            self.held.lock().append(tasks);
        }
    }

    #[test]
    fn test_empty_pool_has_no_slot() {
        let mut pool = WorkerPool::new(WorkerKind::Io);
        assert_eq!(pool.next_slot(), None);
        // A failed pick does not advance the balancer
        pool.register(Arc::new(Recorder::default()));
        pool.register(Arc::new(Recorder::default()));
        assert_eq!(pool.next_slot(), Some(1));
    }

    #[test]
    fn test_round_robin_sequence() {
        let mut pool = WorkerPool::new(WorkerKind::Io);
        for _ in 0..3 {
            pool.register(Arc::new(Recorder::default()));
        }
        let picks: Vec<_> = (0..7).filter_map(|_| pool.next_slot()).collect();
        assert_eq!(picks, vec![1, 2, 0, 1, 2, 0, 1]);
    }

    #[test]
    fn test_flush_moves_staged_batches() {
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let mut pool = WorkerPool::new(WorkerKind::Io);
        pool.register(a.clone());
        pool.register(b.clone());

        let mut ids: Vec<TaskId> = Vec::new();
        for _ in 0..3 {
            let task = Task::new(ProcessorId::new(), Weak::new(), Box::new(Idle));
            ids.push(task.id());
            let slot = pool.next_slot().unwrap();
            pool.stage(slot, task);
        }
        assert_eq!(pool.staged(), 3);

        assert_eq!(pool.flush(), 3);
        assert_eq!(pool.staged(), 0);
        assert_eq!(a.held.lock().ids(), vec![ids[1]]);
        assert_eq!(b.held.lock().ids(), vec![ids[0], ids[2]]);

        // Nothing staged: nothing pushed
        assert_eq!(pool.flush(), 0);
    }
}
