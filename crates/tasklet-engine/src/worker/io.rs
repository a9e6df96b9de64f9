//! Reference I/O worker
//!
//! Holds tasks suspended on an [`IoWait`](crate::IoWait) and probes each
//! task's source in turn. Ready tasks go back to their owner one at a time.
//! When a full pass finds nothing ready the thread sleeps for the poll
//! interval; when it holds nothing it blocks until `push_tasks` wakes it.

use crate::decision::IoWait;
use crate::defaults::{DEFAULT_IO_POLL_INTERVAL, DEFAULT_JOIN_TIMEOUT, DEFAULT_WORKER_IDLE_TIMEOUT};
use crate::queue::TaskQueue;
use crate::worker::{join_with_timeout, Worker, WorkerKind};
use parking_lot::{Condvar, Mutex};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

struct IoInner {
    /// Tasks pushed by processors, not yet picked up by the thread
    backlog: Mutex<TaskQueue>,
    notify: Condvar,
    shutdown: AtomicBool,

    /// Tasks the thread is currently probing
    waiting: AtomicUsize,
    poll_interval: Duration,
}

/// Thread-backed I/O worker
pub struct IoWorker {
    id: usize,
    inner: Arc<IoInner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl IoWorker {
    /// Start an I/O worker with the default poll interval
    pub fn start(id: usize) -> io::Result<Arc<Self>> {
        Self::with_poll_interval(id, DEFAULT_IO_POLL_INTERVAL)
    }

    /// Start an I/O worker that sleeps `poll_interval` between fruitless passes
    pub fn with_poll_interval(id: usize, poll_interval: Duration) -> io::Result<Arc<Self>> {
        let inner = Arc::new(IoInner {
            backlog: Mutex::new(TaskQueue::new()),
            notify: Condvar::new(),
            shutdown: AtomicBool::new(false),
            waiting: AtomicUsize::new(0),
            poll_interval,
        });

        let thread_inner = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name(format!("tasklet-io-worker-{}", id))
            .spawn(move || Self::run_loop(id, &thread_inner))?;

        debug!(worker = id, "io worker started");
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

    /// Tasks accepted but not yet returned
    pub fn waiting_count(&self) -> usize {
        self.inner.waiting.load(Ordering::Acquire) + self.inner.backlog.lock().len()
    }

    /// Whether the worker thread is still running
    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some() && !self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Stop the worker thread. Tasks still waiting are dropped.
    pub fn stop(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        {
            let _backlog = self.inner.backlog.lock();
            self.inner.notify.notify_all();
        }

        if let Some(handle) = self.handle.lock().take() {
            join_with_timeout(handle, DEFAULT_JOIN_TIMEOUT);
            debug!(worker = self.id, "io worker stopped");
        }
    }

    fn run_loop(id: usize, inner: &IoInner) {
        let mut waiting = TaskQueue::new();

        while !inner.shutdown.load(Ordering::Acquire) {
            {
                let mut backlog = inner.backlog.lock();
                if waiting.is_empty() && backlog.is_empty() {
                    // Re-check under the lock: `stop` notifies while holding it
                    if inner.shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    inner.notify.wait_for(&mut backlog, DEFAULT_WORKER_IDLE_TIMEOUT);
                }
                waiting.append(&mut backlog);
            }

            let returned = Self::poll_waiting(id, &mut waiting);
            inner.waiting.store(waiting.len(), Ordering::Release);

            if returned == 0 && !waiting.is_empty() {
                thread::sleep(inner.poll_interval);
            }
        }

        if !waiting.is_empty() {
            warn!(worker = id, dropped = waiting.len(), "io worker stopped with waiting tasks");
        }
    }

    /// Probe every waiting task once, returning the ready ones to their owners
    fn poll_waiting(id: usize, waiting: &mut TaskQueue) -> usize {
        let mut still_waiting = TaskQueue::new();
        let mut returned = 0;

        for task in waiting.drain() {
            let ready = task
                .pending()
                .and_then(|decision| decision.io_wait())
                .map_or(true, IoWait::is_ready);
            if !ready {
                still_waiting.push_back(task);
                continue;
            }

            match task.owner_handle() {
                Some(owner) => {
                    owner.return_from_io(task);
                    returned += 1;
                }
                None => warn!(worker = id, task = task.id().as_u64(), "owner gone, dropping task"),
            }
        }

        waiting.append(&mut still_waiting);
        returned
    }
}

impl Worker for IoWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Io
    }

    fn push_tasks(&self, tasks: &mut TaskQueue) {
        if tasks.is_empty() {
            return;
        }
        let mut backlog = self.inner.backlog.lock();
        backlog.append(tasks);
        self.inner.notify.notify_one();
    }
}

impl Drop for IoWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for IoWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoWorker")
            .field("id", &self.id)
            .field("poll_interval", &self.inner.poll_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{Decision, IoWait, ReadyFlag};
    use crate::task::Coroutine;
    use crate::Processor;
    use std::time::Instant;

    /// Waits on `flag` once, then finishes on the next step
    struct WaitOnce {
        flag: Arc<ReadyFlag>,
        waited: bool,
        done: bool,
    }

    impl Coroutine for WaitOnce {
        fn step(&mut self) -> Decision {
            if self.waited {
                self.done = true;
                return Decision::Continue;
            }
            self.waited = true;
            Decision::SuspendOnIo(IoWait::read(self.flag.clone()))
        }

        fn finished(&self) -> bool {
            self.done
        }
    }

    fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        cond()
    }

    #[test]
    fn test_io_worker_start_stop() {
        let worker = IoWorker::start(0).unwrap();
        assert!(worker.is_running());
        assert_eq!(worker.id(), 0);
        worker.stop();
        assert!(!worker.is_running());
        // Idempotent
        worker.stop();
    }

    #[test]
    fn test_io_worker_returns_ready_task() {
        let worker = IoWorker::start(0).unwrap();
        let mut processor = Processor::new();
        processor.register_worker(worker.clone());

        let flag = ReadyFlag::new();
        let task_flag = flag.clone();
        processor.submit(move || WaitOnce {
            flag: task_flag,
            waited: false,
            done: false,
        });

        assert!(!processor.iterate(1).unwrap());
        assert!(wait_until(Duration::from_secs(1), || worker.waiting_count() == 1));

        // Not ready yet: nothing comes back
        thread::sleep(Duration::from_millis(10));
        assert_eq!(processor.handle().pending_io(), 0);

        flag.set();
        let handle = processor.handle();
        assert!(wait_until(Duration::from_secs(1), || handle.pending_io() == 1));
        assert!(wait_until(Duration::from_secs(1), || worker.waiting_count() == 0));

        assert!(!processor.iterate(1).unwrap());
        assert_eq!(processor.stats().tasks_finished, 1);
        worker.stop();
    }

    #[test]
    fn test_io_worker_drops_orphans() {
        let worker = IoWorker::start(1).unwrap();
        let flag = ReadyFlag::new();
        {
            let mut processor = Processor::new();
            processor.register_worker(worker.clone());
            let task_flag = flag.clone();
            processor.submit(move || WaitOnce {
                flag: task_flag,
                waited: false,
                done: false,
            });
            assert!(!processor.iterate(1).unwrap());
            assert!(wait_until(Duration::from_secs(1), || worker.waiting_count() == 1));
        }

        // The owner is gone by the time the source becomes ready
        flag.set();
        assert!(wait_until(Duration::from_secs(1), || worker.waiting_count() == 0));
        worker.stop();
    }
}
