//! Single-threaded driver of the ready queue
//!
//! One thread owns a `Processor` and calls [`Processor::iterate`] in a loop.
//! Each call:
//!
//! 1. drains submissions and worker handoffs into the ready queue,
//! 2. runs up to `rounds` bursts of at most `burst_steps` steps on the queue
//!    front, rotating the queue after every burst,
//! 3. hands every staged suspended task to its worker in one batch.
//!
//! A task returning `Continue` or `RepeatOnIo` stays at the front and is
//! stepped again right away; only the burst cap moves it out of the way.
//! Other threads reach the processor through a [`ProcessorHandle`].

mod pool;
mod shared;

pub use shared::{ProcessorHandle, ProcessorId};
pub(crate) use shared::Shared;

use crate::decision::Decision;
use crate::defaults::{DEFAULT_BURST_STEPS, DEFAULT_INTAKE_BATCH, DEFAULT_ITERATE_ROUNDS};
use crate::error::{ProcessorError, ProcessorResult};
use crate::handoff::must_block;
use crate::queue::TaskQueue;
use crate::task::{Submission, Task};
use crate::worker::{Worker, WorkerKind};
use pool::WorkerPool;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Processor tuning knobs
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ProcessorOptions {
    /// Steps per burst before the ready queue is rotated
    pub burst_steps: usize,

    /// Pending batch size at which intake stops using try-lock
    pub intake_batch: usize,

    /// Rounds per `iterate` call in [`Processor::run`]
    pub iterate_rounds: usize,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            burst_steps: DEFAULT_BURST_STEPS,
            intake_batch: DEFAULT_INTAKE_BATCH,
            iterate_rounds: DEFAULT_ITERATE_ROUNDS,
        }
    }
}

/// Counters kept by the driving thread
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ProcessorStats {
    /// Tasks created from submissions
    pub tasks_created: u64,

    /// Tasks dropped after reporting finished
    pub tasks_finished: u64,

    /// Calls to `step`
    pub steps: u64,

    /// Tasks staged for I/O workers
    pub io_suspensions: u64,

    /// Tasks staged for timer workers
    pub timer_suspensions: u64,

    /// Ready queue rotations
    pub rotations: u64,

    /// Intake passes skipped because a source lock was contended
    pub intake_skipped: u64,
}

impl ProcessorStats {
    /// Add another processor's counters to these
    pub fn merge(&mut self, other: &ProcessorStats) {
        self.tasks_created += other.tasks_created;
        self.tasks_finished += other.tasks_finished;
        self.steps += other.steps;
        self.io_suspensions += other.io_suspensions;
        self.timer_suspensions += other.timer_suspensions;
        self.rotations += other.rotations;
        self.intake_skipped += other.intake_skipped;
    }
}

/// Single-threaded cooperative scheduler
pub struct Processor {
    shared: Arc<Shared>,
    options: ProcessorOptions,

    ready: TaskQueue,

    /// Tasks drained from handoff queues, not yet checked and resumed
    returned: TaskQueue,

    io: WorkerPool,
    timer: WorkerPool,

    stats: ProcessorStats,
}

impl Processor {
    /// Create a processor with default options
    pub fn new() -> Self {
        Self::with_options(ProcessorOptions::default())
    }

    /// Create a processor with custom options
    pub fn with_options(options: ProcessorOptions) -> Self {
        let options = ProcessorOptions {
            burst_steps: options.burst_steps.max(1),
            ..options
        };
        Self {
            shared: Arc::new(Shared::new()),
            options,
            ready: TaskQueue::new(),
            returned: TaskQueue::new(),
            io: WorkerPool::new(WorkerKind::Io),
            timer: WorkerPool::new(WorkerKind::Timer),
            stats: ProcessorStats::default(),
        }
    }

    /// Processor ID
    pub fn id(&self) -> ProcessorId {
        self.shared.id
    }

    /// Thread-safe handle to this processor's entry points
    pub fn handle(&self) -> ProcessorHandle {
        ProcessorHandle::from_shared(Arc::clone(&self.shared))
    }

    /// Options in effect
    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    /// Add a worker to the pool matching its kind
    pub fn register_worker(&mut self, worker: Arc<dyn Worker>) {
        let kind = worker.kind();
        match kind {
            WorkerKind::Io => self.io.register(worker),
            WorkerKind::Timer => self.timer.register(worker),
        }
        debug!(processor = self.id().as_u64(), %kind, "worker registered");
    }

    /// Number of registered I/O workers
    pub fn io_worker_count(&self) -> usize {
        self.io.len()
    }

    /// Number of registered timer workers
    pub fn timer_worker_count(&self) -> usize {
        self.timer.len()
    }

    /// Queue a submission, see [`ProcessorHandle::submit`]
    pub fn submit<S: Submission>(&self, submission: S) {
        self.handle().submit(submission);
    }

    /// See [`ProcessorHandle::return_from_io`]
    pub fn return_from_io(&self, task: Box<Task>) {
        self.handle().return_from_io(task);
    }

    /// See [`ProcessorHandle::return_from_timer`]
    pub fn return_from_timer(&self, task: Box<Task>) {
        self.handle().return_from_timer(task);
    }

    /// See [`ProcessorHandle::return_batch_from_timer`]
    pub fn return_batch_from_timer(&self, tasks: &mut TaskQueue) {
        self.handle().return_batch_from_timer(tasks);
    }

    /// Clear the running flag and wake a blocked [`wait_for_tasks`](Self::wait_for_tasks)
    pub fn stop(&self) {
        debug!(processor = self.id().as_u64(), "stop requested");
        self.handle().stop();
    }

    /// Whether `stop` has not been called yet
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Tasks in the ready queue
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// The ready queue, front first
    pub fn ready_queue(&self) -> &TaskQueue {
        &self.ready
    }

    /// Suspended tasks staged but not yet handed to a worker
    pub fn staged_len(&self) -> usize {
        self.io.staged() + self.timer.staged()
    }

    /// Counters
    pub fn stats(&self) -> ProcessorStats {
        self.stats
    }

    /// Whether another `iterate` call would find something to do
    pub fn has_work(&self) -> bool {
        !self.ready.is_empty() || !self.returned.is_empty() || self.shared.has_pending()
    }

    /// Run up to `rounds` rounds and report whether work remains.
    ///
    /// Staging queues are flushed to workers even when a round fails.
    pub fn iterate(&mut self, rounds: usize) -> ProcessorResult<bool> {
        self.intake()?;
        let outcome = self.run_rounds(rounds);
        self.flush_staging();
        outcome?;
        Ok(self.has_work())
    }

    /// Block until there is something to do or the processor is stopped
    pub fn wait_for_tasks(&self) {
        if !self.ready.is_empty() || !self.returned.is_empty() {
            return;
        }
        self.shared.wait();
    }

    /// Drive the processor until [`stop`](Self::stop) is called
    pub fn run(&mut self) -> ProcessorResult<()> {
        debug!(processor = self.id().as_u64(), "processor loop started");
        while self.is_running() {
            self.wait_for_tasks();
            while self.iterate(self.options.iterate_rounds)? && self.is_running() {}
        }
        debug!(
            processor = self.id().as_u64(),
            ready = self.ready.len(),
            finished = self.stats.tasks_finished,
            "processor loop stopped"
        );
        Ok(())
    }

    // ========================================================================
    // Intake
    // ========================================================================

    /// Move pending submissions and returned tasks into the ready queue
    fn intake(&mut self) -> ProcessorResult<()> {
        self.consume_submissions();

        let threshold = self.options.intake_batch;
        let from_io = &self.shared.from_io;
        let pending = from_io.len();
        if pending > 0 {
            let blocking = must_block(pending, self.ready.is_empty(), threshold);
            if from_io.drain_into(&mut self.returned, blocking).is_none() {
                self.stats.intake_skipped += 1;
            }
        }
        self.schedule_returned()?;

        let from_timer = &self.shared.from_timer;
        let pending = from_timer.len();
        if pending > 0 {
            let blocking = must_block(pending, self.ready.is_empty(), threshold);
            if from_timer.drain_into(&mut self.returned, blocking).is_none() {
                self.stats.intake_skipped += 1;
            }
        }
        self.schedule_returned()
    }

    fn consume_submissions(&mut self) {
        let pending = self.shared.submissions.len();
        if pending == 0 {
            return;
        }
        let blocking = must_block(pending, self.ready.is_empty(), self.options.intake_batch);
        let Some(batch) = self.shared.submissions.take(blocking) else {
            self.stats.intake_skipped += 1;
            return;
        };

        let created = batch.len();
        for submission in batch {
            let task = Task::new(self.shared.id, Arc::downgrade(&self.shared), submission.create());
            trace!(task = task.id().as_u64(), "task created");
            self.ready.push_back(task);
        }
        self.stats.tasks_created += created as u64;
        debug!(processor = self.id().as_u64(), created, "submissions consumed");
    }

    /// Check ownership of returned tasks, resume them and make them ready.
    ///
    /// Stops at the first foreign task; the rest stay queued for the next
    /// call.
    fn schedule_returned(&mut self) -> ProcessorResult<()> {
        while let Some(mut task) = self.returned.pop_front() {
            if task.owner() != self.shared.id {
                let err = ProcessorError::ForeignTask {
                    task: task.id(),
                    owner: task.owner(),
                    processor: self.shared.id,
                };
                error!(%err, "rejecting foreign task");
                if let Some(owner) = task.owner_handle() {
                    owner.retire_task();
                }
                return Err(err);
            }
            task.resume();
            self.ready.push_back(task);
        }
        Ok(())
    }

    // ========================================================================
    // Scheduling loop
    // ========================================================================

    fn run_rounds(&mut self, rounds: usize) -> ProcessorResult<()> {
        for _ in 0..rounds {
            if self.ready.is_empty() {
                break;
            }
            for _ in 0..self.options.burst_steps {
                let Some(task) = self.ready.front_mut() else {
                    break;
                };
                if task.finished() {
                    self.ready.drop_front();
                    self.shared.retire_task();
                    self.stats.tasks_finished += 1;
                    continue;
                }

                // A decision left by a failed suspension is routed as is,
                // without stepping the body again
                let decision = match task.take_pending() {
                    Some(stored) => stored,
                    None => {
                        self.stats.steps += 1;
                        task.step()
                    }
                };
                match decision {
                    // Stay at the front: the next step re-runs the same task
                    Decision::Continue | Decision::RepeatOnIo(_) => {}
                    Decision::SuspendOnIo(_) => self.suspend_front(WorkerKind::Io, decision)?,
                    Decision::SuspendOnTimer(_) => self.suspend_front(WorkerKind::Timer, decision)?,
                }
            }
            self.ready.rotate();
            self.stats.rotations += 1;
        }
        Ok(())
    }

    /// Move the front task to a staging queue of the `kind` pool.
    ///
    /// With an empty pool the task stays at the front with `decision` stored.
    fn suspend_front(&mut self, kind: WorkerKind, decision: Decision) -> ProcessorResult<()> {
        let pool = match kind {
            WorkerKind::Io => &mut self.io,
            WorkerKind::Timer => &mut self.timer,
        };

        let Some(slot) = pool.next_slot() else {
            if let Some(task) = self.ready.front_mut() {
                task.set_pending(decision);
            }
            let err = match kind {
                WorkerKind::Io => ProcessorError::NoIoWorkers,
                WorkerKind::Timer => ProcessorError::NoTimerWorkers,
            };
            error!(processor = self.shared.id.as_u64(), %err, "cannot suspend task");
            return Err(err);
        };

        if let Some(mut task) = self.ready.pop_front() {
            trace!(task = task.id().as_u64(), %kind, slot, "task suspended");
            task.set_pending(decision);
            pool.stage(slot, task);
            match kind {
                WorkerKind::Io => self.stats.io_suspensions += 1,
                WorkerKind::Timer => self.stats.timer_suspensions += 1,
            }
        }
        Ok(())
    }

    fn flush_staging(&mut self) {
        let moved = self.io.flush() + self.timer.flush();
        if moved > 0 {
            trace!(processor = self.shared.id.as_u64(), moved, "staging flushed");
        }
    }
}

impl Default for Processor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("id", &self.shared.id)
            .field("ready", &self.ready.len())
            .field("io_workers", &self.io.len())
            .field("timer_workers", &self.timer.len())
            .finish()
    }
}
