//! Executor
//!
//! Starts a fixed set of processor threads plus the I/O and timer workers
//! they share, and spreads submissions over the processors round-robin.

use crate::defaults::{DEFAULT_IO_POLL_INTERVAL, DEFAULT_JOIN_TIMEOUT};
use crate::error::ProcessorResult;
use crate::processor::{Processor, ProcessorHandle, ProcessorOptions, ProcessorStats};
use crate::task::Submission;
use crate::worker::{join_with_timeout, IoWorker, TimerWorker};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Executor configuration
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExecutorOptions {
    /// Processor threads; 0 means one per CPU
    pub processors: usize,

    /// Shared I/O workers
    pub io_workers: usize,

    /// Shared timer workers
    pub timer_workers: usize,

    /// Sleep between fruitless I/O polling passes, in microseconds
    pub io_poll_interval_us: u64,

    /// Options for every processor
    pub processor: ProcessorOptions,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            processors: 1,
            io_workers: 1,
            timer_workers: 2,
            io_poll_interval_us: DEFAULT_IO_POLL_INTERVAL.as_micros() as u64,
            processor: ProcessorOptions::default(),
        }
    }
}

impl ExecutorOptions {
    /// Processor count with 0 resolved to the number of CPUs
    pub fn resolved_processors(&self) -> usize {
        if self.processors == 0 {
            num_cpus::get()
        } else {
            self.processors
        }
    }
}

/// A set of running processors sharing one set of workers
pub struct Executor {
    handles: Vec<ProcessorHandle>,
    threads: Vec<JoinHandle<ProcessorResult<ProcessorStats>>>,
    io_workers: Vec<Arc<IoWorker>>,
    timer_workers: Vec<Arc<TimerWorker>>,

    /// Round-robin counter for `execute`; callers are arbitrary threads
    balancer: AtomicUsize,
}

impl Executor {
    /// Start workers and processor threads
    pub fn start(options: ExecutorOptions) -> io::Result<Self> {
        let poll_interval = Duration::from_micros(options.io_poll_interval_us);
        let mut io_workers = Vec::with_capacity(options.io_workers);
        for id in 0..options.io_workers {
            io_workers.push(IoWorker::with_poll_interval(id, poll_interval)?);
        }
        let mut timer_workers = Vec::with_capacity(options.timer_workers);
        for id in 0..options.timer_workers {
            timer_workers.push(TimerWorker::start(id)?);
        }

        let count = options.resolved_processors();
        let mut handles = Vec::with_capacity(count);
        let mut threads = Vec::with_capacity(count);
        for index in 0..count {
            let mut processor = Processor::with_options(options.processor.clone());
            for worker in &io_workers {
                processor.register_worker(worker.clone());
            }
            for worker in &timer_workers {
                processor.register_worker(worker.clone());
            }
            handles.push(processor.handle());

            let thread = thread::Builder::new()
                .name(format!("tasklet-processor-{}", index))
                .spawn(move || {
                    let result = processor.run();
                    if let Err(err) = &result {
                        error!(processor = processor.id().as_u64(), %err, "processor loop failed");
                    }
                    result.map(|()| processor.stats())
                });
            match thread {
                Ok(thread) => threads.push(thread),
                Err(err) => {
                    // Unwind what is already running before reporting
                    for handle in &handles {
                        handle.stop();
                    }
                    for thread in threads {
                        join_with_timeout(thread, DEFAULT_JOIN_TIMEOUT);
                    }
                    return Err(err);
                }
            }
        }

        info!(
            processors = count,
            io_workers = io_workers.len(),
            timer_workers = timer_workers.len(),
            "executor started"
        );

        Ok(Self {
            handles,
            threads,
            io_workers,
            timer_workers,
            balancer: AtomicUsize::new(0),
        })
    }

    /// Submit to the next processor in round-robin order
    pub fn execute<S: Submission>(&self, submission: S) {
        if self.handles.is_empty() {
            warn!("executor has no processors, dropping submission");
            return;
        }
        let index = self.balancer.fetch_add(1, Ordering::Relaxed) % self.handles.len();
        self.handles[index].submit(submission);
    }

    /// Handles of all processors, in thread order
    pub fn handles(&self) -> &[ProcessorHandle] {
        &self.handles
    }

    /// Number of processor threads
    pub fn processor_count(&self) -> usize {
        self.handles.len()
    }

    /// Tasks submitted and not yet finished across all processors
    pub fn active_tasks(&self) -> usize {
        self.handles.iter().map(ProcessorHandle::active_tasks).sum()
    }

    /// Wait until every submitted task has finished (with timeout)
    pub fn wait_tasks_finished(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.active_tasks() == 0 {
                return true;
            }
            if start.elapsed() > timeout {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Stop processors, then workers, joining every thread.
    ///
    /// Returns the processors' counters summed, or the first processor error.
    /// Calling it again returns empty counters.
    pub fn stop(&mut self) -> ProcessorResult<ProcessorStats> {
        for handle in &self.handles {
            handle.stop();
        }

        let mut total = ProcessorStats::default();
        let mut first_error = None;
        for thread in self.threads.drain(..) {
            match join_with_timeout(thread, DEFAULT_JOIN_TIMEOUT) {
                Some(Ok(stats)) => total.merge(&stats),
                Some(Err(err)) => {
                    first_error.get_or_insert(err);
                }
                None => warn!("processor thread panicked or did not stop in time"),
            }
        }

        for worker in &self.io_workers {
            worker.stop();
        }
        for worker in &self.timer_workers {
            worker.stop();
        }
        debug!(finished = total.tasks_finished, "executor stopped");

        match first_error {
            Some(err) => Err(err),
            None => Ok(total),
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(%err, "executor stopped with a processor error");
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("processors", &self.handles.len())
            .field("io_workers", &self.io_workers.len())
            .field("timer_workers", &self.timer_workers.len())
            .finish()
    }
}
