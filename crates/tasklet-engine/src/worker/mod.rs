//! Worker engines
//!
//! A worker takes suspended tasks off the processor's hands, blocks (on its
//! own thread) until their wait is satisfied, and hands them back through the
//! owning processor's entry points. The processor only ever talks to a worker
//! through [`Worker::push_tasks`], once per `iterate` call, with everything
//! staged for it.

mod io;
mod timer;

pub use io::IoWorker;
pub use timer::TimerWorker;

use crate::queue::TaskQueue;
use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What a worker waits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    /// Socket or other source readiness
    Io,
    /// Timer deadlines
    Timer,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerKind::Io => f.write_str("io"),
            WorkerKind::Timer => f.write_str("timer"),
        }
    }
}

/// An engine that waits on behalf of suspended tasks.
///
/// Implementations must return every task they accept, either through the
/// owner's `return_from_io` / `return_from_timer` entry points or by
/// dropping it when the owner is gone.
pub trait Worker: Send + Sync {
    /// Which suspensions this worker handles
    fn kind(&self) -> WorkerKind;

    /// Take every task out of `tasks`. Must not block on the tasks' waits.
    fn push_tasks(&self, tasks: &mut TaskQueue);
}

/// Join a thread, detaching it if it does not finish within `timeout`.
///
/// Returns the thread's result, or `None` if it panicked or was detached.
pub(crate) fn join_with_timeout<T>(handle: JoinHandle<T>, timeout: Duration) -> Option<T> {
    let start = Instant::now();
    loop {
        if handle.is_finished() {
            return handle.join().ok();
        }
        if start.elapsed() > timeout {
            tracing::warn!(thread = ?handle.thread().name(), "thread did not stop in time, detaching");
            return None;
        }
        thread::sleep(Duration::from_millis(5));
    }
}
