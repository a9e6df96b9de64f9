//! Tasklet Engine
//!
//! A cooperative task processor for stackless coroutines:
//! - **Processor**: single-threaded driver of a ready queue (`processor` module)
//! - **Tasks**: coroutines plus scheduling metadata (`task` module)
//! - **Workers**: engines that wait on I/O readiness or timers on behalf of
//!   suspended tasks (`worker` module)
//! - **Executor**: a set of processor threads sharing one set of workers
//!   (`executor` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use tasklet_engine::{Coroutine, Decision, Processor};
//!
//! struct Countdown(u32);
//!
//! impl Coroutine for Countdown {
//!     fn step(&mut self) -> Decision {
//!         self.0 -= 1;
//!         Decision::Continue
//!     }
//!
//!     fn finished(&self) -> bool {
//!         self.0 == 0
//!     }
//! }
//!
//! let mut processor = Processor::new();
//! processor.submit(|| Countdown(25));
//! while processor.iterate(1)? {}
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Default tuning constants
pub mod defaults;

/// Scheduling decisions and I/O wait descriptions
pub mod decision;

/// Processor errors
pub mod error;

/// Executor: processor threads plus shared workers
pub mod executor;

/// Processor: ready queue, intake and worker staging
pub mod processor;

/// Intrusive FIFO of tasks
pub mod queue;

/// Tasks and the coroutine contract
pub mod task;

/// Worker trait and the reference I/O and timer workers
pub mod worker;

mod handoff;

// ============================================================================
// Re-exports
// ============================================================================

pub use decision::{Decision, Interest, IoSource, IoWait, ReadyFlag};
pub use error::{ProcessorError, ProcessorResult};
pub use executor::{Executor, ExecutorOptions};
pub use processor::{Processor, ProcessorHandle, ProcessorId, ProcessorOptions, ProcessorStats};
pub use queue::TaskQueue;
pub use task::{Coroutine, Submission, Task, TaskId};
pub use worker::{IoWorker, TimerWorker, Worker, WorkerKind};
