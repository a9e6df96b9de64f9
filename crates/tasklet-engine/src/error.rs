//! Processor errors
//!
//! Both kinds are programming errors on the embedding side (a missing worker
//! registration, a task handed to the wrong processor). They are returned to
//! the caller of the triggering call and never retried.

use crate::processor::ProcessorId;
use crate::task::TaskId;

/// Configuration and integrity violations raised by a [`Processor`](crate::Processor)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessorError {
    /// A task suspended on I/O but no I/O worker is registered
    #[error("Processor has no I/O workers")]
    NoIoWorkers,

    /// A task suspended on a timer but no timer worker is registered
    #[error("Processor has no timer workers")]
    NoTimerWorkers,

    /// A task owned by another processor was handed to this one
    #[error("Attempt to schedule task {task:?} owned by processor {owner:?} on processor {processor:?}")]
    ForeignTask {
        /// The rejected task
        task: TaskId,
        /// Processor recorded as the task's owner
        owner: ProcessorId,
        /// Processor that received the task
        processor: ProcessorId,
    },
}

/// Processor operation result
pub type ProcessorResult<T> = Result<T, ProcessorError>;
