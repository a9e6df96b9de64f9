//! Default constants for processor and worker configuration.
//!
//! Centralizes the tuning numbers shared by the processor, the reference
//! workers and the executor.

use std::time::Duration;

/// Maximum number of steps in one burst before the ready queue is rotated.
pub const DEFAULT_BURST_STEPS: usize = 10;

/// Pending batch size at or above which intake always takes a blocking lock.
pub const DEFAULT_INTAKE_BATCH: usize = 1000;

/// Rounds per `iterate` call made by [`Processor::run`](crate::Processor::run).
pub const DEFAULT_ITERATE_ROUNDS: usize = 100;

/// How long an I/O worker sleeps when none of its tasks is ready.
pub const DEFAULT_IO_POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Upper bound on how long an idle worker blocks before re-checking shutdown.
pub const DEFAULT_WORKER_IDLE_TIMEOUT: Duration = Duration::from_millis(100);

/// How long `stop()` waits for a worker or processor thread before detaching it.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
