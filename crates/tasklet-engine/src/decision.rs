//! Step outcomes
//!
//! Every call to [`Coroutine::step`](crate::Coroutine::step) yields a
//! [`Decision`] telling the processor what to do with the task next. The
//! decision is cloned into the task before it leaves the ready queue, so a
//! worker (and later the resumed task) can read it without recomputing it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Direction of an I/O wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    /// Wait until the source can be read
    Read,
    /// Wait until the source can be written
    Write,
}

/// Something an I/O worker can probe for readiness.
///
/// How readiness is detected (epoll, kqueue, a flag set by another thread) is
/// up to the implementor. `is_ready` must not block.
pub trait IoSource: Send + Sync {
    /// Whether the source is ready for the given interest
    fn is_ready(&self, interest: Interest) -> bool;
}

/// An I/O wait: a source plus the interest the task is waiting for
#[derive(Clone)]
pub struct IoWait {
    source: Arc<dyn IoSource>,
    interest: Interest,
}

impl IoWait {
    /// Create a wait on `source` for `interest`
    pub fn new(source: Arc<dyn IoSource>, interest: Interest) -> Self {
        Self { source, interest }
    }

    /// Shorthand for a read wait
    pub fn read(source: Arc<dyn IoSource>) -> Self {
        Self::new(source, Interest::Read)
    }

    /// Shorthand for a write wait
    pub fn write(source: Arc<dyn IoSource>) -> Self {
        Self::new(source, Interest::Write)
    }

    /// The interest being waited for
    pub fn interest(&self) -> Interest {
        self.interest
    }

    /// Probe the source once
    pub fn is_ready(&self) -> bool {
        self.source.is_ready(self.interest)
    }
}

impl fmt::Debug for IoWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoWait")
            .field("source", &Arc::as_ptr(&self.source).cast::<()>())
            .field("interest", &self.interest)
            .finish()
    }
}

/// Outcome of a single step
#[derive(Debug, Clone)]
pub enum Decision {
    /// Keep running; the task stays at the front of the ready queue
    Continue,
    /// Leave the driving loop until the I/O source becomes ready
    SuspendOnIo(IoWait),
    /// Do not suspend: the source is likely ready, re-run right away
    RepeatOnIo(IoWait),
    /// Leave the driving loop until the deadline passes
    SuspendOnTimer(Instant),
}

impl Decision {
    /// Whether this decision takes the task out of the ready queue
    pub fn suspends(&self) -> bool {
        matches!(self, Decision::SuspendOnIo(_) | Decision::SuspendOnTimer(_))
    }

    /// The I/O wait carried by this decision, if any
    pub fn io_wait(&self) -> Option<&IoWait> {
        match self {
            Decision::SuspendOnIo(wait) | Decision::RepeatOnIo(wait) => Some(wait),
            _ => None,
        }
    }

    /// The timer deadline carried by this decision, if any
    pub fn deadline(&self) -> Option<Instant> {
        match self {
            Decision::SuspendOnTimer(at) => Some(*at),
            _ => None,
        }
    }
}

/// A readiness flag flipped by whoever produces the event.
///
/// Ready for both interests once set. Useful for wiring tasks to events that
/// do not come from a file descriptor, and in tests.
#[derive(Debug, Default)]
pub struct ReadyFlag {
    ready: AtomicBool,
}

impl ReadyFlag {
    /// Create an unset flag
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark the flag ready
    pub fn set(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// Reset the flag to not ready
    pub fn clear(&self) {
        self.ready.store(false, Ordering::Release);
    }
}

impl IoSource for ReadyFlag {
    fn is_ready(&self, _interest: Interest) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_suspends() {
        let flag = ReadyFlag::new();
        assert!(!Decision::Continue.suspends());
        assert!(!Decision::RepeatOnIo(IoWait::read(flag.clone())).suspends());
        assert!(Decision::SuspendOnIo(IoWait::read(flag)).suspends());
        assert!(Decision::SuspendOnTimer(Instant::now()).suspends());
    }

    #[test]
    fn test_clone_shares_source() {
        let flag = ReadyFlag::new();
        let decision = Decision::SuspendOnIo(IoWait::write(flag.clone()));
        let cloned = decision.clone();

        let wait = cloned.io_wait().unwrap();
        assert_eq!(wait.interest(), Interest::Write);
        assert!(!wait.is_ready());

        // Setting the original flag is visible through the clone
        flag.set();
        assert!(wait.is_ready());
        flag.clear();
        assert!(!decision.io_wait().unwrap().is_ready());
    }

    #[test]
    fn test_deadline() {
        let at = Instant::now() + Duration::from_millis(5);
        assert_eq!(Decision::SuspendOnTimer(at).deadline(), Some(at));
        assert_eq!(Decision::Continue.deadline(), None);
        assert!(Decision::Continue.io_wait().is_none());
    }
}
