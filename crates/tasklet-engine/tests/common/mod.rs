//! Shared helpers for integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tasklet_engine::{Coroutine, Decision, TaskId, TaskQueue, Worker, WorkerKind};

/// Replays a fixed list of decisions, then finishes
pub struct Script {
    decisions: Vec<Decision>,
    next: usize,
    steps: Arc<AtomicU64>,
    woken_by: Arc<Mutex<Vec<Decision>>>,
}

impl Script {
    pub fn new(decisions: Vec<Decision>) -> Self {
        Self {
            decisions,
            next: 0,
            steps: Arc::new(AtomicU64::new(0)),
            woken_by: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Share the step counter with the caller
    pub fn counting(mut self, steps: Arc<AtomicU64>) -> Self {
        self.steps = steps;
        self
    }

    /// Record every decision passed to `resume`
    pub fn recording(mut self, woken_by: Arc<Mutex<Vec<Decision>>>) -> Self {
        self.woken_by = woken_by;
        self
    }
}

impl Coroutine for Script {
    fn step(&mut self) -> Decision {
        self.steps.fetch_add(1, Ordering::SeqCst);
        let decision = self.decisions[self.next].clone();
        self.next += 1;
        decision
    }

    fn finished(&self) -> bool {
        self.next >= self.decisions.len()
    }

    fn resume(&mut self, woken_by: &Decision) {
        self.woken_by.lock().push(woken_by.clone());
    }
}

/// Returns the same decision forever and never finishes
pub struct Forever {
    decision: Decision,
    steps: Arc<AtomicU64>,
}

impl Forever {
    pub fn new(decision: Decision, steps: Arc<AtomicU64>) -> Self {
        Self { decision, steps }
    }
}

impl Coroutine for Forever {
    fn step(&mut self) -> Decision {
        self.steps.fetch_add(1, Ordering::SeqCst);
        self.decision.clone()
    }

    fn finished(&self) -> bool {
        false
    }
}

/// Worker that keeps every task it is given, for inspection
pub struct RecordingWorker {
    kind: WorkerKind,
    held: Mutex<TaskQueue>,
    pushes: AtomicU64,
}

impl RecordingWorker {
    pub fn new(kind: WorkerKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            held: Mutex::new(TaskQueue::new()),
            pushes: AtomicU64::new(0),
        })
    }

    pub fn held_ids(&self) -> Vec<TaskId> {
        self.held.lock().ids()
    }

    pub fn held_len(&self) -> usize {
        self.held.lock().len()
    }

    /// Number of `push_tasks` calls received
    pub fn pushes(&self) -> u64 {
        self.pushes.load(Ordering::SeqCst)
    }

    pub fn take(&self) -> TaskQueue {
        self.held.lock().take()
    }
}

impl Worker for RecordingWorker {
    fn kind(&self) -> WorkerKind {
        self.kind
    }

    fn push_tasks(&self, tasks: &mut TaskQueue) {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        self.held.lock().append(tasks);
    }
}

pub fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}
