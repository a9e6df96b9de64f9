//! `tasklet run`: Drive a synthetic workload on an executor.

use crate::config::{CliConfig, WorkloadOptions};
use crossbeam::channel::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tasklet_engine::{Coroutine, Decision, Executor, IoWait, ProcessorStats, ReadyFlag};
use tracing::{debug, info};

/// Where a synthetic task is within its current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Compute(u32),
    Sleep,
    Wait,
}

/// Computes, sleeps on a timer, then waits on its own I/O flag, `cycles` times
struct Synthetic {
    flag: Arc<ReadyFlag>,
    cycles_left: u32,
    compute_steps: u32,
    sleep: Duration,
    phase: Phase,
}

impl Synthetic {
    fn new(flag: Arc<ReadyFlag>, workload: &WorkloadOptions) -> Self {
        Self {
            flag,
            cycles_left: workload.cycles,
            compute_steps: workload.compute_steps,
            sleep: Duration::from_millis(workload.sleep_ms),
            phase: Phase::Compute(workload.compute_steps),
        }
    }
}

impl Coroutine for Synthetic {
    fn step(&mut self) -> Decision {
        match self.phase {
            Phase::Compute(0) => {
                self.phase = Phase::Sleep;
                Decision::Continue
            }
            Phase::Compute(n) => {
                self.phase = Phase::Compute(n - 1);
                Decision::Continue
            }
            Phase::Sleep => {
                self.phase = Phase::Wait;
                Decision::SuspendOnTimer(Instant::now() + self.sleep)
            }
            Phase::Wait => {
                self.phase = Phase::Compute(self.compute_steps);
                Decision::SuspendOnIo(IoWait::read(self.flag.clone()))
            }
        }
    }

    fn finished(&self) -> bool {
        self.cycles_left == 0
    }

    fn resume(&mut self, woken_by: &Decision) {
        // The cycle ends when its I/O wait does. Consume the readiness so the
        // next cycle waits for a fresh tick.
        if woken_by.io_wait().is_some() {
            self.cycles_left = self.cycles_left.saturating_sub(1);
            self.flag.clear();
        }
    }
}

/// Sets every flag once per tick until told to stop
fn spawn_ticker(
    flags: Vec<Arc<ReadyFlag>>,
    tick: Duration,
) -> anyhow::Result<(channel::Sender<()>, thread::JoinHandle<u64>)> {
    let (stop_tx, stop_rx) = channel::bounded::<()>(1);
    let handle = thread::Builder::new()
        .name("tasklet-io-ticker".to_string())
        .spawn(move || {
            let mut ticks = 0u64;
            loop {
                match stop_rx.recv_timeout(tick) {
                    Err(RecvTimeoutError::Timeout) => {
                        for flag in &flags {
                            flag.set();
                        }
                        ticks += 1;
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return ticks,
                }
            }
        })?;
    Ok((stop_tx, handle))
}

pub fn execute(config: CliConfig, json: bool) -> anyhow::Result<()> {
    let workload = config.workload.clone();
    info!(
        tasks = workload.tasks,
        cycles = workload.cycles,
        processors = config.executor.resolved_processors(),
        "starting synthetic workload"
    );

    let mut executor = Executor::start(config.executor.clone())?;

    let flags: Vec<Arc<ReadyFlag>> = (0..workload.tasks).map(|_| ReadyFlag::new()).collect();
    let (stop_ticker, ticker) = spawn_ticker(flags.clone(), Duration::from_millis(workload.io_tick_ms.max(1)))?;

    let start = Instant::now();
    for flag in flags {
        let workload = workload.clone();
        executor.execute(move || Synthetic::new(flag, &workload));
    }

    let finished = executor.wait_tasks_finished(Duration::from_secs(workload.timeout_secs));
    let elapsed = start.elapsed();

    let _ = stop_ticker.send(());
    let ticks = ticker.join().unwrap_or_default();
    debug!(ticks, "io ticker stopped");

    let remaining = executor.active_tasks();
    let stats = executor.stop()?;
    if !finished {
        anyhow::bail!(
            "workload did not finish within {}s ({} tasks still active)",
            workload.timeout_secs,
            remaining
        );
    }

    report(&config, &stats, elapsed, json)
}

fn report(config: &CliConfig, stats: &ProcessorStats, elapsed: Duration, json: bool) -> anyhow::Result<()> {
    if json {
        let value = serde_json::json!({
            "config": config,
            "stats": stats,
            "elapsed_ms": elapsed.as_secs_f64() * 1000.0,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let secs = elapsed.as_secs_f64();
    println!("Workload:     {} tasks x {} cycles", config.workload.tasks, config.workload.cycles);
    println!(
        "Executor:     {} processors, {} io workers, {} timer workers",
        config.executor.resolved_processors(),
        config.executor.io_workers,
        config.executor.timer_workers
    );
    println!();
    println!("Tasks:        {} created, {} finished", stats.tasks_created, stats.tasks_finished);
    println!("Steps:        {}", stats.steps);
    println!("Suspensions:  {} io, {} timer", stats.io_suspensions, stats.timer_suspensions);
    println!("Rotations:    {}", stats.rotations);
    println!("Intake skips: {}", stats.intake_skipped);
    println!();
    println!("Elapsed:      {:.3}s", secs);
    if secs > 0.0 {
        println!("Throughput:   {:.0} steps/s", stats.steps as f64 / secs);
    }
    Ok(())
}
