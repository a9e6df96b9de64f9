//! Tasklet CLI
//!
//! Runs synthetic workloads on the tasklet engine and reports what the
//! processors did.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use config::CliConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter
pub(crate) const LOG_ENV: &str = "TASKLET_LOG";

#[derive(Parser)]
#[command(name = "tasklet")]
#[command(about = "Cooperative coroutine processor", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./tasklet.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a synthetic workload
    Run {
        /// Number of tasks
        #[arg(short, long)]
        tasks: Option<usize>,
        /// Compute / sleep / wait cycles per task
        #[arg(long)]
        cycles: Option<u32>,
        /// Continue steps per cycle
        #[arg(long)]
        compute_steps: Option<u32>,
        /// Timer sleep per cycle in milliseconds
        #[arg(long)]
        sleep_ms: Option<u64>,
        /// Processor threads (0 = one per CPU)
        #[arg(short, long)]
        processors: Option<usize>,
        /// I/O worker threads
        #[arg(long)]
        io_workers: Option<usize>,
        /// Timer worker threads
        #[arg(long)]
        timer_workers: Option<usize>,
        /// Steps per burst
        #[arg(long)]
        burst_steps: Option<usize>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version, configuration and environment
    Info,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = CliConfig::load(cli.config.as_deref())?;
    config.apply_env()?;

    match cli.command {
        Commands::Run {
            tasks,
            cycles,
            compute_steps,
            sleep_ms,
            processors,
            io_workers,
            timer_workers,
            burst_steps,
            json,
        } => {
            let workload = &mut config.workload;
            if let Some(tasks) = tasks {
                workload.tasks = tasks;
            }
            if let Some(cycles) = cycles {
                workload.cycles = cycles;
            }
            if let Some(steps) = compute_steps {
                workload.compute_steps = steps;
            }
            if let Some(ms) = sleep_ms {
                workload.sleep_ms = ms;
            }

            let executor = &mut config.executor;
            if let Some(n) = processors {
                executor.processors = n;
            }
            if let Some(n) = io_workers {
                executor.io_workers = n;
            }
            if let Some(n) = timer_workers {
                executor.timer_workers = n;
            }
            if let Some(n) = burst_steps {
                executor.processor.burst_steps = n;
            }

            commands::run::execute(config, json)?;
        }

        Commands::Info => {
            commands::info::execute(&config)?;
        }
    }

    Ok(())
}
