//! `tasklet info`: Display version, effective configuration and environment.

use crate::config::{CliConfig, ENV_IO_WORKERS, ENV_PROCESSORS, ENV_TIMER_WORKERS};
use crate::LOG_ENV;
use tasklet_engine::defaults::{DEFAULT_BURST_STEPS, DEFAULT_INTAKE_BATCH};

pub fn execute(config: &CliConfig) -> anyhow::Result<()> {
    // Version
    println!("Tasklet v{}", env!("CARGO_PKG_VERSION"));
    println!();

    // Platform
    println!("Platform:     {} ({})", std::env::consts::OS, std::env::consts::ARCH);
    println!("CPUs:         {}", num_cpus::get());
    println!("Defaults:     burst {} steps, intake batch {}", DEFAULT_BURST_STEPS, DEFAULT_INTAKE_BATCH);

    // Effective configuration
    println!();
    println!("Configuration:");
    for line in config.to_toml()?.lines() {
        println!("  {}", line);
    }

    // Environment
    println!();
    println!("Environment:");
    print_env("  TASKLET_PROCESSORS", ENV_PROCESSORS);
    print_env("  TASKLET_IO_WORKERS", ENV_IO_WORKERS);
    print_env("  TASKLET_TIMER_WORKERS", ENV_TIMER_WORKERS);
    print_env("  TASKLET_LOG", LOG_ENV);

    Ok(())
}

fn print_env(label: &str, var: &str) {
    match std::env::var(var) {
        Ok(val) => println!("{} = {}", label, val),
        Err(_) => println!("{} = (default)", label),
    }
}
