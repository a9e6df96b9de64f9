//! CLI configuration (tasklet.toml)
//!
//! Layers, lowest first: built-in defaults, the TOML file, `TASKLET_*`
//! environment variables, then command-line flags (applied by the caller).

use serde::{Deserialize, Serialize};
use std::path::Path;
use tasklet_engine::ExecutorOptions;
use thiserror::Error;

/// File looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "tasklet.toml";

/// Environment variables read by [`CliConfig::apply_env`]
pub const ENV_PROCESSORS: &str = "TASKLET_PROCESSORS";
/// See [`ENV_PROCESSORS`]
pub const ENV_IO_WORKERS: &str = "TASKLET_IO_WORKERS";
/// See [`ENV_PROCESSORS`]
pub const ENV_TIMER_WORKERS: &str = "TASKLET_TIMER_WORKERS";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Environment variable is not a number
    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
    },
}

/// Shape of the synthetic workload run by `tasklet run`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadOptions {
    /// Number of tasks
    pub tasks: usize,

    /// Compute / sleep / wait cycles per task
    pub cycles: u32,

    /// `Continue` steps per cycle
    pub compute_steps: u32,

    /// Timer sleep per cycle, in milliseconds
    pub sleep_ms: u64,

    /// Period of the helper thread that makes I/O sources ready, in milliseconds
    pub io_tick_ms: u64,

    /// Give up waiting for the workload after this many seconds
    pub timeout_secs: u64,
}

impl Default for WorkloadOptions {
    fn default() -> Self {
        Self {
            tasks: 1000,
            cycles: 3,
            compute_steps: 20,
            sleep_ms: 1,
            io_tick_ms: 1,
            timeout_secs: 60,
        }
    }
}

/// Full CLI configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Executor and processor options
    pub executor: ExecutorOptions,

    /// Synthetic workload
    pub workload: WorkloadOptions,
}

impl CliConfig {
    /// Load from an explicit path, or from `tasklet.toml` if it exists
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Override worker counts from `TASKLET_*` environment variables
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|var| std::env::var(var).ok())
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let executor = &mut self.executor;
        for (var, slot) in [
            (ENV_PROCESSORS, &mut executor.processors),
            (ENV_IO_WORKERS, &mut executor.io_workers),
            (ENV_TIMER_WORKERS, &mut executor.timer_workers),
        ] {
            if let Some(value) = lookup(var) {
                *slot = value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidEnv { var, value })?;
            }
        }
        Ok(())
    }

    /// Serialize back to TOML
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
