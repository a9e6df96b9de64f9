//! Subcommand implementations
//!
//! Each command exposes `execute(...) -> anyhow::Result<()>`.

pub mod info;
pub mod run;
