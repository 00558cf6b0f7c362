//! Public configuration types.
//!
//! These are the resolved, ready-to-use structs the daemon consumes.
//! Raw TOML deserialization types live in `raw.rs`.

use std::path::PathBuf;
use std::time::Duration;

/// Stdin/stdout console agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    pub enabled: bool,
    /// Channel name stamped on every console line.
    pub channel: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandsConfig {
    /// Text a line must start with to count as a command.  Empty accepts all.
    pub prefix: String,
    /// Command modules to load, in priority order.
    pub modules: Vec<String>,
    /// Origins permitted to run commands.  Empty permits everyone.
    pub allowed: Vec<String>,
}

/// Periodic fleet-wide announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub every: Duration,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchedulerConfig {
    /// `None` when absent or `every_secs = 0`.
    pub heartbeat: Option<HeartbeatConfig>,
}

/// Fully resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bot_name: String,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub console: ConsoleConfig,
    pub commands: CommandsConfig,
    pub scheduler: SchedulerConfig,
}
