//! Raw TOML deserialization types.
//!
//! These structs mirror the TOML file shape and use `serde` defaults.
//! The `load` module converts them into the public `types` structs.

use serde::Deserialize;

// ── Top-level ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawConfig {
    pub daemon: RawDaemon,
    #[serde(default)]
    pub console: RawConsole,
    #[serde(default)]
    pub commands: RawCommands,
    #[serde(default)]
    pub scheduler: RawScheduler,
}

#[derive(Deserialize)]
pub(super) struct RawDaemon {
    pub bot_name: String,
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<String>,
}

// ── Console ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawConsole {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_console_channel")]
    pub channel: String,
}

impl Default for RawConsole {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: default_console_channel(),
        }
    }
}

// ── Commands ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawCommands {
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_command_modules")]
    pub modules: Vec<String>,
    #[serde(default)]
    pub allowed: Vec<String>,
}

impl Default for RawCommands {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            modules: default_command_modules(),
            allowed: Vec::new(),
        }
    }
}

// ── Scheduler ───────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub(super) struct RawScheduler {
    #[serde(default)]
    pub heartbeat: Option<RawHeartbeat>,
}

#[derive(Deserialize)]
pub(super) struct RawHeartbeat {
    pub every_secs: u64,
    #[serde(default = "default_heartbeat_text")]
    pub text: String,
}

// ── Defaults ────────────────────────────────────────────────────────────────

pub(super) fn default_true() -> bool {
    true
}

pub(super) fn default_console_channel() -> String {
    "#console".to_string()
}

pub(super) fn default_command_modules() -> Vec<String> {
    vec!["cmd.basic".to_string(), "cmd.fleet".to_string()]
}

pub(super) fn default_heartbeat_text() -> String {
    "still here".to_string()
}
