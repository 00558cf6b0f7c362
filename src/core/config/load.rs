//! Configuration loading with env-var overrides.
//!
//! Reads TOML files, supports `[meta] base = "..."` inheritance chains,
//! and applies the `BOTD_LOG_LEVEL` env override.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::core::error::AppError;

use super::raw::{self, RawConfig};
use super::types::*;

/// Default config file, relative to the working directory.
pub const DEFAULT_PATH: &str = "config/default.toml";

/// Deep-merge two TOML values.
/// Tables are merged recursively; the overlay only needs to specify keys that
/// differ from the base.  Any other value (string, integer, array, …) in the
/// overlay replaces the base value wholesale.
fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_tbl), toml::Value::Table(overlay_tbl)) => {
            for (key, ov_val) in overlay_tbl {
                let merged = match base_tbl.remove(&key) {
                    Some(base_val) => merge_toml(base_val, ov_val),
                    None => ov_val,
                };
                base_tbl.insert(key, merged);
            }
            toml::Value::Table(base_tbl)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file, follow its `[meta] base` chain and return the merged
/// value.  `visited` holds the canonical paths seen so far, so a cycle is an
/// error instead of a stack overflow.
fn load_raw_merged(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<toml::Value, AppError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical) {
        return Err(AppError::Config(format!(
            "circular base reference detected at: {}",
            path.display()
        )));
    }

    let text = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    let overlay: toml::Value = toml::from_str(&text)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let base = overlay
        .get("meta")
        .and_then(|m| m.get("base"))
        .and_then(|b| b.as_str())
        .map(|b| {
            if Path::new(b).is_absolute() {
                PathBuf::from(b)
            } else {
                path.parent().unwrap_or(Path::new(".")).join(b)
            }
        });

    match base {
        Some(base_path) => Ok(merge_toml(load_raw_merged(&base_path, visited)?, overlay)),
        None => Ok(overlay),
    }
}

/// Load config from `config_path`, or [`DEFAULT_PATH`], then apply env
/// overrides.  Without an explicit path and without a default file the
/// built-in [`Config::default`] is used.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let log_level_override = env::var("BOTD_LOG_LEVEL").ok();

    if let Some(path) = config_path {
        return load_from(Path::new(path), log_level_override.as_deref());
    }

    let default_path = Path::new(DEFAULT_PATH);
    if default_path.exists() {
        load_from(default_path, log_level_override.as_deref())
    } else {
        let mut config = Config::default();
        if let Some(level) = log_level_override {
            config.log_level = level;
        }
        Ok(config)
    }
}

/// Load from an explicit path.  Tests pass the override directly instead of
/// mutating the environment.
pub fn load_from(path: &Path, log_level_override: Option<&str>) -> Result<Config, AppError> {
    let merged = load_raw_merged(path, &mut HashSet::new())?;
    let parsed: RawConfig = Deserialize::deserialize(merged).map_err(|e: toml::de::Error| {
        AppError::Config(format!("config error in {}: {e}", path.display()))
    })?;

    let d = parsed.daemon;
    if d.bot_name.trim().is_empty() {
        return Err(AppError::Config(format!(
            "config error in {}: daemon.bot_name must not be empty",
            path.display()
        )));
    }

    let heartbeat = parsed
        .scheduler
        .heartbeat
        .filter(|h| h.every_secs > 0)
        .map(|h| HeartbeatConfig {
            every: Duration::from_secs(h.every_secs),
            text: h.text,
        });

    Ok(Config {
        bot_name: d.bot_name,
        log_level: log_level_override.unwrap_or(&d.log_level).to_string(),
        log_file: d.log_file.as_deref().map(expand_home),
        console: ConsoleConfig {
            enabled: parsed.console.enabled,
            channel: parsed.console.channel,
        },
        commands: CommandsConfig {
            prefix: parsed.commands.prefix,
            modules: parsed.commands.modules,
            allowed: parsed.commands.allowed,
        },
        scheduler: SchedulerConfig { heartbeat },
    })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_name: "botd".to_string(),
            log_level: "info".to_string(),
            log_file: None,
            console: ConsoleConfig {
                enabled: true,
                channel: raw::default_console_channel(),
            },
            commands: CommandsConfig {
                prefix: String::new(),
                modules: raw::default_command_modules(),
                allowed: Vec::new(),
            },
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
