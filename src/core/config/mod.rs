//! Daemon configuration.
//!
//! Reads `config/default.toml` relative to the current working directory
//! (or the file given with `-f`), then applies the `BOTD_LOG_LEVEL` override.
//!
//! # Module layout
//!
//! - **types**: resolved structs consumed by the binary (`Config`,
//!   `ConsoleConfig`, `CommandsConfig`, `SchedulerConfig`).
//! - **raw**: serde targets mirroring the file shape; private.
//! - **load**: `merge_toml`, `[meta] base` chains, `load`, `load_from`,
//!   `expand_home`.

mod load;
mod raw;
mod types;

pub use load::{DEFAULT_PATH, expand_home, load, load_from};
pub use types::*;
