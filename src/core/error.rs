//! Error types for the dispatch core and the daemon binary.

use std::time::Duration;

use thiserror::Error;

/// Failure of a unit of work started through [`crate::runtime::launcher`].
///
/// Only observable by a caller that joins the task handle; an unjoined
/// panic is still logged by the launcher itself.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("task '{name}' panicked: {message}")]
    Panicked { name: String, message: String },

    #[error("task '{name}' did not finish within {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("task '{name}' result already taken")]
    Detached { name: String },
}

/// A fully-qualified name could not be resolved by a
/// [`ModuleRegistry`](crate::runtime::resolver::ModuleRegistry).
///
/// Recoverable: dynamic command lookup treats it as "unknown command".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameResolutionError {
    #[error("malformed name '{0}': expected 'module.symbol'")]
    Malformed(String),

    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("symbol '{symbol}' not found in module '{module}'")]
    SymbolNotFound { module: String, symbol: String },
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler '{0}' already started")]
    AlreadyStarted(String),

    #[error(transparent)]
    Launch(#[from] LaunchError),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent '{0}' already started")]
    AlreadyStarted(String),

    #[error("agent '{id}' failed to connect: {source}")]
    Connect {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Launch(#[from] LaunchError),
}

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("agent '{0}' is not registered in the fleet")]
    NotRegistered(String),
}

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("repeater '{0}' needs an interval greater than zero")]
    ZeroInterval(String),

    #[error("failed to build clock runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error(transparent)]
    Launch(#[from] LaunchError),
}

/// Top-level error of the `botd` binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error(transparent)]
    Resolve(#[from] NameResolutionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn resolution_errors_name_the_missing_part() {
        let e = NameResolutionError::SymbolNotFound {
            module: "cmd.basic".into(),
            symbol: "nope".into(),
        };
        assert!(e.to_string().contains("cmd.basic"));
        assert!(e.to_string().contains("nope"));

        let e: AppError = NameResolutionError::ModuleNotFound("cmd.x".into()).into();
        assert!(e.to_string().contains("cmd.x"));
    }

    #[test]
    fn launch_error_keeps_spawn_source() {
        let e = LaunchError::Spawn {
            name: "worker".into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "no threads left"),
        };
        assert!(e.to_string().contains("worker"));
        assert!(e.source().is_some());
    }

    #[test]
    fn handler_error_wraps_launch_error() {
        let launch = LaunchError::Panicked { name: "t".into(), message: "boom".into() };
        let e: AgentError = HandlerError::from(launch).into();
        assert!(e.to_string().contains("boom"));
    }
}
