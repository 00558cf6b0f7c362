//! botd: channel daemon built on a threaded event dispatch core.
//!
//! Leaf-first: [`runtime`] (launcher, error reports, name resolution,
//! timers) → [`dispatch`] (events and handlers) → [`agent`] and [`fleet`] →
//! [`commands`] and [`comms`].  The binary in `src/main.rs` wires them
//! together from [`config`].

pub mod agent;
pub mod bootstrap;
pub mod commands;
pub mod comms;
pub mod core;
pub mod dispatch;
pub mod fleet;
pub mod runtime;

pub use crate::core::{config, error};
pub use bootstrap::logger;
