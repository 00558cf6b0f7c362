//! Transports shipped with the daemon.

pub mod console;

pub use console::Console;
