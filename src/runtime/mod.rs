//! Runtime primitives shared by every other module: thread launching, error
//! reporting, name resolution and timers.

pub mod launcher;
pub mod report;
pub mod resolver;
pub mod timer;

pub use launcher::{TaskHandle, launch, launch_named};
pub use resolver::{Module, ModuleRegistry, Symbol};
pub use timer::{Clock, Repeater, Timer, TimerGuard, TimerSnapshot};
