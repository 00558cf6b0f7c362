//! Event dispatch: events and the queue-driven handler that routes them.

pub mod event;
pub mod handler;

pub use event::{Event, MessageKind, Ready};
pub use handler::{Callback, Handler};
