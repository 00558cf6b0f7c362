//! Transport seam between an [`Agent`](super::Agent) and the outside world.

use crate::dispatch::event::{Event, MessageKind};

/// Result of one blocking [`Transport::poll`].
#[derive(Debug)]
pub enum Poll {
    Event(Event),
    /// The peer closed; the input pump stops.
    EndOfStream,
}

/// Connection-level collaborator of an agent.
///
/// `poll` blocks the input pump thread until something arrives.  `say` is
/// called from the output pump (or directly when no pump runs) and may block.
pub trait Transport: Send + Sync + 'static {
    fn connect(&self) -> anyhow::Result<()>;

    fn poll(&self) -> anyhow::Result<Poll>;

    fn say(&self, channel: &str, text: &str, kind: MessageKind) -> anyhow::Result<()>;
}
