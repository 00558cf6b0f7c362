//! Agent: an event handler bound to a transport, with input and output pumps.
//!
//! ```text
//!            ┌───────────── input pump ──────────────┐
//! transport ─┤ poll() → stamp orig → handler.put()   │──► dispatch thread
//!            └───────────────────────────────────────┘         │
//!                                                     callbacks say()
//!                                                              │
//! transport ◄── output pump ◄── [ outbox FIFO ] ◄──────────────┘
//! ```
//!
//! Lifecycle is `Created → Started → Stopped`.  Stopping is cooperative: the
//! dispatch thread finishes its current callback, the output pump drains what
//! was queued before the stop, and an input pump blocked in `poll` leaves at
//! the next end-of-stream.

pub mod transport;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::error::AgentError;
use crate::dispatch::event::MessageKind;
use crate::dispatch::handler::Handler;
use crate::fleet::{Announcer, Fleet};
use crate::runtime::launcher::{TaskHandle, launch_named};

pub use transport::{Poll, Transport};

/// Which pumps [`Agent::start`] launches.  The default launches neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StartOptions {
    pub input: bool,
    pub output: bool,
}

impl StartOptions {
    pub fn both() -> Self {
        Self { input: true, output: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Created,
    Started,
    Stopped,
}

enum Outgoing {
    Line { channel: String, text: String, kind: MessageKind },
    Stop,
}

pub struct Agent<T: Transport> {
    id: String,
    me: Weak<Agent<T>>,
    handler: Handler,
    transport: Arc<T>,
    fleet: Fleet,
    channels: RwLock<Vec<String>>,
    state: Mutex<AgentState>,
    outbox_tx: mpsc::UnboundedSender<Outgoing>,
    outbox_rx: Mutex<Option<mpsc::UnboundedReceiver<Outgoing>>>,
    output_running: Arc<AtomicBool>,
    output_task: Mutex<Option<TaskHandle<()>>>,
    dispatch_started: AtomicBool,
    input_started: AtomicBool,
    input_closed: CancellationToken,
}

impl<T: Transport> Agent<T> {
    pub fn new(id: impl Into<String>, transport: T, fleet: Fleet) -> Arc<Self> {
        let id = id.into();
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        Arc::new_cyclic(|me| Self {
            handler: Handler::new(id.clone()),
            id,
            me: me.clone(),
            transport: Arc::new(transport),
            fleet,
            channels: RwLock::new(Vec::new()),
            state: Mutex::new(AgentState::Created),
            outbox_tx,
            outbox_rx: Mutex::new(Some(outbox_rx)),
            output_running: Arc::new(AtomicBool::new(false)),
            output_task: Mutex::new(None),
            dispatch_started: AtomicBool::new(false),
            input_started: AtomicBool::new(false),
            input_closed: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The agent's event handler; register callbacks here before `start`.
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn state(&self) -> AgentState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancelled when the input pump ends (end-of-stream or poll error).
    pub fn input_closed(&self) -> CancellationToken {
        self.input_closed.clone()
    }

    pub fn connect(&self) -> Result<(), AgentError> {
        self.transport.connect().map_err(|source| AgentError::Connect {
            id: self.id.clone(),
            source,
        })?;
        info!(agent = %self.id, "connected");
        Ok(())
    }

    /// Join the fleet, start dispatching and launch the requested pumps.
    /// Does not connect the transport.
    ///
    /// On failure the agent leaves the fleet and stays `Created`.  Parts that
    /// did launch keep running: a retry launches only what is missing, and
    /// [`Agent::stop`] tears everything down.
    pub fn start(&self, opts: StartOptions) -> Result<(), AgentError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != AgentState::Created {
            return Err(AgentError::AlreadyStarted(self.id.clone()));
        }

        let me = self.as_announcer();
        if let Some(me) = &me {
            self.fleet.add(me);
        }
        if let Err(e) = self.launch_parts(opts) {
            if let Some(me) = &me {
                let _ = self.fleet.remove(me);
            }
            warn!(agent = %self.id, error = %e, "start failed; agent left the fleet");
            return Err(e);
        }
        *state = AgentState::Started;

        info!(agent = %self.id, input = opts.input, output = opts.output, "agent started");
        Ok(())
    }

    fn launch_parts(&self, opts: StartOptions) -> Result<(), AgentError> {
        if !self.dispatch_started.load(Ordering::SeqCst) {
            self.handler.start()?;
            self.dispatch_started.store(true, Ordering::SeqCst);
        }
        if opts.output {
            self.start_output()?;
        }
        if opts.input && !self.input_started.load(Ordering::SeqCst) {
            self.start_input()?;
            self.input_started.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn start_output(&self) -> Result<(), AgentError> {
        let mut slot = self.outbox_rx.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            return Ok(());
        }
        let transport = self.transport.clone();
        let running = self.output_running.clone();
        let id = self.id.clone();

        let (hand_off, receive) = oneshot::channel::<mpsc::UnboundedReceiver<Outgoing>>();
        let task = launch_named(format!("{}-output", self.id), move || {
            let Ok(mut rx) = receive.blocking_recv() else { return };
            while let Some(Outgoing::Line { channel, text, kind }) = rx.blocking_recv() {
                if let Err(e) = transport.say(&channel, &text, kind) {
                    warn!(agent = %id, %channel, error = %e, "say failed");
                }
            }
            running.store(false, Ordering::SeqCst);
            debug!(agent = %id, "output pump stopped");
        })?;

        self.output_running.store(true, Ordering::SeqCst);
        if let Some(rx) = slot.take() {
            let _ = hand_off.send(rx);
        }
        *self.output_task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        Ok(())
    }

    fn start_input(&self) -> Result<(), AgentError> {
        let transport = self.transport.clone();
        let handler = self.handler.clone();
        let closed = self.input_closed.clone();
        let id = self.id.clone();

        launch_named(format!("{}-input", self.id), move || {
            while !handler.is_stopped() {
                match transport.poll() {
                    Ok(Poll::Event(mut event)) => {
                        event.orig = id.clone();
                        handler.put(event);
                    }
                    Ok(Poll::EndOfStream) => {
                        info!(agent = %id, "input closed");
                        break;
                    }
                    Err(e) => {
                        warn!(agent = %id, error = %e, "poll failed; input pump stopping");
                        break;
                    }
                }
            }
            closed.cancel();
        })?;
        Ok(())
    }

    /// Send `text` to `channel`, through the outbox when the output pump runs.
    pub fn say(&self, channel: &str, text: &str, kind: MessageKind) {
        if self.output_running.load(Ordering::SeqCst) {
            let line = Outgoing::Line {
                channel: channel.to_string(),
                text: text.to_string(),
                kind,
            };
            if self.outbox_tx.send(line).is_ok() {
                return;
            }
        }
        if let Err(e) = self.transport.say(channel, text, kind) {
            warn!(agent = %self.id, %channel, error = %e, "say failed");
        }
    }

    /// Say `text` on every joined channel.
    pub fn announce(&self, text: &str) {
        for channel in self.channels() {
            self.say(&channel, text, MessageKind::Announce);
        }
    }

    /// Returns `false` if already joined.
    pub fn join_channel(&self, channel: impl Into<String>) -> bool {
        let channel = channel.into();
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        if channels.contains(&channel) {
            return false;
        }
        debug!(agent = %self.id, %channel, "joined channel");
        channels.push(channel);
        true
    }

    pub fn channels(&self) -> Vec<String> {
        self.channels.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Stop dispatching, wake the output pump and leave the fleet.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == AgentState::Stopped {
                return;
            }
            *state = AgentState::Stopped;
        }

        self.handler.stop();
        let _ = self.outbox_tx.send(Outgoing::Stop);
        if let Some(me) = self.as_announcer() {
            if let Err(e) = self.fleet.remove(&me) {
                debug!(agent = %self.id, error = %e, "stop: not in fleet");
            }
        }
        info!(agent = %self.id, "agent stopped");
    }

    /// Wait up to `timeout` for the dispatch thread and output pump to exit.
    pub fn join(&self, timeout: Duration) -> bool {
        let handler_done = self.handler.join(timeout);
        let task = self.output_task.lock().unwrap_or_else(PoisonError::into_inner).take();
        let output_done = match task {
            None => true,
            Some(task) => match task.join_timeout(timeout) {
                Ok(()) => true,
                Err(_) => {
                    *self.output_task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
                    false
                }
            },
        };
        handler_done && output_done
    }

    fn as_announcer(&self) -> Option<Arc<dyn Announcer>> {
        self.me.upgrade().map(|me| me as Arc<dyn Announcer>)
    }
}

impl<T: Transport> Announcer for Agent<T> {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn say(&self, channel: &str, text: &str, kind: MessageKind) {
        Agent::say(self, channel, text, kind);
    }

    fn announce(&self, text: &str) {
        Agent::announce(self, text);
    }
}

impl<T: Transport> std::fmt::Debug for Agent<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("channels", &self.channels())
            .finish()
    }
}
