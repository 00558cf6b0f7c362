//! Event handler: blocking FIFO, callback table and a dedicated dispatch thread.
//!
//! ```text
//!  put(event) ──► [ unbounded FIFO ] ──► dispatch thread
//!                                          ├─ Stop sentinel → exit loop
//!                                          └─ Event
//!                                               ├─ callbacks[etype]? → cb(handler, &mut event)
//!                                               │     Err / panic → report, log, swallow
//!                                               └─ event.ready()   (always)
//! ```
//!
//! One misbehaving callback never stops the loop and never leaves an event
//! un-ready.  Events whose `etype` has no callback are skipped without a log
//! line; they are still marked ready.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace};

use crate::core::error::HandlerError;
use crate::runtime::launcher::{TaskHandle, launch_named};
use crate::runtime::report;

use super::event::Event;

/// Handler callback.  Receives the handler that dispatched the event so it
/// can enqueue follow-up events.
pub type Callback = Arc<dyn Fn(&Handler, &mut Event) -> anyhow::Result<()> + Send + Sync>;

enum Queued {
    Event(Event),
    Stop,
}

struct Inner {
    name: String,
    callbacks: RwLock<HashMap<String, Callback>>,
    tx: mpsc::UnboundedSender<Queued>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Queued>>>,
    stopped: AtomicBool,
    dispatcher: Mutex<Option<TaskHandle<()>>>,
}

/// Cheaply cloneable handle to one event queue and its dispatch thread.
#[derive(Clone)]
pub struct Handler {
    inner: Arc<Inner>,
}

impl Handler {
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                callbacks: RwLock::new(HashMap::new()),
                tx,
                rx: Mutex::new(Some(rx)),
                stopped: AtomicBool::new(false),
                dispatcher: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Install or replace the callback for `etype`.  Last registration wins.
    pub fn register<F>(&self, etype: impl Into<String>, callback: F)
    where
        F: Fn(&Handler, &mut Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let etype = etype.into();
        debug!(handler = %self.inner.name, %etype, "callback registered");
        self.inner
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(etype, Arc::new(callback));
    }

    pub fn is_registered(&self, etype: &str) -> bool {
        self.inner
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(etype)
    }

    /// Enqueue `event` without blocking.
    ///
    /// After [`Handler::stop`] the event is not queued: it is marked ready
    /// and dropped so nobody waits on it forever.
    pub fn put(&self, event: Event) {
        if self.is_stopped() {
            debug!(handler = %self.inner.name, event_id = %event.id, etype = %event.etype, "handler stopped, event dropped");
            event.ready();
            return;
        }
        trace!(handler = %self.inner.name, event_id = %event.id, etype = %event.etype, "event queued");
        if let Err(mpsc::error::SendError(Queued::Event(event))) = self.inner.tx.send(Queued::Event(event)) {
            event.ready();
        }
    }

    /// Launch the dispatch thread and return immediately.
    ///
    /// The queue receiver is handed to the thread only once the spawn has
    /// succeeded, so a failed start can be retried.
    pub fn start(&self) -> Result<(), HandlerError> {
        let mut slot = self.inner.rx.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            return Err(HandlerError::AlreadyStarted(self.inner.name.clone()));
        }

        let (hand_off, receive) = oneshot::channel();
        let handler = self.clone();
        let task = launch_named(format!("{}-dispatch", self.inner.name), move || {
            if let Ok(rx) = receive.blocking_recv() {
                handler.run(rx);
            }
        })?;
        if let Some(rx) = slot.take() {
            let _ = hand_off.send(rx);
        }
        drop(slot);

        *self.inner.dispatcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        info!(handler = %self.inner.name, "dispatch started");
        Ok(())
    }

    /// Whether [`Handler::start`] has launched the dispatch thread.
    pub fn is_started(&self) -> bool {
        self.inner.rx.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    /// Ask the dispatch thread to exit.  An in-flight callback finishes first.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(handler = %self.inner.name, "stop requested");
        // The receiver is gone once the loop has exited; nothing left to wake.
        let _ = self.inner.tx.send(Queued::Stop);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Wait up to `timeout` for the dispatch thread to exit.
    ///
    /// Returns `true` if it has exited (or was never started).
    pub fn join(&self, timeout: Duration) -> bool {
        let task = self.inner.dispatcher.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(task) = task else { return true };
        match task.join_timeout(timeout) {
            Ok(()) => true,
            Err(e) => {
                debug!(handler = %self.inner.name, error = %e, "dispatch thread still running");
                *self.inner.dispatcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
                false
            }
        }
    }

    /// Run the callback stage for `event` on the calling thread, then mark it
    /// ready.  Callback failures are logged and swallowed.
    pub fn dispatch(&self, event: &mut Event) {
        let callback = self
            .inner
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.etype)
            .cloned();

        if let Some(callback) = callback {
            trace!(handler = %self.inner.name, event_id = %event.id, etype = %event.etype, "dispatching");
            match report::catch_panic(|| callback(self, event)) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(
                        handler = %self.inner.name,
                        event_id = %event.id,
                        etype = %event.etype,
                        "callback failed: {}",
                        report::describe(&err)
                    );
                }
                Err(payload) => {
                    error!(
                        handler = %self.inner.name,
                        event_id = %event.id,
                        etype = %event.etype,
                        "callback failed: {}",
                        report::describe_panic(payload.as_ref())
                    );
                }
            }
        }

        event.ready();
    }

    fn run(&self, mut rx: mpsc::UnboundedReceiver<Queued>) {
        while !self.is_stopped() {
            match rx.blocking_recv() {
                Some(Queued::Event(mut event)) => self.dispatch(&mut event),
                Some(Queued::Stop) | None => break,
            }
        }

        // Anything still queued will never run; release its waiters.
        rx.close();
        while let Ok(item) = rx.try_recv() {
            if let Queued::Event(event) = item {
                event.ready();
            }
        }
        info!(handler = %self.inner.name, "dispatch stopped");
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.inner.name)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
