//! Events: the tagged unit of work routed by [`super::Handler`].

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::fleet::Fleet;

/// Delivery style of an outgoing line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageKind {
    #[default]
    Chat,
    Notice,
    Announce,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MessageKind::Chat => "chat",
            MessageKind::Notice => "notice",
            MessageKind::Announce => "announce",
        })
    }
}

// ── Ready ────────────────────────────────────────────────────────────────────

/// One-way "processing finished" flag shared between an event and whoever
/// waits on it.  Setting it more than once is harmless.
#[derive(Clone, Default)]
pub struct Ready {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Ready {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_ready(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until ready or until `timeout` elapses.  Returns the flag.
    ///
    /// A timeout too large to express as a deadline waits without one.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let mut done = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            while !*done {
                done = cvar.wait(done).unwrap_or_else(PoisonError::into_inner);
            }
            return true;
        };
        while !*done {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            done = cvar
                .wait_timeout(done, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *done
    }
}

impl fmt::Debug for Ready {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ready").field(&self.is_ready()).finish()
    }
}

// ── Event ────────────────────────────────────────────────────────────────────

/// A unit of work submitted to an event queue.
///
/// `etype` selects the callback.  The remaining fields describe where the
/// event came from so that replies can be routed back: `orig` is the id of
/// the agent that produced it and `channel` the conversation to answer in.
///
/// Events are not `Clone`: each one is dispatched at most once.  Keep a
/// [`Ready`] from [`Event::ready_signal`] to wait for completion after the
/// event has been handed off.
#[derive(Debug)]
pub struct Event {
    pub id: Uuid,
    pub etype: String,
    pub orig: String,
    pub channel: String,
    pub origin: String,
    pub nick: String,
    pub txt: String,
    pub args: Vec<String>,
    pub kind: MessageKind,
    result: Vec<String>,
    ready: Ready,
}

impl Event {
    pub fn new(etype: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            etype: etype.into(),
            orig: String::new(),
            channel: String::new(),
            origin: String::new(),
            nick: String::new(),
            txt: String::new(),
            args: Vec::new(),
            kind: MessageKind::default(),
            result: Vec::new(),
            ready: Ready::new(),
        }
    }

    pub fn with_orig(mut self, orig: impl Into<String>) -> Self {
        self.orig = orig.into();
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn with_nick(mut self, nick: impl Into<String>) -> Self {
        self.nick = nick.into();
        self
    }

    pub fn with_txt(mut self, txt: impl Into<String>) -> Self {
        self.set_txt(txt);
        self
    }

    /// Set `txt` and derive `args` from every word after the first.
    pub fn set_txt(&mut self, txt: impl Into<String>) {
        self.txt = txt.into();
        self.args = self.txt.split_whitespace().skip(1).map(String::from).collect();
    }

    /// First word of `txt`, if any.
    pub fn command(&self) -> Option<&str> {
        self.txt.split_whitespace().next()
    }

    /// Everything after the first word, trimmed.
    pub fn rest(&self) -> &str {
        let txt = self.txt.trim_start();
        match txt.find(char::is_whitespace) {
            Some(i) => txt[i..].trim(),
            None => "",
        }
    }

    /// Queue a reply line; delivered by [`Event::show`].
    pub fn reply(&mut self, txt: impl Into<String>) {
        self.result.push(txt.into());
    }

    pub fn results(&self) -> &[String] {
        &self.result
    }

    /// Echo every queued reply back to the originating agent's channel.
    /// Returns how many lines were delivered; a vanished agent delivers none.
    pub fn show(&self, fleet: &Fleet) -> usize {
        self.result
            .iter()
            .filter(|line| fleet.echo(&self.orig, &self.channel, line, self.kind))
            .count()
    }

    pub fn ready(&self) {
        self.ready.ready();
    }

    pub fn is_ready(&self) -> bool {
        self.ready.is_ready()
    }

    pub fn wait(&self, timeout: Duration) -> bool {
        self.ready.wait(timeout)
    }

    pub fn ready_signal(&self) -> Ready {
        self.ready.clone()
    }
}
