//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use botd::agent::{Poll, Transport};
use botd::dispatch::{Event, MessageKind};

pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Said {
    pub channel: String,
    pub text: String,
    pub kind: MessageKind,
}

/// In-memory transport: events are pushed through a [`Remote`], everything
/// the agent says is recorded.
pub struct Memory {
    input: Mutex<mpsc::UnboundedReceiver<Event>>,
    said: Arc<Mutex<Vec<Said>>>,
}

#[derive(Clone)]
pub struct Remote {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<Event>>>>,
    said: Arc<Mutex<Vec<Said>>>,
}

pub fn memory() -> (Memory, Remote) {
    let (tx, rx) = mpsc::unbounded_channel();
    let said = Arc::new(Mutex::new(Vec::new()));
    (
        Memory { input: Mutex::new(rx), said: said.clone() },
        Remote { tx: Arc::new(Mutex::new(Some(tx))), said },
    )
}

impl Transport for Memory {
    fn connect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn poll(&self) -> anyhow::Result<Poll> {
        Ok(match self.input.lock().unwrap().blocking_recv() {
            Some(event) => Poll::Event(event),
            None => Poll::EndOfStream,
        })
    }

    fn say(&self, channel: &str, text: &str, kind: MessageKind) -> anyhow::Result<()> {
        self.said.lock().unwrap().push(Said {
            channel: channel.to_string(),
            text: text.to_string(),
            kind,
        });
        Ok(())
    }
}

impl Remote {
    pub fn send(&self, event: Event) {
        let tx = self.tx.lock().unwrap();
        tx.as_ref().expect("remote closed").send(event).unwrap();
    }

    /// End of input for the agent's next `poll`.
    pub fn close(&self) {
        self.tx.lock().unwrap().take();
    }

    /// Send a `command` line on `channel`.
    pub fn line(&self, channel: &str, txt: &str) {
        self.send(Event::new("command").with_channel(channel).with_nick("tester").with_txt(txt));
    }

    pub fn said(&self) -> Vec<Said> {
        self.said.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.said().into_iter().map(|s| s.text).collect()
    }

    /// Wait until at least `n` lines were said.
    pub fn wait_said(&self, n: usize) -> bool {
        wait_until(|| self.said.lock().unwrap().len() >= n)
    }
}

pub fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}
