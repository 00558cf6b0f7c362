//! Console transport: reads lines from stdin as `command` events and writes
//! replies to stdout.
//!
//! Blank lines are skipped.  End of input ends the agent's input pump, which
//! the daemon treats as a request to shut down.

use std::io::{self, BufRead, BufReader, Write};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

use crate::agent::{Poll, Transport};
use crate::commands::COMMAND_ETYPE;
use crate::dispatch::event::{Event, MessageKind};

/// Nick stamped on every console line.
pub const CONSOLE_NICK: &str = "console";

pub struct Console<R, W> {
    channel: String,
    reader: Mutex<R>,
    writer: Mutex<W>,
}

impl Console<BufReader<io::Stdin>, io::Stdout> {
    pub fn stdio(channel: impl Into<String>) -> Self {
        Self::new(channel, BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R, W> Console<R, W>
where
    R: BufRead + Send + 'static,
    W: Write + Send + 'static,
{
    pub fn new(channel: impl Into<String>, reader: R, writer: W) -> Self {
        Self {
            channel: channel.into(),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl<R, W> Transport for Console<R, W>
where
    R: BufRead + Send + 'static,
    W: Write + Send + 'static,
{
    fn connect(&self) -> anyhow::Result<()> {
        info!(channel = %self.channel, "console ready; type a command, Ctrl-D to quit");
        Ok(())
    }

    fn poll(&self) -> anyhow::Result<Poll> {
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Ok(Poll::EndOfStream);
            }
            let txt = line.trim();
            if txt.is_empty() {
                continue;
            }
            debug!(channel = %self.channel, input = %txt, "console line");
            return Ok(Poll::Event(
                Event::new(COMMAND_ETYPE)
                    .with_channel(self.channel.clone())
                    .with_nick(CONSOLE_NICK)
                    .with_origin(format!("{CONSOLE_NICK}@localhost"))
                    .with_txt(txt),
            ));
        }
    }

    fn say(&self, channel: &str, text: &str, kind: MessageKind) -> anyhow::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        match kind {
            MessageKind::Chat => writeln!(writer, "{text}")?,
            MessageKind::Notice | MessageKind::Announce => writeln!(writer, "[{kind} {channel}] {text}")?,
        }
        writer.flush()?;
        Ok(())
    }
}
