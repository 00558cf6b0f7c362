//! Commands: text commands looked up by name and run on `command` events.
//!
//! Command functions live in modules of a [`ModuleRegistry`].  At
//! construction the configured modules are loaded and enumerated into a
//! name → qualified-name table; each invocation then resolves the qualified
//! name through the registry, so unloading and re-providing a module takes
//! effect without rebuilding the table.

mod builtin;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::core::error::NameResolutionError;
use crate::dispatch::event::Event;
use crate::dispatch::handler::Handler;
use crate::fleet::Fleet;
use crate::runtime::resolver::ModuleRegistry;

pub use builtin::{BASIC, FLEET, builtin_registry};

/// Event type the command callback is registered under.
pub const COMMAND_ETYPE: &str = "command";

pub type Command = fn(&Commands, &mut Event) -> anyhow::Result<()>;

pub struct Commands {
    registry: Arc<ModuleRegistry<Command>>,
    /// command name → qualified symbol name.
    table: BTreeMap<String, String>,
    fleet: Fleet,
    prefix: String,
    /// Origins allowed to run commands; empty allows everyone.
    allowed: BTreeSet<String>,
    started: DateTime<Utc>,
}

impl Commands {
    /// Load `modules` and index their commands.  When two modules export the
    /// same name the module listed first keeps it.
    pub fn new(
        registry: Arc<ModuleRegistry<Command>>,
        modules: &[String],
        fleet: Fleet,
        prefix: impl Into<String>,
    ) -> Result<Self, NameResolutionError> {
        let mut table = BTreeMap::new();
        for module in modules {
            for symbol in registry.symbols(module)? {
                if let Some(existing) = table.get(symbol.name()) {
                    warn!(command = %symbol.name(), kept = %existing, "duplicate command ignored");
                    continue;
                }
                table.insert(symbol.name().to_string(), symbol.qualified_name());
            }
        }
        debug!(commands = table.len(), "command table built");

        Ok(Self {
            registry,
            table,
            fleet,
            prefix: prefix.into(),
            allowed: BTreeSet::new(),
            started: Utc::now(),
        })
    }

    /// Restrict commands to events whose `origin` is listed.  An empty list
    /// lifts the restriction.
    pub fn with_allowed<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = origins.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allowed.is_empty() || self.allowed.contains(origin)
    }

    /// Register the `command` callback on `handler`.
    pub fn install(self: &Arc<Self>, handler: &Handler) {
        let commands = self.clone();
        handler.register(COMMAND_ETYPE, move |_, event| commands.run(event));
    }

    /// Run the command named by the first word of `event.txt`.
    ///
    /// Text without the prefix, unknown names and origins outside the
    /// allow-list are ignored.  Replies are echoed back to the originating
    /// agent even when the command fails.
    pub fn run(&self, event: &mut Event) -> anyhow::Result<()> {
        let Some(line) = event.txt.trim_start().strip_prefix(self.prefix.as_str()) else {
            return Ok(());
        };
        if !self.is_allowed(&event.origin) {
            debug!(origin = %event.origin, event_id = %event.id, "origin not allowed to run commands");
            return Ok(());
        }
        let line = line.to_string();
        event.set_txt(line);

        let Some(name) = event.command().map(str::to_string) else {
            return Ok(());
        };
        let Some(qualified) = self.table.get(&name) else {
            debug!(command = %name, event_id = %event.id, "unknown command");
            return Ok(());
        };

        let command = match self.registry.resolve(qualified) {
            Ok(symbol) => symbol.into_value(),
            Err(e) => {
                debug!(command = %name, error = %e, "command no longer resolvable");
                return Ok(());
            }
        };

        let result = command(self, event);
        event.show(&self.fleet);
        result
    }

    /// Known command names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.table.keys().map(String::as_str).collect()
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }
}
