//! Builtin command modules.

use chrono::Utc;

use crate::dispatch::event::Event;
use crate::runtime::resolver::{Module, ModuleRegistry};

use super::{Command, Commands};

pub const BASIC: &str = "cmd.basic";
pub const FLEET: &str = "cmd.fleet";

/// Registry providing `cmd.basic` and `cmd.fleet`.  Callers may provide
/// further modules on it before building [`Commands`].
pub fn builtin_registry() -> ModuleRegistry<Command> {
    let registry = ModuleRegistry::new();
    registry.provide(BASIC, || {
        Module::new(BASIC)
            .with("echo", echo as Command)
            .with("version", version as Command)
            .with("cmds", cmds as Command)
            .with("uptime", uptime as Command)
    });
    registry.provide(FLEET, || {
        Module::new(FLEET)
            .with("fleet", fleet as Command)
            .with("announce", announce as Command)
    });
    registry
}

fn echo(_: &Commands, event: &mut Event) -> anyhow::Result<()> {
    let text = event.rest().to_string();
    event.reply(text);
    Ok(())
}

fn version(_: &Commands, event: &mut Event) -> anyhow::Result<()> {
    event.reply(format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")));
    Ok(())
}

fn cmds(commands: &Commands, event: &mut Event) -> anyhow::Result<()> {
    let listed: Vec<String> = commands
        .names()
        .iter()
        .map(|name| format!("{}{name}", commands.prefix()))
        .collect();
    event.reply(listed.join(","));
    Ok(())
}

fn uptime(commands: &Commands, event: &mut Event) -> anyhow::Result<()> {
    let secs = (Utc::now() - commands.started()).num_seconds().max(0);
    event.reply(format_elapsed(secs));
    Ok(())
}

fn fleet(commands: &Commands, event: &mut Event) -> anyhow::Result<()> {
    event.reply(commands.fleet().ids().join(","));
    Ok(())
}

fn announce(commands: &Commands, event: &mut Event) -> anyhow::Result<()> {
    let text = event.rest();
    if text.is_empty() {
        anyhow::bail!("usage: announce <text>");
    }
    commands.fleet().announce(text);
    Ok(())
}

/// `3d 4h 5m 6s`, leading zero units omitted.
fn format_elapsed(secs: i64) -> String {
    let (d, h, m, s) = (secs / 86_400, secs % 86_400 / 3_600, secs % 3_600 / 60, secs % 60);
    let mut parts = Vec::new();
    if d > 0 {
        parts.push(format!("{d}d"));
    }
    if d > 0 || h > 0 {
        parts.push(format!("{h}h"));
    }
    if d > 0 || h > 0 || m > 0 {
        parts.push(format!("{m}m"));
    }
    parts.push(format!("{s}s"));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::commands::COMMAND_ETYPE;
    use crate::fleet::Fleet;

    fn commands() -> Commands {
        let modules = vec![BASIC.to_string(), FLEET.to_string()];
        Commands::new(Arc::new(builtin_registry()), &modules, Fleet::new(), "").unwrap()
    }

    fn run(commands: &Commands, txt: &str) -> Vec<String> {
        let mut event = Event::new(COMMAND_ETYPE).with_txt(txt);
        let _ = commands.run(&mut event);
        event.results().to_vec()
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(0), "0s");
        assert_eq!(format_elapsed(61), "1m 1s");
        assert_eq!(format_elapsed(3_600), "1h 0m 0s");
        assert_eq!(format_elapsed(90_061), "1d 1h 1m 1s");
    }

    #[test]
    fn basic_commands_reply() {
        let c = commands();
        assert_eq!(run(&c, "echo  hello there"), ["hello there"]);
        assert_eq!(run(&c, "version"), [format!("botd {}", env!("CARGO_PKG_VERSION"))]);
        assert_eq!(run(&c, "cmds"), ["announce,cmds,echo,fleet,uptime,version"]);
        let up = run(&c, "uptime");
        assert!(up[0].ends_with('s') && !up[0].contains('m'), "{up:?}");
    }

    #[test]
    fn cmds_lists_names_with_the_prefix() {
        let modules = vec![BASIC.to_string()];
        let c = Commands::new(Arc::new(builtin_registry()), &modules, Fleet::new(), "!").unwrap();
        assert_eq!(run(&c, "!cmds"), ["!cmds,!echo,!uptime,!version"]);
    }

    #[test]
    fn announce_needs_text() {
        let c = commands();
        let mut event = Event::new(COMMAND_ETYPE).with_txt("announce");
        assert!(c.run(&mut event).is_err());
        assert_eq!(run(&c, "fleet"), [""]);
    }
}
