//! Commands end to end: transport line → agent → handler → command → reply.

mod common;

use std::sync::Arc;

use botd::agent::{Agent, StartOptions};
use botd::commands::{BASIC, Command, Commands, FLEET, builtin_registry};
use botd::dispatch::{Event, MessageKind};
use botd::fleet::Fleet;
use botd::runtime::resolver::Module;
use common::{WAIT, memory, wait_until};

fn commands(fleet: &Fleet, prefix: &str) -> Arc<Commands> {
    let modules = vec![BASIC.to_string(), FLEET.to_string()];
    Arc::new(Commands::new(Arc::new(builtin_registry()), &modules, fleet.clone(), prefix).unwrap())
}

#[test]
fn echo_round_trips_through_an_agent() {
    let fleet = Fleet::new();
    let (transport, remote) = memory();
    let agent = Agent::new("bot", transport, fleet.clone());
    commands(&fleet, "!").install(agent.handler());
    agent.connect().unwrap();
    agent.start(StartOptions::both()).unwrap();

    remote.line("#dev", "!echo hello world");
    assert!(remote.wait_said(1));
    let said = remote.said();
    assert_eq!(said[0].channel, "#dev");
    assert_eq!(said[0].text, "hello world");
    assert_eq!(said[0].kind, MessageKind::Chat);

    // Lines without the prefix are not commands.
    remote.line("#dev", "echo ignored");
    remote.line("#dev", "!version");
    assert!(remote.wait_said(2));
    assert_eq!(remote.said().len(), 2);
    assert!(remote.texts()[1].starts_with("botd "));

    agent.stop();
    assert!(agent.join(WAIT));
}

#[test]
fn announce_command_fans_out_to_the_fleet() {
    let fleet = Fleet::new();
    let (t1, r1) = memory();
    let (t2, r2) = memory();
    let speaker = Agent::new("speaker", t1, fleet.clone());
    let listener = Agent::new("listener", t2, fleet.clone());
    speaker.join_channel("#one");
    listener.join_channel("#two");
    commands(&fleet, "").install(speaker.handler());
    speaker.start(StartOptions::both()).unwrap();
    listener.start(StartOptions { input: false, output: true }).unwrap();

    r1.line("#one", "announce deploy at noon");
    assert!(r2.wait_said(1));
    assert_eq!(r2.said()[0].channel, "#two");
    assert_eq!(r2.said()[0].text, "deploy at noon");
    assert!(r1.wait_said(1));

    r1.line("#one", "fleet");
    assert!(wait_until(|| r1.texts().iter().any(|t| t == "speaker,listener")));

    speaker.stop();
    listener.stop();
    assert!(speaker.join(WAIT) && listener.join(WAIT));
}

#[test]
fn failing_and_unknown_commands_keep_the_agent_alive() {
    fn boom(_: &Commands, _: &mut Event) -> anyhow::Result<()> {
        panic!("command exploded")
    }

    let fleet = Fleet::new();
    let registry = builtin_registry();
    registry.provide("cmd.bad", || Module::new("cmd.bad").with("boom", boom as Command));
    let modules = vec!["cmd.bad".to_string(), BASIC.to_string()];
    let commands = Arc::new(Commands::new(Arc::new(registry), &modules, fleet.clone(), "").unwrap());

    let (transport, remote) = memory();
    let agent = Agent::new("bot", transport, fleet.clone());
    commands.install(agent.handler());
    agent.start(StartOptions::both()).unwrap();

    remote.line("#c", "boom");
    remote.line("#c", "nonsense words");
    remote.line("#c", "announce");
    remote.line("#c", "echo still here");
    assert!(remote.wait_said(1));
    assert_eq!(remote.texts(), vec!["still here"]);

    agent.stop();
    assert!(agent.join(WAIT));
}

#[test]
fn end_of_input_closes_only_the_input_pump() {
    let fleet = Fleet::new();
    let (transport, remote) = memory();
    let agent = Agent::new("bot", transport, fleet.clone());
    commands(&fleet, "").install(agent.handler());
    agent.start(StartOptions::both()).unwrap();

    let closed = agent.input_closed();
    remote.close();
    assert!(wait_until(|| closed.is_cancelled()));

    // Dispatch and output still work after the input side ended.
    assert!(fleet.echo("bot", "#c", "after eof", MessageKind::Notice));
    assert!(remote.wait_said(1));

    agent.stop();
    assert!(agent.join(WAIT));
}
