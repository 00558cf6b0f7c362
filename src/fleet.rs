//! Fleet: registry of live agents for broadcast and addressed delivery.
//!
//! The fleet holds weak references only: an agent that is dropped without
//! being removed simply stops being reached, and its dead entry is pruned on
//! the next write.  Membership is unique by identity (the same `Arc`), not by
//! id, so two agents may share an id; lookups return the first match.

use std::sync::{Arc, PoisonError, RwLock, Weak};

use tracing::{debug, error, trace};

use crate::core::error::FleetError;
use crate::dispatch::event::MessageKind;
use crate::runtime::report;

/// Anything the fleet can deliver text to.
pub trait Announcer: Send + Sync {
    fn id(&self) -> String;

    /// Send `text` to `channel`.
    fn say(&self, channel: &str, text: &str, kind: MessageKind);

    /// Send `text` to every channel the announcer has joined.
    fn announce(&self, text: &str);
}

type Member = Weak<dyn Announcer>;

fn same(member: &Member, agent: &Arc<dyn Announcer>) -> bool {
    std::ptr::eq(member.as_ptr() as *const (), Arc::as_ptr(agent) as *const ())
}

#[derive(Clone, Default)]
pub struct Fleet {
    members: Arc<RwLock<Vec<Member>>>,
}

impl Fleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `agent`.  Returns `false` if this very agent is already in.
    pub fn add(&self, agent: &Arc<dyn Announcer>) -> bool {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        members.retain(|m| m.strong_count() > 0);
        if members.iter().any(|m| same(m, agent)) {
            return false;
        }
        members.push(Arc::downgrade(agent));
        debug!(agent = %agent.id(), size = members.len(), "agent joined fleet");
        true
    }

    /// Unregister `agent`.  Dead entries are pruned first so a new agent
    /// reusing a freed allocation never matches one.
    pub fn remove(&self, agent: &Arc<dyn Announcer>) -> Result<(), FleetError> {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        members.retain(|m| m.strong_count() > 0);
        let position = members.iter().position(|m| same(m, agent));
        let Some(position) = position else {
            return Err(FleetError::NotRegistered(agent.id()));
        };
        members.remove(position);
        debug!(agent = %agent.id(), size = members.len(), "agent left fleet");
        Ok(())
    }

    /// First live agent whose id matches.
    pub fn get_bot(&self, id: &str) -> Option<Arc<dyn Announcer>> {
        self.live().into_iter().find(|a| a.id() == id)
    }

    /// Ask every agent to announce `text`.  A panicking agent is logged and
    /// skipped.  Returns how many agents announced successfully.
    pub fn announce(&self, text: &str) -> usize {
        let mut reached = 0;
        for agent in self.live() {
            match report::catch_panic(|| agent.announce(text)) {
                Ok(()) => reached += 1,
                Err(payload) => error!(
                    agent = %agent.id(),
                    "announce failed: {}",
                    report::describe_panic(payload.as_ref())
                ),
            }
        }
        trace!(reached, "fleet announce");
        reached
    }

    /// Deliver `text` to `channel` through the agent named `id`.
    /// Returns `false` when no such agent is registered.
    pub fn echo(&self, id: &str, channel: &str, text: &str, kind: MessageKind) -> bool {
        match self.get_bot(id) {
            Some(agent) => {
                agent.say(channel, text, kind);
                true
            }
            None => {
                trace!(agent = %id, "echo target not in fleet");
                false
            }
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.live().iter().map(|a| a.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.live().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of live members, taken so no lock is held while calling out.
    fn live(&self) -> Vec<Arc<dyn Announcer>> {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }
}

impl std::fmt::Debug for Fleet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fleet").field("ids", &self.ids()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        id: String,
        said: Mutex<Vec<(String, String, MessageKind)>>,
        announced: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn arc(id: &str) -> Arc<Recorder> {
            Arc::new(Recorder { id: id.to_string(), ..Default::default() })
        }
    }

    impl Announcer for Recorder {
        fn id(&self) -> String {
            self.id.clone()
        }

        fn say(&self, channel: &str, text: &str, kind: MessageKind) {
            self.said.lock().unwrap().push((channel.into(), text.into(), kind));
        }

        fn announce(&self, text: &str) {
            if text == "boom" && self.id == "fragile" {
                panic!("cannot announce");
            }
            self.announced.lock().unwrap().push(text.into());
        }
    }

    fn dynamic(r: &Arc<Recorder>) -> Arc<dyn Announcer> {
        r.clone()
    }

    #[test]
    fn add_is_unique_by_identity() {
        let fleet = Fleet::new();
        let a = Recorder::arc("a");
        let twin = Recorder::arc("a");
        assert!(fleet.add(&dynamic(&a)));
        assert!(!fleet.add(&dynamic(&a)));
        assert!(fleet.add(&dynamic(&twin)));
        assert_eq!(fleet.len(), 2);
        assert_eq!(fleet.ids(), vec!["a", "a"]);
    }

    #[test]
    fn remove_absent_is_an_error() {
        let fleet = Fleet::new();
        let a = Recorder::arc("a");
        assert!(matches!(fleet.remove(&dynamic(&a)), Err(FleetError::NotRegistered(id)) if id == "a"));
        fleet.add(&dynamic(&a));
        fleet.remove(&dynamic(&a)).unwrap();
        assert!(fleet.is_empty());
    }

    #[test]
    fn remove_never_matches_a_dead_entry() {
        let fleet = Fleet::new();
        let gone = Recorder::arc("gone");
        fleet.add(&dynamic(&gone));
        drop(gone);

        // Likely to land on the freed allocation.
        let newcomer = Recorder::arc("gone");
        assert!(matches!(fleet.remove(&dynamic(&newcomer)), Err(FleetError::NotRegistered(_))));
        assert!(fleet.members.read().unwrap().is_empty());
    }

    #[test]
    fn get_bot_returns_first_match() {
        let fleet = Fleet::new();
        let first = Recorder::arc("dup");
        let second = Recorder::arc("dup");
        fleet.add(&dynamic(&first));
        fleet.add(&dynamic(&second));
        let found = fleet.get_bot("dup").unwrap();
        assert!(std::ptr::eq(
            Arc::as_ptr(&found) as *const (),
            Arc::as_ptr(&first) as *const ()
        ));
        assert!(fleet.get_bot("nobody").is_none());
    }

    #[test]
    fn echo_routes_to_named_agent_only() {
        let fleet = Fleet::new();
        let a = Recorder::arc("a");
        let b = Recorder::arc("b");
        fleet.add(&dynamic(&a));
        fleet.add(&dynamic(&b));

        assert!(fleet.echo("b", "#chan", "hi", MessageKind::Notice));
        assert!(!fleet.echo("zzz", "#chan", "lost", MessageKind::Chat));
        assert!(a.said.lock().unwrap().is_empty());
        assert_eq!(
            *b.said.lock().unwrap(),
            vec![("#chan".to_string(), "hi".to_string(), MessageKind::Notice)]
        );
    }

    #[test]
    fn announce_isolates_a_panicking_agent() {
        let fleet = Fleet::new();
        let a = Recorder::arc("a");
        let fragile = Recorder::arc("fragile");
        let c = Recorder::arc("c");
        for r in [&a, &fragile, &c] {
            fleet.add(&dynamic(r));
        }

        assert_eq!(fleet.announce("boom"), 2);
        assert_eq!(*a.announced.lock().unwrap(), vec!["boom"]);
        assert_eq!(*c.announced.lock().unwrap(), vec!["boom"]);
    }

    #[test]
    fn dropped_agents_are_not_reached() {
        let fleet = Fleet::new();
        let keep = Recorder::arc("keep");
        fleet.add(&dynamic(&keep));
        {
            let gone = Recorder::arc("gone");
            fleet.add(&dynamic(&gone));
            assert_eq!(fleet.len(), 2);
        }
        assert_eq!(fleet.ids(), vec!["keep"]);
        assert!(fleet.get_bot("gone").is_none());
        assert_eq!(fleet.announce("x"), 1);
    }
}
