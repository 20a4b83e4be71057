//! Authoritative contact list.

use crate::events::EventBus;
use crate::types::SessionEvent;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Ordered, duplicate-free list of contact nicks.
///
/// Mutations publish their notification while the lock is still held, so
/// subscribers observe changes in exactly the order they were applied.
#[derive(Debug)]
pub struct Roster {
    contacts: Mutex<Vec<String>>,
    bus: Arc<EventBus>,
}

impl Roster {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            contacts: Mutex::new(Vec::new()),
            bus,
        }
    }

    fn contacts(&self) -> MutexGuard<'_, Vec<String>> {
        self.contacts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically discard the current list and install `nicks`.
    ///
    /// Empty nicks are dropped and later duplicates lose to the first
    /// occurrence. Always publishes [`SessionEvent::RosterReplaced`].
    pub fn replace_all<I>(&self, nicks: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        let next: Vec<String> = nicks
            .into_iter()
            .filter(|nick| !nick.is_empty() && seen.insert(nick.clone()))
            .collect();

        let mut contacts = self.contacts();
        debug!(previous = contacts.len(), next = next.len(), "replacing roster");
        contacts.clone_from(&next);
        self.bus.publish(&SessionEvent::RosterReplaced { nicks: next });
        drop(contacts);
    }

    /// Append `nick` unless it is empty or already present.
    ///
    /// Returns whether it was added; only an addition publishes
    /// [`SessionEvent::ContactAdded`].
    pub fn add_if_absent(&self, nick: &str) -> bool {
        if nick.is_empty() {
            return false;
        }

        let mut contacts = self.contacts();
        if contacts.iter().any(|existing| existing == nick) {
            return false;
        }
        contacts.push(nick.to_owned());
        debug!(nick, total = contacts.len(), "contact added");
        self.bus.publish(&SessionEvent::ContactAdded {
            nick: nick.to_owned(),
        });
        drop(contacts);
        true
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.contacts().clone()
    }

    pub fn contains(&self, nick: &str) -> bool {
        self.contacts().iter().any(|existing| existing == nick)
    }

    pub fn len(&self) -> usize {
        self.contacts().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts().is_empty()
    }
}
