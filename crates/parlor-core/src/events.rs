use crate::types::SessionEvent;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

/// Receiving half handed to a subscriber.
pub type EventStream = mpsc::UnboundedReceiver<SessionEvent>;

/// Fan-out of session events to any number of subscribers.
///
/// Each subscriber gets its own unbounded queue, so a slow consumer never
/// blocks the inbound reader and never loses events. Subscribers whose
/// receiver was dropped are pruned on the next publish.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber, returning how many got it.
    pub fn publish(&self, event: &SessionEvent) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }
}
