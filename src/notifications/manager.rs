//! NotificationHub implementation
//!
//! Fan-out of node events over unbounded channels. Publishing is
//! non-blocking and safe to call while the pool mutex is held. Subscribers
//! that drop their receiver are pruned on the next publish.

use crate::notifications::event::NodeEvent;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

#[derive(Clone, Default)]
pub struct NotificationHub {
    subscribers: Arc<Mutex<HashMap<String, UnboundedSender<NodeEvent>>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. A repeated id replaces the previous
    /// subscription, with a warning.
    pub fn subscribe(&self, subscriber_id: impl Into<String>) -> UnboundedReceiver<NodeEvent> {
        let subscriber_id = subscriber_id.into();
        let (sender, receiver) = unbounded_channel();

        let mut subscribers = self.subscribers.lock().unwrap();
        if subscribers.insert(subscriber_id.clone(), sender).is_some() {
            log::warn!("Subscriber '{}' replaced an existing subscription", subscriber_id);
        }

        receiver
    }

    pub fn unsubscribe(&self, subscriber_id: &str) -> bool {
        self.subscribers.lock().unwrap().remove(subscriber_id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Deliver an event to every live subscriber, pruning closed channels.
    pub fn publish(&self, event: NodeEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|id, sender| {
            if sender.send(event.clone()).is_err() {
                log::debug!("Dropping closed subscriber '{}'", id);
                false
            } else {
                true
            }
        });
    }
}
