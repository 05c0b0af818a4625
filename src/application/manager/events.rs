//! Typed event bus with explicit subscription handles

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use super::{read_lock, write_lock};
use crate::domain::entities::{EventKind, ManagerEvent};

pub type EventHandler = Arc<dyn Fn(&ManagerEvent) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`]; pass it back to unsubscribe
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: Uuid,
    kind: Option<EventKind>,
}

impl Subscription {
    pub fn kind(&self) -> Option<EventKind> {
        self.kind
    }
}

/// Per-kind subscriber lists. `None` holds catch-all subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<Option<EventKind>, Vec<(Uuid, EventHandler)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a single kind of event
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&ManagerEvent) + Send + Sync + 'static,
    {
        self.add(Some(kind), Arc::new(handler))
    }

    /// Subscribe to every event
    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ManagerEvent) + Send + Sync + 'static,
    {
        self.add(None, Arc::new(handler))
    }

    fn add(&self, kind: Option<EventKind>, handler: EventHandler) -> Subscription {
        let id = Uuid::new_v4();
        write_lock(&self.subscribers)
            .entry(kind)
            .or_default()
            .push((id, handler));
        Subscription { id, kind }
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut subscribers = write_lock(&self.subscribers);
        let Some(list) = subscribers.get_mut(&subscription.kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != subscription.id);
        before != list.len()
    }

    /// Deliver an event to kind subscribers, then catch-all subscribers.
    /// Returns the number of handlers invoked.
    pub fn emit(&self, event: &ManagerEvent) -> usize {
        // Handlers run outside the lock so they may (un)subscribe
        let handlers: Vec<EventHandler> = {
            let subscribers = read_lock(&self.subscribers);
            let specific = subscribers.get(&Some(event.kind())).into_iter().flatten();
            let catch_all = subscribers.get(&None).into_iter().flatten();
            specific.chain(catch_all).map(|(_, h)| h.clone()).collect()
        };

        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    /// Publish a namespaced custom event
    pub fn publish(&self, name: impl Into<String>, data: Value, namespace: impl Into<String>) -> usize {
        self.emit(&ManagerEvent::Published {
            namespace: namespace.into(),
            name: name.into(),
            data,
        })
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        read_lock(&self.subscribers)
            .get(&Some(kind))
            .map(|list| list.len())
            .unwrap_or(0)
    }
}
