//! Event subscription bus
//!
//! Process-wide publish/subscribe registry. Every subscriber registers for one
//! [`Topic`] and owns a dedicated delivery channel; publishing never waits on a
//! receiver, so a consumer that stops reading only stalls its own loop.
//!
//! Unsubscription is cooperative: a transport that wants a listener gone sends
//! a directed [`Delivery::Unsubscribe`] marker, and the listener breaks out of
//! its receive loop when [`Subscription::must_unsubscribe`] recognises it.

mod types;

pub use types::{Event, LastEvent, PipelineState, PlaybackSnapshot, Topic};

use futures::Stream;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Opaque subscriber identifier handed out on subscribe
pub type SubscriberId = Uuid;

/// One item on a subscriber's channel
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Directed request for subscriber `target` to leave its receive loop
    Unsubscribe { target: SubscriberId },
    /// A published event
    Payload(Event),
}

struct Registration {
    topic: Topic,
    tx: mpsc::UnboundedSender<Delivery>,
}

type Registry = Mutex<HashMap<SubscriberId, Registration>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<SubscriberId, Registration>> {
    // Poisoned by a panicking publisher: keep going with the inner map
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Topic-based event bus
///
/// Cheap to clone; all clones share the same registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber for `topic`
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        lock(&self.registry).insert(id, Registration { topic, tx });
        debug!("Subscriber {} registered on topic {}", id, topic);

        Subscription {
            id,
            topic,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `events` to every subscriber of `topic`
    ///
    /// An empty `events` delivers a single [`Event::Empty`]. Returns the number
    /// of subscribers reached.
    pub fn broadcast(&self, topic: Topic, events: Vec<Event>) -> usize {
        let events = if events.is_empty() { vec![Event::Empty] } else { events };

        let registry = lock(&self.registry);
        let mut reached = 0;
        for registration in registry.values().filter(|r| r.topic == topic) {
            for event in &events {
                // Receiver gone: the subscriber's own loop notices, not us
                let _ = registration.tx.send(Delivery::Payload(event.clone()));
            }
            reached += 1;
        }

        debug!("Broadcast {} event(s) on {} to {} subscriber(s)", events.len(), topic, reached);
        reached
    }

    /// Broadcast a single event
    pub fn emit(&self, topic: Topic, event: Event) -> usize {
        self.broadcast(topic, vec![event])
    }

    /// Ask subscriber `id` to leave its receive loop
    ///
    /// The marker goes to that subscriber only. Returns false when `id` is not
    /// registered.
    pub fn unsubscribe_request(&self, id: SubscriberId) -> bool {
        let registry = lock(&self.registry);
        match registry.get(&id) {
            Some(registration) => {
                let _ = registration.tx.send(Delivery::Unsubscribe { target: id });
                true
            }
            None => {
                warn!("Unsubscribe requested for unknown subscriber {}", id);
                false
            }
        }
    }

    /// Number of live subscribers on `topic`
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        lock(&self.registry)
            .values()
            .filter(|r| r.topic == topic)
            .count()
    }
}

/// A live registration on the bus
///
/// Dropping the subscription removes it from the registry.
pub struct Subscription {
    id: SubscriberId,
    topic: Topic,
    rx: mpsc::UnboundedReceiver<Delivery>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Wait for the next delivery
    ///
    /// Returns `None` once the subscriber has been removed and its channel is
    /// drained.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Take a delivery if one is already queued
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }

    /// True when `delivery` is the unsubscribe marker addressed to us
    pub fn must_unsubscribe(&self, delivery: &Delivery) -> bool {
        matches!(delivery, Delivery::Unsubscribe { target } if *target == self.id)
    }

    /// Remove this subscriber from the registry
    pub fn unsubscribe(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if lock(&registry).remove(&self.id).is_some() {
                debug!("Subscriber {} removed from topic {}", self.id, self.topic);
            }
        }
    }

    /// Payload events until the unsubscribe marker arrives
    pub fn into_stream(self) -> impl Stream<Item = Event> {
        async_stream::stream! {
            let mut subscription = self;
            while let Some(delivery) = subscription.recv().await {
                if subscription.must_unsubscribe(&delivery) {
                    break;
                }
                if let Delivery::Payload(event) = delivery {
                    yield event;
                }
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
