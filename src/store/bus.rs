//! Change notifications for persisted state.
//!
//! Every successful mutation publishes one event for the store it touched.
//! Subscribers register for a single store and receive events on an
//! unbounded channel; dropped receivers are pruned on the next publish.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// The independent stores that make up reader state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreName {
    Auth,
    Bookmarks,
    Ratings,
    Unlocks,
    Credits,
    Feedback,
    Colorized,
}

impl std::fmt::Display for StoreName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StoreName::Auth => "auth",
            StoreName::Bookmarks => "bookmarks",
            StoreName::Ratings => "ratings",
            StoreName::Unlocks => "unlocks",
            StoreName::Credits => "credits",
            StoreName::Feedback => "feedback",
            StoreName::Colorized => "colorized",
        };
        f.write_str(name)
    }
}

/// A store changed under `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub store: StoreName,
    pub key: String,
}

type Subscriber = (StoreName, UnboundedSender<ChangeEvent>);

/// Publish/subscribe channel keyed by store name.
#[derive(Debug, Clone, Default)]
pub struct ChangeBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in one store.
    pub fn subscribe(&self, store: StoreName) -> UnboundedReceiver<ChangeEvent> {
        let (tx, rx) = unbounded_channel();
        self.lock().push((store, tx));
        rx
    }

    /// Delivers `event` to every live subscriber of its store.
    ///
    /// Returns the number of subscribers reached.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let mut subscribers = self.lock();
        let mut delivered = 0;
        subscribers.retain(|(store, tx)| {
            if tx.is_closed() {
                return false;
            }
            if *store == event.store && tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
            true
        });
        delivered
    }

    /// Number of registered subscribers, live or not yet pruned.
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
