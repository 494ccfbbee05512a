//! Fan-out of coordinator frames to connected resolvers.
//!
//! One producer, N bounded outboxes. Sends are non-blocking by construction:
//! a full outbox skips the frame instead of stalling the broadcast, so a slow
//! subscriber can never hold back its peers.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

#[derive(Debug)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<u64, mpsc::Sender<String>>,
    closed: bool,
}

#[derive(Debug)]
pub struct Broadcaster {
    registry: Mutex<Registry>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                next_id: 0,
                subscribers: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Register an outbox and return its subscriber id.
    ///
    /// After `close()` the outbox is dropped immediately; the returned id is
    /// still unique so callers can unregister unconditionally.
    pub fn register(&self, outbox: mpsc::Sender<String>) -> u64 {
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        if !registry.closed {
            registry.subscribers.insert(id, outbox);
        }
        tracing::debug!(subscriber_id = id, "subscriber registered");
        id
    }

    /// Drop the subscriber's outbox, closing its channel.
    pub fn unregister(&self, id: u64) {
        let removed = self.lock().subscribers.remove(&id).is_some();
        if removed {
            tracing::debug!(subscriber_id = id, "subscriber unregistered");
        }
    }

    /// Enqueue `frame` into every open outbox. Returns how many subscribers
    /// actually received it; full outboxes drop the frame, closed outboxes
    /// are pruned.
    pub fn broadcast(&self, frame: &str) -> usize {
        let mut registry = self.lock();
        let mut delivered = 0;
        let mut dead = Vec::new();

        for (id, outbox) in &registry.subscribers {
            match outbox.try_send(frame.to_string()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!(subscriber_id = id, "outbox full, frame dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*id),
            }
        }
        for id in dead {
            registry.subscribers.remove(&id);
        }
        delivered
    }

    /// Close every outbox and refuse further registrations.
    pub fn close(&self) {
        let mut registry = self.lock();
        registry.closed = true;
        registry.subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}
