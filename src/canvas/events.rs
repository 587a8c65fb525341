//! Canvas event broadcast
//!
//! A typed event channel the UI layer subscribes to at construction, replacing
//! ambient global broadcast state. The canvas emits an event when a new stroke
//! begins (used downstream to clear stale result text) and when the surface is
//! erased.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;

/// Events the canvas broadcasts to interested listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanvasEvent {
    /// A new stroke has begun (pointer down on the surface)
    StrokeBegan,
    /// The surface was reset to blank
    Cleared,
}

/// Fan-out event bus with one channel per subscriber.
///
/// Cloning the bus shares the subscriber list, so the canvas can emit while
/// the owning session hands out subscriptions.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<Vec<Sender<CanvasEvent>>>>,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; events emitted after this call arrive on the
    /// returned receiver.
    pub fn subscribe(&self) -> Receiver<CanvasEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.write().push(tx);
        rx
    }

    /// Broadcast an event to all live subscribers, pruning disconnected ones.
    pub fn emit(&self, event: CanvasEvent) {
        self.subscribers
            .write()
            .retain(|subscriber| subscriber.send(event).is_ok());
    }

    /// Number of currently registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}
