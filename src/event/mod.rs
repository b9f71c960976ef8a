//! Event system for connection notifications.
//!
//! Every observer gets its own unbounded, ordered channel. Broadcasting walks
//! a snapshot of the registered observers, so observers can come and go while
//! a broadcast is in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::types::ConnectionState;

/// Notifications delivered to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The facade is bound and can be driven. Always the first event a
    /// facade's subscription sees.
    Ready,
    /// The connection state changed.
    StateChanged(ConnectionState),
    /// Raw bytes read from the receiver.
    DataReceived(Bytes),
}

impl ConnectionEvent {
    /// Returns the new state for `StateChanged` events.
    #[must_use]
    pub const fn state(&self) -> Option<ConnectionState> {
        match self {
            Self::StateChanged(state) => Some(*state),
            Self::Ready | Self::DataReceived(_) => None,
        }
    }
}

/// Identifies one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct Observer {
    id: ObserverId,
    active: Arc<AtomicBool>,
    sender: mpsc::UnboundedSender<ConnectionEvent>,
}

/// A registered observer's receiving end.
///
/// The channel is unbounded so that no state change or data chunk is ever
/// lost. Holders must keep draining it, or drop it (or unregister) once they
/// stop listening: an undrained subscription grows at the receiver's output
/// rate. [`pending`](Self::pending) reports the current backlog.
pub struct Subscription {
    id: ObserverId,
    active: Arc<AtomicBool>,
    receiver: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl Subscription {
    /// The registration this subscription belongs to.
    #[must_use]
    pub const fn id(&self) -> ObserverId {
        self.id
    }

    /// Number of events queued and not yet received.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Receives the next event.
    ///
    /// Returns `None` once the observer has been unregistered, including for
    /// events that were queued before the removal completed.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        let event = self.receiver.recv().await?;
        self.active.load(Ordering::Acquire).then_some(event)
    }

    /// Receives an event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ConnectionEvent> {
        let event = self.receiver.try_recv().ok()?;
        self.active.load(Ordering::Acquire).then_some(event)
    }
}

/// Multi-subscriber registry for connection events.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: RwLock<Vec<Arc<Observer>>>,
    next_id: AtomicU64,
}

impl ObserverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new observer.
    #[must_use]
    pub fn register(&self) -> Subscription {
        self.register_inner(None)
    }

    /// Registers a new observer whose first event is `first`.
    ///
    /// `first` is queued before the observer becomes visible to broadcasts,
    /// so nothing can overtake it.
    #[must_use]
    pub fn register_with(&self, first: ConnectionEvent) -> Subscription {
        self.register_inner(Some(first))
    }

    fn register_inner(&self, first: Option<ConnectionEvent>) -> Subscription {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::unbounded_channel();
        let active = Arc::new(AtomicBool::new(true));

        if let Some(event) = first {
            // the receiver is alive right here
            let _ = sender.send(event);
        }

        self.observers.write().push(Arc::new(Observer {
            id,
            active: Arc::clone(&active),
            sender,
        }));
        tracing::debug!("registered observer {:?}", id);

        Subscription {
            id,
            active,
            receiver,
        }
    }

    /// Removes an observer. Returns false if it was not registered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let Some(pos) = observers.iter().position(|o| o.id == id) else {
            return false;
        };
        let observer = observers.remove(pos);
        observer.active.store(false, Ordering::Release);
        tracing::debug!("unregistered observer {:?}", id);
        true
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Returns true if no observer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Broadcasts a state change.
    pub fn broadcast_state_changed(&self, state: ConnectionState) {
        self.broadcast(&ConnectionEvent::StateChanged(state));
    }

    /// Broadcasts received data.
    pub fn broadcast_data_received(&self, data: Bytes) {
        self.broadcast(&ConnectionEvent::DataReceived(data));
    }

    /// Delivers an event to every registered observer.
    ///
    /// An observer whose receiver is gone is logged and dropped; delivery to
    /// the rest continues.
    pub fn broadcast(&self, event: &ConnectionEvent) {
        let snapshot = self.observers.read().clone();
        let mut dead = Vec::new();

        for observer in &snapshot {
            if !observer.active.load(Ordering::Acquire) {
                continue;
            }
            if observer.sender.send(event.clone()).is_err() {
                tracing::warn!("observer {:?} stopped listening, dropping it", observer.id);
                dead.push(observer.id);
            }
        }

        for id in dead {
            self.unregister(id);
        }
    }
}
