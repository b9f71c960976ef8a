//! Connection state machine.
//!
//! The machine owns the authoritative [`ConnectionState`], the bound
//! [`Device`] and the session of the single authorized worker, including the
//! worker's task handle. All of that sits behind one lock. Events wait in a
//! separate outbox: transitions push theirs while still holding the state
//! lock, read data is pushed without touching it. The outbox is drained to
//! the observers by one drainer at a time with no other lock held, so
//! observers see transitions in the order they happened.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::WriteHalf;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::event::{ConnectionEvent, ObserverRegistry};
use crate::transport::BoxedLink;
use crate::types::{ConnectionState, Device};

/// Shared write half of the live link.
pub type LinkWriter = Arc<tokio::sync::Mutex<WriteHalf<BoxedLink>>>;

/// Result of a disconnect request that was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// Teardown was started by this call.
    Requested,
    /// Teardown was already in progress; nothing changed.
    AlreadyDisconnecting,
}

/// Authorization for exactly one connection worker.
///
/// Handed out by [`StateMachine::begin_connect`] and given back through
/// [`StateMachine::finish_disconnect`].
#[derive(Debug)]
pub struct ConnectTicket {
    generation: u64,
    device: Device,
    cancel: watch::Receiver<bool>,
}

impl ConnectTicket {
    /// The device this attempt connects to.
    #[must_use]
    pub const fn device(&self) -> &Device {
        &self.device
    }

    /// Returns true once a disconnect has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once a disconnect has been requested.
    pub async fn cancelled(&self) {
        let mut cancel = self.cancel.clone();
        // an error means the session is gone, which is a cancellation too
        let _ = cancel.wait_for(|cancelled| *cancelled).await;
    }
}

/// Write access handed to senders while connected.
pub(crate) struct SendHandle {
    pub(crate) writer: LinkWriter,
    pub(crate) cancel: watch::Receiver<bool>,
}

struct Session {
    generation: u64,
    cancel: watch::Sender<bool>,
    writer: Option<LinkWriter>,
    worker: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Inner {
    state: ConnectionState,
    device: Option<Device>,
    session: Option<Session>,
    next_generation: u64,
}

impl Inner {
    fn owns(&self, ticket: &ConnectTicket) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.generation == ticket.generation)
    }
}

/// Authoritative connection state.
pub struct StateMachine {
    inner: Mutex<Inner>,
    outbox: Mutex<VecDeque<ConnectionEvent>>,
    delivery: Mutex<()>,
    registry: Arc<ObserverRegistry>,
    announced: watch::Sender<ConnectionState>,
}

impl StateMachine {
    /// Creates an idle machine that reports to `registry`.
    #[must_use]
    pub fn new(registry: Arc<ObserverRegistry>) -> Self {
        let (announced, _) = watch::channel(ConnectionState::Idle);
        Self {
            inner: Mutex::new(Inner::default()),
            outbox: Mutex::new(VecDeque::new()),
            delivery: Mutex::new(()),
            registry,
            announced,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// The bound device, if any.
    #[must_use]
    pub fn device(&self) -> Option<Device> {
        self.inner.lock().device.clone()
    }

    /// Binds the device to connect to.
    ///
    /// Rebinding the same device is a no-op in any state. A different device
    /// can only be bound while idle.
    pub fn bind_device(&self, device: Device) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.device.as_ref() == Some(&device) {
            return Ok(());
        }
        if inner.state != ConnectionState::Idle {
            return Err(Error::AlreadyConnected);
        }
        tracing::debug!("device set to {}", device);
        inner.device = Some(device);
        Ok(())
    }

    /// Starts a connection attempt.
    ///
    /// Moves `Idle -> Connecting` and returns the ticket for the one worker
    /// allowed to run it.
    pub fn begin_connect(&self) -> Result<ConnectTicket> {
        let ticket = self.open_session(&mut self.inner.lock())?;
        self.publish();
        Ok(ticket)
    }

    /// Starts a connection attempt and hands its ticket to `spawn`.
    ///
    /// The returned task handle is stored in the session before the state
    /// lock is released, so [`take_worker`](Self::take_worker) can never miss
    /// a worker that owns the slot.
    pub(crate) fn launch<F>(&self, spawn: F) -> Result<()>
    where
        F: FnOnce(ConnectTicket) -> JoinHandle<()>,
    {
        {
            let mut inner = self.inner.lock();
            let ticket = self.open_session(&mut inner)?;
            let handle = spawn(ticket);
            if let Some(session) = inner.session.as_mut() {
                session.worker = Some(handle);
            }
        }
        self.publish();
        Ok(())
    }

    fn open_session(&self, inner: &mut Inner) -> Result<ConnectTicket> {
        let device = inner.device.clone().ok_or(Error::NoDevice)?;
        if inner.state != ConnectionState::Idle || inner.session.is_some() {
            return Err(Error::AlreadyConnected);
        }

        let generation = inner.next_generation;
        inner.next_generation += 1;
        let (cancel, cancel_rx) = watch::channel(false);
        inner.session = Some(Session {
            generation,
            cancel,
            writer: None,
            worker: None,
        });
        self.transition(inner, ConnectionState::Connecting);

        Ok(ConnectTicket {
            generation,
            device,
            cancel: cancel_rx,
        })
    }

    /// Takes the task handle of the worker that owns the current session.
    pub(crate) fn take_worker(&self) -> Option<JoinHandle<()>> {
        self.inner
            .lock()
            .session
            .as_mut()
            .and_then(|s| s.worker.take())
    }

    /// Reports a completed handshake.
    ///
    /// Returns false if the attempt was cancelled in the meantime; the caller
    /// must then close the link without announcing anything.
    pub fn confirm_connected(&self, ticket: &ConnectTicket, writer: LinkWriter) -> bool {
        {
            let mut inner = self.inner.lock();
            if !inner.owns(ticket) || inner.state != ConnectionState::Connecting {
                return false;
            }
            if let Some(session) = inner.session.as_mut() {
                session.writer = Some(writer);
            }
            self.transition(&mut inner, ConnectionState::Connected);
        }
        self.publish();
        true
    }

    /// Requests teardown of the current attempt.
    ///
    /// Signals the worker to stop and returns immediately; the final `Idle`
    /// arrives asynchronously once the worker has cleaned up.
    pub fn begin_disconnect(&self) -> Result<DisconnectOutcome> {
        {
            let mut inner = self.inner.lock();
            match inner.state {
                ConnectionState::Idle => return Err(Error::NotConnected),
                ConnectionState::Disconnecting => {
                    return Ok(DisconnectOutcome::AlreadyDisconnecting);
                }
                ConnectionState::Connecting | ConnectionState::Connected => {}
            }
            if let Some(session) = inner.session.as_ref() {
                session.cancel.send_replace(true);
            }
            self.transition(&mut inner, ConnectionState::Disconnecting);
        }
        self.publish();
        Ok(DisconnectOutcome::Requested)
    }

    /// Reports that an established link failed on its own.
    ///
    /// Moves `Connected -> Disconnecting`; any other state is left alone so a
    /// failed handshake goes straight back to `Idle`.
    pub fn connection_lost(&self, ticket: &ConnectTicket) {
        {
            let mut inner = self.inner.lock();
            if !inner.owns(ticket) || inner.state != ConnectionState::Connected {
                return;
            }
            if let Some(session) = inner.session.as_ref() {
                session.cancel.send_replace(true);
            }
            self.transition(&mut inner, ConnectionState::Disconnecting);
        }
        self.publish();
    }

    /// Ends the attempt authorized by `ticket`.
    ///
    /// Always lands in `Idle`, drops the link writer and frees the slot for
    /// the next [`begin_connect`](Self::begin_connect).
    pub fn finish_disconnect(&self, ticket: ConnectTicket) {
        {
            let mut inner = self.inner.lock();
            if !inner.owns(&ticket) {
                tracing::warn!("ignoring stale ticket {}", ticket.generation);
                return;
            }
            if inner.state == ConnectionState::Connecting {
                tracing::info!("failed to connect to {}", ticket.device);
            }
            inner.session = None;
            self.transition(&mut inner, ConnectionState::Idle);
        }
        self.publish();
    }

    /// Broadcasts bytes read from the link.
    pub fn publish_data(&self, data: Bytes) {
        self.outbox
            .lock()
            .push_back(ConnectionEvent::DataReceived(data));
        self.publish();
    }

    /// Write access to the link, only while connected.
    pub(crate) fn send_handle(&self) -> Result<SendHandle> {
        let inner = self.inner.lock();
        if inner.state != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        inner
            .session
            .as_ref()
            .and_then(|s| {
                s.writer.as_ref().map(|writer| SendHandle {
                    writer: Arc::clone(writer),
                    cancel: s.cancel.subscribe(),
                })
            })
            .ok_or(Error::NotConnected)
    }

    /// Watches the last state delivered to observers.
    #[must_use]
    pub fn announced(&self) -> watch::Receiver<ConnectionState> {
        self.announced.subscribe()
    }

    /// Records a transition. Must be called with the state lock held.
    fn transition(&self, inner: &mut Inner, state: ConnectionState) {
        tracing::info!("state {} -> {}", inner.state, state);
        inner.state = state;
        self.outbox
            .lock()
            .push_back(ConnectionEvent::StateChanged(state));
    }

    /// Drains the outbox to the observers.
    fn publish(&self) {
        let _turn = self.delivery.lock();
        loop {
            let next = self.outbox.lock().pop_front();
            match next {
                None => break,
                Some(ConnectionEvent::StateChanged(state)) => {
                    self.announced.send_replace(state);
                    self.registry.broadcast_state_changed(state);
                }
                Some(ConnectionEvent::DataReceived(data)) => {
                    self.registry.broadcast_data_received(data);
                }
                Some(event @ ConnectionEvent::Ready) => self.registry.broadcast(&event),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Subscription;

    fn machine() -> (StateMachine, Subscription) {
        let registry = Arc::new(ObserverRegistry::new());
        let sub = registry.register();
        (StateMachine::new(registry), sub)
    }

    fn states(sub: &mut Subscription) -> Vec<ConnectionState> {
        std::iter::from_fn(|| sub.try_recv())
            .filter_map(|e| e.state())
            .collect()
    }

    fn writer() -> LinkWriter {
        let (local, _remote) = tokio::io::duplex(64);
        let link: BoxedLink = Box::pin(local);
        let (_reader, writer) = tokio::io::split(link);
        Arc::new(tokio::sync::Mutex::new(writer))
    }

    #[test]
    fn test_connect_without_device() {
        let (machine, mut sub) = machine();
        assert!(matches!(machine.begin_connect(), Err(Error::NoDevice)));
        assert_eq!(machine.state(), ConnectionState::Idle);
        assert!(states(&mut sub).is_empty());
    }

    #[test]
    fn test_full_cycle() {
        let (machine, mut sub) = machine();
        machine.bind_device(Device::new("a")).unwrap();

        let ticket = machine.begin_connect().unwrap();
        assert!(machine.confirm_connected(&ticket, writer()));
        assert!(machine.send_handle().is_ok());
        assert_eq!(
            machine.begin_disconnect().unwrap(),
            DisconnectOutcome::Requested
        );
        assert!(ticket.is_cancelled());
        machine.finish_disconnect(ticket);

        assert_eq!(
            states(&mut sub),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Disconnecting,
                ConnectionState::Idle,
            ]
        );
        assert!(machine.send_handle().is_err());
    }

    #[test]
    fn test_second_connect_fails() {
        let (machine, _sub) = machine();
        machine.bind_device(Device::new("a")).unwrap();
        let _ticket = machine.begin_connect().unwrap();
        assert!(matches!(
            machine.begin_connect(),
            Err(Error::AlreadyConnected)
        ));
    }

    #[test]
    fn test_connect_again_after_finish() {
        let (machine, _sub) = machine();
        machine.bind_device(Device::new("a")).unwrap();
        let ticket = machine.begin_connect().unwrap();
        machine.finish_disconnect(ticket);
        assert!(machine.begin_connect().is_ok());
    }

    #[test]
    fn test_rebind_rules() {
        let (machine, _sub) = machine();
        machine.bind_device(Device::new("a")).unwrap();
        let _ticket = machine.begin_connect().unwrap();

        assert!(machine.bind_device(Device::new("a")).is_ok());
        assert!(matches!(
            machine.bind_device(Device::new("b")),
            Err(Error::AlreadyConnected)
        ));
        assert_eq!(machine.device(), Some(Device::new("a")));
    }

    #[test]
    fn test_disconnect_while_idle() {
        let (machine, _sub) = machine();
        assert!(matches!(
            machine.begin_disconnect(),
            Err(Error::NotConnected)
        ));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let (machine, mut sub) = machine();
        machine.bind_device(Device::new("a")).unwrap();
        let ticket = machine.begin_connect().unwrap();
        assert!(machine.confirm_connected(&ticket, writer()));

        assert_eq!(
            machine.begin_disconnect().unwrap(),
            DisconnectOutcome::Requested
        );
        assert_eq!(
            machine.begin_disconnect().unwrap(),
            DisconnectOutcome::AlreadyDisconnecting
        );
        machine.finish_disconnect(ticket);

        let seen = states(&mut sub);
        assert_eq!(
            seen.iter()
                .filter(|s| **s == ConnectionState::Disconnecting)
                .count(),
            1
        );
        assert_eq!(
            seen.iter().filter(|s| **s == ConnectionState::Idle).count(),
            1
        );
    }

    #[test]
    fn test_confirm_after_disconnect_race() {
        let (machine, mut sub) = machine();
        machine.bind_device(Device::new("a")).unwrap();
        let ticket = machine.begin_connect().unwrap();

        machine.begin_disconnect().unwrap();
        assert!(!machine.confirm_connected(&ticket, writer()));
        machine.finish_disconnect(ticket);

        let seen = states(&mut sub);
        assert!(!seen.contains(&ConnectionState::Connected));
        assert_eq!(seen.last(), Some(&ConnectionState::Idle));
        assert_eq!(machine.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_failed_handshake_skips_disconnecting() {
        let (machine, mut sub) = machine();
        machine.bind_device(Device::new("a")).unwrap();
        let ticket = machine.begin_connect().unwrap();

        machine.connection_lost(&ticket);
        machine.finish_disconnect(ticket);

        assert_eq!(
            states(&mut sub),
            vec![ConnectionState::Connecting, ConnectionState::Idle]
        );
    }

    #[test]
    fn test_connection_lost_while_connected() {
        let (machine, mut sub) = machine();
        machine.bind_device(Device::new("a")).unwrap();
        let ticket = machine.begin_connect().unwrap();
        assert!(machine.confirm_connected(&ticket, writer()));

        machine.connection_lost(&ticket);
        assert!(ticket.is_cancelled());
        machine.finish_disconnect(ticket);

        assert_eq!(
            states(&mut sub),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Disconnecting,
                ConnectionState::Idle,
            ]
        );
    }

    #[test]
    fn test_data_is_ordered_with_states() {
        let (machine, mut sub) = machine();
        machine.bind_device(Device::new("a")).unwrap();
        let ticket = machine.begin_connect().unwrap();
        assert!(machine.confirm_connected(&ticket, writer()));
        machine.publish_data(Bytes::from_static(b"$GPGSV"));

        let events: Vec<_> = std::iter::from_fn(|| sub.try_recv()).collect();
        assert_eq!(
            events,
            vec![
                ConnectionEvent::StateChanged(ConnectionState::Connecting),
                ConnectionEvent::StateChanged(ConnectionState::Connected),
                ConnectionEvent::DataReceived(Bytes::from_static(b"$GPGSV")),
            ]
        );
    }

    #[tokio::test]
    async fn test_launch_records_worker() {
        let (machine, mut sub) = machine();
        machine.bind_device(Device::new("a")).unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel();
        machine
            .launch(|ticket| {
                tokio::spawn(async move {
                    let _ = tx.send(ticket);
                })
            })
            .unwrap();
        assert!(matches!(
            machine.launch(|_| unreachable!()),
            Err(Error::AlreadyConnected)
        ));

        let worker = machine.take_worker().expect("worker recorded");
        assert!(machine.take_worker().is_none());
        worker.await.unwrap();

        machine.finish_disconnect(rx.await.unwrap());
        assert!(machine.take_worker().is_none());
        assert_eq!(
            states(&mut sub),
            vec![ConnectionState::Connecting, ConnectionState::Idle]
        );
    }

    #[test]
    fn test_data_does_not_need_state_lock() {
        let (machine, mut sub) = machine();
        let guard = machine.inner.lock();
        machine.publish_data(Bytes::from_static(b"$GPGLL"));
        drop(guard);

        assert_eq!(
            sub.try_recv(),
            Some(ConnectionEvent::DataReceived(Bytes::from_static(b"$GPGLL")))
        );
    }

    #[tokio::test]
    async fn test_announced_tracks_delivery() {
        let (machine, _sub) = machine();
        let announced = machine.announced();
        machine.bind_device(Device::new("a")).unwrap();
        let ticket = machine.begin_connect().unwrap();
        assert_eq!(*announced.borrow(), ConnectionState::Connecting);
        machine.finish_disconnect(ticket);
        assert_eq!(*announced.borrow(), ConnectionState::Idle);
    }

    #[test]
    fn test_concurrent_disconnects_single_transition() {
        let (machine, mut sub) = machine();
        let machine = Arc::new(machine);
        machine.bind_device(Device::new("a")).unwrap();
        let ticket = machine.begin_connect().unwrap();
        assert!(machine.confirm_connected(&ticket, writer()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let machine = Arc::clone(&machine);
                std::thread::spawn(move || machine.begin_disconnect().unwrap())
            })
            .collect();
        let requested = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| *o == DisconnectOutcome::Requested)
            .count();
        assert_eq!(requested, 1);

        machine.finish_disconnect(ticket);
        assert_eq!(
            states(&mut sub),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Disconnecting,
                ConnectionState::Idle,
            ]
        );
    }
}
