//! In-process transport.
//!
//! [`MemoryConnector`] hands out one end of a `tokio::io::duplex` pipe per
//! handshake and passes the other end to [`Peripherals`], which plays the
//! receiver. The handshake can be made to fail or held open until released.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::io::DuplexStream;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::transport::{BoxedLink, Connector};
use crate::types::Device;

/// Default pipe capacity in bytes.
pub const DEFAULT_PIPE_CAPACITY: usize = 4096;

/// Receiver-side ends of established links.
pub struct Peripherals {
    receiver: mpsc::UnboundedReceiver<DuplexStream>,
}

impl Peripherals {
    /// Waits for the next successful handshake and returns the receiver end.
    pub async fn accept(&mut self) -> Option<DuplexStream> {
        self.receiver.recv().await
    }
}

/// Releases a handshake held by [`MemoryConnector::hold_next`].
///
/// Dropping it without calling [`release`](Self::release) fails the handshake.
pub struct HandshakeGate {
    sender: oneshot::Sender<()>,
}

impl HandshakeGate {
    /// Lets the held handshake complete.
    pub fn release(self) {
        let _ = self.sender.send(());
    }
}

/// Connector backed by in-memory pipes.
pub struct MemoryConnector {
    capacity: usize,
    refuse: AtomicBool,
    attempts: AtomicUsize,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    peripherals: mpsc::UnboundedSender<DuplexStream>,
}

impl MemoryConnector {
    /// Creates a connector and the matching peripheral side.
    #[must_use]
    pub fn new() -> (Self, Peripherals) {
        Self::with_capacity(DEFAULT_PIPE_CAPACITY)
    }

    /// Creates a connector whose pipes buffer `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> (Self, Peripherals) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let connector = Self {
            capacity,
            refuse: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            gate: Mutex::new(None),
            peripherals: sender,
        };
        (connector, Peripherals { receiver })
    }

    /// Makes every following handshake fail (or succeed again).
    pub fn set_refusing(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Holds the next handshake until the returned gate is released.
    #[must_use]
    pub fn hold_next(&self) -> HandshakeGate {
        let (sender, receiver) = oneshot::channel();
        *self.gate.lock() = Some(receiver);
        HandshakeGate { sender }
    }

    /// Number of handshakes attempted so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for MemoryConnector {
    fn connect<'a>(&'a self, device: &'a Device, service: Uuid) -> BoxFuture<'a, Result<BoxedLink>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            tracing::debug!("memory handshake with {} (service {})", device, service);

            let gate = self.gate.lock().take();
            if let Some(gate) = gate {
                gate.await.map_err(|_| {
                    Error::Io(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "handshake gate dropped",
                    ))
                })?;
            }

            if self.refuse.load(Ordering::SeqCst) {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "handshake refused",
                )));
            }

            let (local, remote) = tokio::io::duplex(self.capacity);
            if self.peripherals.send(remote).is_err() {
                tracing::debug!("no peripheral listening, link will see end of stream");
            }
            let link: BoxedLink = Box::pin(local);
            Ok(link)
        })
    }
}
