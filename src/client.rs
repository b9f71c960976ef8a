//! Main [`BadElf`] client implementation.
//!
//! [`BadElf`] is a thin binding to a [`GpsService`]. It registers one
//! observer, forwards calls to the service, and fails fast with
//! [`Error::NotBound`] once the service is gone or the binding was closed.
//! Closing or dropping the binding never disconnects the receiver.

use std::sync::{Arc, Weak};

use crate::error::{Error, Result};
use crate::event::{ObserverId, Subscription};
use crate::machine::DisconnectOutcome;
use crate::protocol::Request;
use crate::service::{GpsService, SendOutcome};
use crate::types::{ConnectionState, Device};

/// Client for a Bad Elf receiver hosted by a [`GpsService`].
pub struct BadElf {
    service: Weak<GpsService>,
    observer: Option<ObserverId>,
}

impl BadElf {
    /// Binds to `service`.
    ///
    /// The returned subscription yields
    /// [`ConnectionEvent::Ready`](crate::ConnectionEvent::Ready) first, then
    /// state changes and received data. Keep draining it for as long as the
    /// facade is bound; events queue up until they are received.
    #[must_use]
    pub fn bind(service: &Arc<GpsService>) -> (Self, Subscription) {
        let subscription = service.subscribe_ready();
        tracing::debug!("bound observer {:?}", subscription.id());
        let client = Self {
            service: Arc::downgrade(service),
            observer: Some(subscription.id()),
        };
        (client, subscription)
    }

    fn service(&self) -> Result<Arc<GpsService>> {
        if self.observer.is_none() {
            return Err(Error::NotBound);
        }
        self.service.upgrade().ok_or(Error::NotBound)
    }

    /// Returns true while bound to a live service.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.service().is_ok()
    }

    /// Sets the receiver to connect to.
    pub fn set_device(&self, device: Device) -> Result<()> {
        self.service()?.set_device(device)
    }

    /// Starts connecting. Progress arrives as state changes.
    pub fn connect(&self) -> Result<()> {
        self.service()?.connect()
    }

    /// Requests a disconnect.
    pub fn disconnect(&self) -> Result<DisconnectOutcome> {
        self.service()?.disconnect()
    }

    /// Sends raw bytes to the receiver.
    pub async fn send(&self, data: &[u8]) -> Result<SendOutcome> {
        self.service()?.send(data).await
    }

    /// Sends a rate request.
    pub async fn send_request(&self, request: Request) -> Result<SendOutcome> {
        self.service()?.send_request(request).await
    }

    /// Current connection state.
    pub fn state(&self) -> Result<ConnectionState> {
        Ok(self.service()?.state())
    }

    /// Unregisters the observer and releases the binding.
    ///
    /// Safe to call more than once. An active connection keeps running.
    pub fn close(&mut self) {
        let Some(id) = self.observer.take() else {
            return;
        };
        if let Some(service) = self.service.upgrade() {
            service.unsubscribe(id);
        }
        self.service = Weak::new();
        tracing::debug!("closed binding {:?}", id);
    }
}

impl Drop for BadElf {
    fn drop(&mut self) {
        self.close();
    }
}
