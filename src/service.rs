//! Connection host.
//!
//! [`GpsService`] owns everything that outlives a single facade: the state
//! machine (which also tracks the running worker), the observer registry and
//! the connector.
//! Facades bind to it without owning it, so an active link keeps running when
//! the facade that started it goes away.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::runtime::Handle;

use crate::error::{Error, Result};
use crate::event::{ConnectionEvent, ObserverId, ObserverRegistry, Subscription};
use crate::machine::{DisconnectOutcome, StateMachine};
use crate::power::{NoopWakeLock, WakeLock};
use crate::protocol::Request;
use crate::transport::{Connector, SerialConfig, SerialConnector};
use crate::types::{ConnectionState, Device};
use crate::worker::ConnectionWorker;

/// Default delay before the first keep-alive.
pub const DEFAULT_KEEP_ALIVE_DELAY: Duration = Duration::from_secs(2);

/// Default keep-alive period.
pub const DEFAULT_KEEP_ALIVE_PERIOD: Duration = Duration::from_millis(500);

/// Default read chunk size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Default wake lock tag.
pub const DEFAULT_WAKE_LOCK_TAG: &str = "BadElfService";

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Delay before the first keep-alive after connecting.
    pub keep_alive_delay: Duration,
    /// Interval between keep-alives.
    pub keep_alive_period: Duration,
    /// Maximum bytes per read (and per data event).
    pub read_buffer_size: usize,
    /// Upper bound on the handshake, if any.
    pub handshake_timeout: Option<Duration>,
    /// Tag passed to the wake lock.
    pub wake_lock_tag: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            keep_alive_delay: DEFAULT_KEEP_ALIVE_DELAY,
            keep_alive_period: DEFAULT_KEEP_ALIVE_PERIOD,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            handshake_timeout: None,
            wake_lock_tag: DEFAULT_WAKE_LOCK_TAG.to_owned(),
        }
    }
}

impl ServiceConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the delay before the first keep-alive.
    #[must_use]
    pub const fn keep_alive_delay(mut self, delay: Duration) -> Self {
        self.keep_alive_delay = delay;
        self
    }

    /// Sets the keep-alive period.
    #[must_use]
    pub const fn keep_alive_period(mut self, period: Duration) -> Self {
        self.keep_alive_period = period;
        self
    }

    /// Sets the read chunk size.
    #[must_use]
    pub const fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Sets the handshake timeout.
    #[must_use]
    pub const fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// Sets the wake lock tag.
    #[must_use]
    pub fn wake_lock_tag(mut self, tag: impl Into<String>) -> Self {
        self.wake_lock_tag = tag.into();
        self
    }
}

/// Result of a send that was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// All bytes were written.
    Written,
    /// The payload was empty; nothing was written.
    Empty,
    /// The write failed or was cut short by a disconnect. Teardown has been
    /// started and will be reported through state changes.
    Dropped,
}

/// Builder for [`GpsService`].
pub struct GpsServiceBuilder {
    connector: Arc<dyn Connector>,
    wake_lock: Arc<dyn WakeLock>,
    config: ServiceConfig,
}

impl GpsServiceBuilder {
    /// Sets the wake lock provider.
    #[must_use]
    pub fn wake_lock(mut self, wake_lock: Arc<dyn WakeLock>) -> Self {
        self.wake_lock = wake_lock;
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the service on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn build(self) -> Arc<GpsService> {
        let registry = Arc::new(ObserverRegistry::new());
        Arc::new(GpsService {
            machine: StateMachine::new(Arc::clone(&registry)),
            registry,
            connector: self.connector,
            wake_lock: self.wake_lock,
            config: self.config,
            runtime: Handle::current(),
        })
    }
}

/// Hosts the connection to one Bad Elf receiver.
pub struct GpsService {
    machine: StateMachine,
    registry: Arc<ObserverRegistry>,
    connector: Arc<dyn Connector>,
    wake_lock: Arc<dyn WakeLock>,
    config: ServiceConfig,
    runtime: Handle,
}

impl GpsService {
    /// Starts building a service around `connector`.
    #[must_use]
    pub fn builder(connector: Arc<dyn Connector>) -> GpsServiceBuilder {
        GpsServiceBuilder {
            connector,
            wake_lock: Arc::new(NoopWakeLock),
            config: ServiceConfig::default(),
        }
    }

    /// Creates a service that connects through serial ports.
    #[must_use]
    pub fn serial(config: SerialConfig) -> Arc<Self> {
        Self::builder(Arc::new(SerialConnector::new(config))).build()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    /// The device set for connecting, if any.
    #[must_use]
    pub fn device(&self) -> Option<Device> {
        self.machine.device()
    }

    /// Sets the device to connect to.
    ///
    /// Fails with [`Error::AlreadyConnected`] if a different device is set
    /// while not idle.
    pub fn set_device(&self, device: Device) -> Result<()> {
        self.machine.bind_device(device)
    }

    /// Starts connecting to the device.
    ///
    /// Returns as soon as the worker is spawned; progress is reported through
    /// state changes.
    pub fn connect(self: &Arc<Self>) -> Result<()> {
        self.machine.launch(|ticket| {
            tracing::info!("connecting to {}", ticket.device());
            let worker = ConnectionWorker::new(Arc::clone(self), ticket);
            self.runtime.spawn(worker.run())
        })
    }

    /// Requests a disconnect. Does not wait for it to finish.
    pub fn disconnect(&self) -> Result<DisconnectOutcome> {
        let outcome = self.machine.begin_disconnect()?;
        tracing::info!("disconnect: {:?}", outcome);
        Ok(outcome)
    }

    /// Writes raw bytes to the receiver.
    ///
    /// Fails with [`Error::NotConnected`] unless connected. Write failures are
    /// not errors: they start a disconnect and return [`SendOutcome::Dropped`].
    pub async fn send(&self, data: &[u8]) -> Result<SendOutcome> {
        let handle = self.machine.send_handle()?;
        if data.is_empty() {
            return Ok(SendOutcome::Empty);
        }

        let mut cancel = handle.cancel;
        let write = async {
            let mut writer = handle.writer.lock().await;
            writer.write_all(data).await?;
            writer.flush().await
        };

        let result = tokio::select! {
            biased;
            _ = cancel.wait_for(|cancelled| *cancelled) => {
                tracing::debug!("send cut short by disconnect");
                return Ok(SendOutcome::Dropped);
            }
            result = write => result,
        };

        match result {
            Ok(()) => {
                tracing::trace!("sent {} bytes: {}", data.len(), hex::encode(data));
                Ok(SendOutcome::Written)
            }
            Err(e) => {
                tracing::warn!("write failed, disconnecting: {}", e);
                match self.machine.begin_disconnect() {
                    Ok(_) | Err(Error::NotConnected) => {}
                    Err(e) => tracing::debug!("disconnect after write failure: {}", e),
                }
                Ok(SendOutcome::Dropped)
            }
        }
    }

    /// Sends a rate request.
    pub async fn send_request(&self, request: Request) -> Result<SendOutcome> {
        tracing::info!(
            "requesting {} Hz (satellites: {})",
            request.rate(),
            request.includes_satellites()
        );
        self.send(request.payload()).await
    }

    /// Registers an observer.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.registry.register()
    }

    /// Removes an observer.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.registry.unregister(id)
    }

    /// Number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.registry.len()
    }

    pub(crate) fn subscribe_ready(&self) -> Subscription {
        self.registry.register_with(ConnectionEvent::Ready)
    }

    /// Waits until the connection is idle and announced as such.
    pub async fn wait_idle(&self) {
        let mut announced = self.machine.announced();
        let _ = announced
            .wait_for(|state| *state == ConnectionState::Idle)
            .await;
    }

    /// Disconnects if needed and waits for the worker to exit.
    ///
    /// Keeps going until no worker owns the connection, so attempts started
    /// concurrently with the shutdown are torn down too.
    pub async fn shutdown(&self) {
        loop {
            match self.machine.begin_disconnect() {
                Ok(_) | Err(Error::NotConnected) => {}
                Err(e) => tracing::debug!("shutdown disconnect: {}", e),
            }
            let Some(handle) = self.machine.take_worker() else {
                break;
            };
            if let Err(e) = handle.await {
                tracing::warn!("worker ended abnormally: {}", e);
            }
        }
        self.wait_idle().await;
        tracing::debug!("service shut down");
    }

    pub(crate) const fn machine(&self) -> &StateMachine {
        &self.machine
    }

    pub(crate) fn connector(&self) -> &dyn Connector {
        self.connector.as_ref()
    }

    pub(crate) fn wake_lock(&self) -> &dyn WakeLock {
        self.wake_lock.as_ref()
    }

    pub(crate) const fn config(&self) -> &ServiceConfig {
        &self.config
    }
}
