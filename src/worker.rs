//! Connection worker.
//!
//! One worker runs per connection attempt. It performs the handshake, reads
//! from the link until it ends or a disconnect is requested, drives the
//! keep-alive ticker, and always finishes by handing its ticket back to the
//! state machine.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, ReadHalf};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::{Error, Result};
use crate::machine::ConnectTicket;
use crate::protocol::{KEEP_ALIVE_PAYLOAD, SPP_UUID};
use crate::service::{GpsService, SendOutcome};
use crate::transport::BoxedLink;

/// Why a session ended without a transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// Disconnect requested before or during the handshake.
    CancelledHandshake,
    /// Disconnect requested after the handshake completed but before it was
    /// announced.
    Raced,
    /// Disconnect requested while connected.
    Cancelled,
    /// The receiver closed the link.
    EndOfStream,
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Background task owning one connection attempt.
pub struct ConnectionWorker {
    service: Arc<GpsService>,
    ticket: ConnectTicket,
}

impl ConnectionWorker {
    /// Creates a worker for the attempt authorized by `ticket`.
    pub(crate) fn new(service: Arc<GpsService>, ticket: ConnectTicket) -> Self {
        Self { service, ticket }
    }

    /// Runs the attempt to completion.
    pub async fn run(self) {
        let wake = self
            .service
            .wake_lock()
            .acquire(&self.service.config().wake_lock_tag);
        tracing::debug!("worker starting for {}", self.ticket.device());

        match self.session().await {
            Ok(exit) => tracing::debug!("session ended: {:?}", exit),
            Err(e) => tracing::info!("session ended with error: {}", e),
        }

        // link and keep-alive ticker are gone by now
        self.service.machine().connection_lost(&self.ticket);
        drop(wake);
        self.service.machine().finish_disconnect(self.ticket);
        tracing::debug!("worker exiting");
    }

    async fn session(&self) -> Result<Exit> {
        let link = tokio::select! {
            biased;
            () = self.ticket.cancelled() => return Ok(Exit::CancelledHandshake),
            link = self.handshake() => link?,
        };

        let (mut reader, writer) = tokio::io::split(link);
        let writer = Arc::new(tokio::sync::Mutex::new(writer));
        if !self.service.machine().confirm_connected(&self.ticket, writer) {
            tracing::debug!("disconnect raced the handshake, closing link");
            return Ok(Exit::Raced);
        }

        let _ticker = AbortOnDrop(self.spawn_keep_alive());
        self.read_loop(&mut reader).await
    }

    async fn handshake(&self) -> Result<BoxedLink> {
        let connector = self.service.connector();
        let connect = connector.connect(self.ticket.device(), SPP_UUID);

        match self.service.config().handshake_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| Error::HandshakeTimeout {
                    timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })?,
            None => connect.await,
        }
    }

    async fn read_loop(&self, reader: &mut ReadHalf<BoxedLink>) -> Result<Exit> {
        let mut buf = vec![0u8; self.service.config().read_buffer_size];

        loop {
            let n = tokio::select! {
                biased;
                () = self.ticket.cancelled() => return Ok(Exit::Cancelled),
                read = reader.read(&mut buf) => read.map_err(Error::Io)?,
            };
            if n == 0 {
                tracing::debug!("link closed by receiver");
                return Ok(Exit::EndOfStream);
            }

            tracing::trace!("received {} bytes", n);
            self.service
                .machine()
                .publish_data(Bytes::copy_from_slice(&buf[..n]));
        }
    }

    /// Periodically writes a junk byte so the host radio stack does not
    /// treat a receive-only link as idle and drop it into sniff mode.
    fn spawn_keep_alive(&self) -> JoinHandle<()> {
        let service = Arc::clone(&self.service);
        let config = service.config();
        let start = Instant::now() + config.keep_alive_delay;
        let period = config.keep_alive_period;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match service.send(KEEP_ALIVE_PAYLOAD).await {
                    Ok(SendOutcome::Written | SendOutcome::Empty) => {}
                    Ok(SendOutcome::Dropped) | Err(_) => {
                        tracing::debug!("keep-alive stopped");
                        return;
                    }
                }
            }
        })
    }
}
