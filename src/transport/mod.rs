//! Transport layer for Bad Elf communication.
//!
//! A [`Connector`] performs the handshake with a receiver and hands back a
//! duplex byte stream. The connection worker owns that stream for the whole
//! attempt. Dropping it closes the link.

pub mod memory;
pub mod serial;

use std::pin::Pin;

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

use crate::error::Result;
use crate::types::Device;

/// A duplex byte stream to a receiver.
pub trait Link: AsyncRead + AsyncWrite + Send {}

impl<T> Link for T where T: AsyncRead + AsyncWrite + Send {}

/// An owned, type-erased link.
pub type BoxedLink = Pin<Box<dyn Link>>;

/// Opens links to receivers.
pub trait Connector: Send + Sync {
    /// Connects to `device` using the given service class.
    ///
    /// Resolves once the link is usable or the handshake has failed.
    fn connect<'a>(&'a self, device: &'a Device, service: Uuid) -> BoxFuture<'a, Result<BoxedLink>>;
}

pub use memory::{MemoryConnector, Peripherals};
pub use serial::{SerialConfig, SerialConnector, paired_devices};
