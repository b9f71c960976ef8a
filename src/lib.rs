//! # badelf
//!
//! A Rust client library for Bad Elf GPS receivers.
//!
//! This library manages a single connection to a receiver over a Bluetooth
//! Serial Port Profile link (or any serial port), streams the NMEA data it
//! produces, and sends rate requests back to it.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - One ordered event channel per observer for state changes and data
//! - Explicit connection lifecycle: `Idle → Connecting → Connected → Disconnecting → Idle`
//! - Transport errors surface as state changes, never as errors from `send`
//!
//! ## Quick Start
//!
//! ```no_run
//! use badelf::{BadElf, ConnectionEvent, Device, GpsService, Request, SerialConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), badelf::Error> {
//!     let service = GpsService::serial(SerialConfig::new());
//!     let (client, mut events) = BadElf::bind(&service);
//!
//!     client.set_device(Device::new("/dev/rfcomm0"))?;
//!     client.connect()?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             ConnectionEvent::Ready => {}
//!             ConnectionEvent::StateChanged(state) => {
//!                 println!("state: {state}");
//!                 if state == badelf::ConnectionState::Connected {
//!                     client.send_request(Request::OneHzIncludeSatellites).await?;
//!                 }
//!             }
//!             ConnectionEvent::DataReceived(data) => {
//!                 print!("{}", String::from_utf8_lossy(&data));
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`protocol`] - Rate request table, keep-alive payload, service identifier
//! - [`types`] - Devices and connection states
//! - [`transport`] - Connectors (serial ports, in-memory pipes)
//! - [`event`] - Observer registry and subscriptions
//! - [`machine`] - Connection state machine
//! - [`worker`] - Per-attempt background task
//! - [`power`] - Wake lock hooks
//! - [`service`] - [`GpsService`] host
//! - [`client`] - High-level [`BadElf`] binding

pub mod client;
pub mod error;
pub mod event;
pub mod machine;
pub mod power;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod types;
pub mod worker;

// Re-exports for convenience
pub use client::BadElf;
pub use error::{Error, Result};
pub use event::{ConnectionEvent, ObserverId, ObserverRegistry, Subscription};
pub use machine::{ConnectTicket, DisconnectOutcome, StateMachine};
pub use power::{NoopWakeLock, WakeGuard, WakeLock};
pub use protocol::{KEEP_ALIVE_PAYLOAD, Request, SPP_UUID};
pub use service::{GpsService, GpsServiceBuilder, SendOutcome, ServiceConfig};
pub use transport::{
    BoxedLink, Connector, Link, MemoryConnector, Peripherals, SerialConfig, SerialConnector,
    paired_devices,
};
pub use types::{ConnectionState, Device};
