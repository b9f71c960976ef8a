//! Serial transport implementation.
//!
//! Paired Bluetooth receivers show up as serial ports once their Serial Port
//! Profile channel is bound (`/dev/rfcommN` on Linux, `COMn` on Windows,
//! `/dev/cu.*` on macOS). USB-attached receivers work the same way.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio_serial::{SerialPortBuilderExt, SerialPortInfo, SerialPortType};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::transport::{BoxedLink, Connector};
use crate::types::Device;

/// Default baud rate for Bad Elf receivers.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default delay between opening the port and handing it out.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::ZERO;

/// Configuration for the serial connector.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Baud rate.
    pub baud_rate: u32,
    /// Delay after opening before the link is used.
    pub settle_delay: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

impl SerialConfig {
    /// Creates a new serial configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }

    /// Sets the settle delay.
    #[must_use]
    pub const fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

/// Connects to receivers through serial ports.
///
/// The device address is used as the port path.
#[derive(Debug, Clone, Default)]
pub struct SerialConnector {
    config: SerialConfig,
}

impl SerialConnector {
    /// Creates a connector with the given configuration.
    #[must_use]
    pub const fn new(config: SerialConfig) -> Self {
        Self { config }
    }
}

impl Connector for SerialConnector {
    fn connect<'a>(&'a self, device: &'a Device, service: Uuid) -> BoxFuture<'a, Result<BoxedLink>> {
        Box::pin(async move {
            tracing::info!(
                "opening serial port {} (service {}) at {} baud",
                device.address(),
                service,
                self.config.baud_rate
            );

            let stream = tokio_serial::new(device.address(), self.config.baud_rate)
                .open_native_async()
                .map_err(Error::Serial)?;

            if !self.config.settle_delay.is_zero() {
                tokio::time::sleep(self.config.settle_delay).await;
            }

            tracing::info!("serial port {} open", device.address());
            let link: BoxedLink = Box::pin(stream);
            Ok(link)
        })
    }
}

/// Lists paired receivers whose name starts with `prefix`.
///
/// # Errors
///
/// Returns [`Error::Serial`] if the port list cannot be read and
/// [`Error::NoPairedDevices`] if nothing matches.
pub fn paired_devices(prefix: &str) -> Result<Vec<Device>> {
    let ports = tokio_serial::available_ports().map_err(Error::Serial)?;
    tracing::debug!("found {} serial ports", ports.len());

    let devices: Vec<Device> = ports
        .iter()
        .filter_map(|port| {
            let name = display_name(port);
            name_matches(&name, prefix).then(|| Device::new(&port.port_name).with_name(name))
        })
        .collect();

    if devices.is_empty() {
        return Err(Error::NoPairedDevices {
            prefix: prefix.to_owned(),
        });
    }
    Ok(devices)
}

/// Human readable name of a port: the USB product string when there is one,
/// otherwise the port file name without the `cu.`/`tty.` prefix.
fn display_name(port: &SerialPortInfo) -> String {
    if let SerialPortType::UsbPort(usb) = &port.port_type {
        if let Some(product) = &usb.product {
            return product.clone();
        }
    }
    port_base_name(&port.port_name).to_owned()
}

fn port_base_name(path: &str) -> &str {
    let base = path.rsplit(['/', '\\']).next().unwrap_or(path);
    base.strip_prefix("cu.")
        .or_else(|| base.strip_prefix("tty."))
        .unwrap_or(base)
}

/// Prefix match that also accepts names with the spaces squeezed out
/// ("BadElfGPS-SPP" matches "Bad Elf").
fn name_matches(name: &str, prefix: &str) -> bool {
    if name.starts_with(prefix) {
        return true;
    }
    let compact = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
    compact(name).starts_with(&compact(prefix))
}
