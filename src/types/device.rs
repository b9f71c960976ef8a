//! Peripheral identity.

use std::fmt;
use std::hash::{Hash, Hasher};

/// A paired Bad Elf receiver.
///
/// The address is what the transport connects to (a Bluetooth address or a
/// bound serial node such as `/dev/rfcomm0`). The name is informational and
/// does not take part in equality.
#[derive(Debug, Clone)]
pub struct Device {
    address: String,
    name: Option<String>,
}

impl Device {
    /// Creates a device from its transport address.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Transport address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Display name, if known.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Device {}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => f.write_str(name),
            None => f.write_str(&self.address),
        }
    }
}
