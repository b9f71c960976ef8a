//! Error types for the badelf library.

use thiserror::Error;

/// The main error type for badelf operations.
///
/// Usage errors (`NoDevice`, `AlreadyConnected`, `NotConnected`, `NotBound`)
/// are returned synchronously from the call that broke the contract.
/// Transport errors stay inside the connection worker and only ever show up
/// to observers as state changes.
#[derive(Debug, Error)]
pub enum Error {
    /// `connect` was called before a device was set.
    #[error("no Bad Elf device has been set")]
    NoDevice,

    /// The connection is not idle.
    #[error("already connected")]
    AlreadyConnected,

    /// The connection is not in a state that allows the operation.
    #[error("not connected")]
    NotConnected,

    /// The facade is not bound to a running service.
    #[error("not bound to service")]
    NotBound,

    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The handshake did not complete in time.
    #[error("handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    /// No paired device matched the name filter.
    #[error("no paired devices matching {prefix:?}")]
    NoPairedDevices { prefix: String },
}

impl Error {
    /// Returns true for caller contract violations.
    #[must_use]
    pub const fn is_usage(&self) -> bool {
        matches!(
            self,
            Self::NoDevice | Self::AlreadyConnected | Self::NotConnected | Self::NotBound
        )
    }
}

/// Result type alias for badelf operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_errors() {
        assert!(Error::NoDevice.is_usage());
        assert!(Error::AlreadyConnected.is_usage());
        assert!(Error::NotConnected.is_usage());
        assert!(Error::NotBound.is_usage());
        assert!(!Error::HandshakeTimeout { timeout_ms: 10 }.is_usage());
    }

    #[test]
    fn test_display() {
        let err = Error::NoPairedDevices {
            prefix: "Bad Elf".into(),
        };
        assert_eq!(err.to_string(), "no paired devices matching \"Bad Elf\"");
    }
}
