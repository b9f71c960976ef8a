//! Connection lifecycle state.

use std::fmt;

/// State of the connection to the receiver.
///
/// Transitions run `Idle → Connecting → Connected → Disconnecting → Idle`,
/// with a failed handshake going from `Connecting` straight back to `Idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection and no worker.
    #[default]
    Idle,
    /// Handshake in progress.
    Connecting,
    /// Link is up; data is flowing.
    Connected,
    /// Teardown requested, worker still cleaning up.
    Disconnecting,
}

impl ConnectionState {
    /// Returns a human readable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Disconnecting => "Disconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
