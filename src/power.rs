//! Keep-awake guard held while a connection attempt is running.
//!
//! Hosts that can suspend the CPU (phones, laptops on battery) plug in a
//! [`WakeLock`] that keeps it running while the receiver streams data.

use std::fmt;

/// Provides scoped wake locks.
pub trait WakeLock: Send + Sync {
    /// Acquires a wake lock. It is released when the guard is dropped.
    fn acquire(&self, tag: &str) -> WakeGuard;
}

/// Releases a wake lock on drop.
#[must_use = "the wake lock is released as soon as the guard is dropped"]
pub struct WakeGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl WakeGuard {
    /// Creates a guard that runs `release` when dropped.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Creates a guard that does nothing.
    pub const fn noop() -> Self {
        Self { release: None }
    }
}

impl Drop for WakeGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for WakeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WakeGuard")
            .field("held", &self.release.is_some())
            .finish()
    }
}

/// Wake lock for hosts without power management.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopWakeLock;

impl WakeLock for NoopWakeLock {
    fn acquire(&self, tag: &str) -> WakeGuard {
        tracing::trace!("wake lock {} (noop)", tag);
        WakeGuard::noop()
    }
}
