//! Data types for Bad Elf connections.

pub mod device;
pub mod state;

pub use device::Device;
pub use state::ConnectionState;
