//! Protocol definitions for Bad Elf communication.
//!
//! Bad Elf receivers stream NMEA sentences over a Serial Port Profile link.
//! The only bytes this library ever writes are the fixed rate requests in
//! [`Request`] and the single-byte keep-alive.

pub mod request;

use uuid::Uuid;

pub use request::{KEEP_ALIVE_PAYLOAD, PREAMBLE, Request, TRAILER};

/// Serial Port Profile service class identifier.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x0000_1101_0000_1000_8000_0080_5f9b_34fb);

/// Name prefix of paired Bad Elf receivers.
pub const DEVICE_NAME_PREFIX: &str = "Bad Elf";
