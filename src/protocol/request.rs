//! Rate requests for Bad Elf GPS receivers.
//!
//! Each request selects an output rate and whether satellite sentences are
//! included. The payloads are fixed byte sequences sent verbatim:
//! ```text
//! ┌───────────┬────────┬────────────┬──────────────┬─────────┐
//! │ 0x24 0xbe │  0x00  │  length    │     body     │  CR LF  │
//! │  2 bytes  │ 1 byte │   1 byte   │   variable   │ 2 bytes │
//! └───────────┴────────┴────────────┴──────────────┴─────────┘
//! ```

/// Preamble shared by every request payload.
pub const PREAMBLE: [u8; 2] = [0x24, 0xbe];

/// Trailer shared by every request payload.
pub const TRAILER: [u8; 2] = [0x0d, 0x0a];

/// Payload sent by the keep-alive ticker.
pub const KEEP_ALIVE_PAYLOAD: &[u8] = &[0x00];

const ONE_HZ_SATS: [u8; 17] = [
    0x24, 0xbe, 0x00, 0x11, 0x05, 0x01, 0x02, 0x05, 0x31, 0x01, 0x32, 0x04, 0x33, 0x01, 0x64, 0x0d,
    0x0a,
];
const TWO_HZ_SATS: [u8; 17] = [
    0x24, 0xbe, 0x00, 0x11, 0x04, 0x01, 0x02, 0x06, 0x31, 0x02, 0x32, 0x04, 0x33, 0x01, 0x63, 0x0d,
    0x0a,
];
const FOUR_HZ_SATS: [u8; 17] = [
    0x24, 0xbe, 0x00, 0x11, 0x07, 0x01, 0x02, 0x03, 0x31, 0x04, 0x32, 0x11, 0x33, 0x01, 0x54, 0x0d,
    0x0a,
];
const FIVE_HZ_SATS: [u8; 17] = [
    0x24, 0xbe, 0x00, 0x11, 0x06, 0x01, 0x02, 0x04, 0x31, 0x05, 0x32, 0x04, 0x33, 0x01, 0x60, 0x0d,
    0x0a,
];
const TEN_HZ_SATS: [u8; 17] = [
    0x24, 0xbe, 0x00, 0x11, 0x08, 0x01, 0x02, 0x02, 0x31, 0x0a, 0x32, 0x04, 0x33, 0x01, 0x5b, 0x0d,
    0x0a,
];
const ONE_HZ_NO_SATS: [u8; 17] = [
    0x24, 0xbe, 0x00, 0x11, 0x0b, 0x01, 0x02, 0xff, 0x31, 0x01, 0x32, 0x04, 0x33, 0x02, 0x63, 0x0d,
    0x0a,
];
const TWO_HZ_NO_SATS: [u8; 17] = [
    0x24, 0xbe, 0x00, 0x11, 0x10, 0x01, 0x02, 0xfa, 0x31, 0x02, 0x32, 0x04, 0x33, 0x02, 0x62, 0x0d,
    0x0a,
];
const FOUR_HZ_NO_SATS: [u8; 17] = [
    0x24, 0xbe, 0x00, 0x11, 0x12, 0x01, 0x02, 0xf8, 0x31, 0x04, 0x32, 0x04, 0x33, 0x02, 0x60, 0x0d,
    0x0a,
];
const FIVE_HZ_NO_SATS: [u8; 17] = [
    0x24, 0xbe, 0x00, 0x11, 0x13, 0x01, 0x02, 0xf7, 0x31, 0x05, 0x32, 0x04, 0x33, 0x02, 0x5f, 0x0d,
    0x0a,
];
const TEN_HZ_NO_SATS: [u8; 17] = [
    0x24, 0xbe, 0x00, 0x11, 0x16, 0x01, 0x02, 0xf4, 0x31, 0x0a, 0x32, 0x04, 0x33, 0x02, 0x5a, 0x0d,
    0x0a,
];

/// Output rate requests understood by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Request {
    /// 1 Hz, satellite sentences included.
    OneHzIncludeSatellites,
    /// 2 Hz, satellite sentences included.
    TwoHzIncludeSatellites,
    /// 4 Hz, satellite sentences included.
    FourHzIncludeSatellites,
    /// 5 Hz, satellite sentences included.
    FiveHzIncludeSatellites,
    /// 10 Hz, satellite sentences included.
    TenHzIncludeSatellites,
    /// 1 Hz, no satellite sentences.
    OneHzNoSatellites,
    /// 2 Hz, no satellite sentences.
    TwoHzNoSatellites,
    /// 4 Hz, no satellite sentences.
    FourHzNoSatellites,
    /// 5 Hz, no satellite sentences.
    FiveHzNoSatellites,
    /// 10 Hz, no satellite sentences.
    TenHzNoSatellites,
}

impl Request {
    /// Every request in the table.
    pub const ALL: [Self; 10] = [
        Self::OneHzIncludeSatellites,
        Self::TwoHzIncludeSatellites,
        Self::FourHzIncludeSatellites,
        Self::FiveHzIncludeSatellites,
        Self::TenHzIncludeSatellites,
        Self::OneHzNoSatellites,
        Self::TwoHzNoSatellites,
        Self::FourHzNoSatellites,
        Self::FiveHzNoSatellites,
        Self::TenHzNoSatellites,
    ];

    /// Looks up the request for a rate (Hz) and satellite flag.
    ///
    /// Returns `None` for rates outside 1, 2, 4, 5 and 10 Hz.
    #[must_use]
    pub const fn find(rate: u32, include_satellites: bool) -> Option<Self> {
        let request = match (rate, include_satellites) {
            (1, true) => Self::OneHzIncludeSatellites,
            (2, true) => Self::TwoHzIncludeSatellites,
            (4, true) => Self::FourHzIncludeSatellites,
            (5, true) => Self::FiveHzIncludeSatellites,
            (10, true) => Self::TenHzIncludeSatellites,
            (1, false) => Self::OneHzNoSatellites,
            (2, false) => Self::TwoHzNoSatellites,
            (4, false) => Self::FourHzNoSatellites,
            (5, false) => Self::FiveHzNoSatellites,
            (10, false) => Self::TenHzNoSatellites,
            _ => return None,
        };
        Some(request)
    }

    /// Output rate in Hz.
    #[must_use]
    pub const fn rate(self) -> u32 {
        match self {
            Self::OneHzIncludeSatellites | Self::OneHzNoSatellites => 1,
            Self::TwoHzIncludeSatellites | Self::TwoHzNoSatellites => 2,
            Self::FourHzIncludeSatellites | Self::FourHzNoSatellites => 4,
            Self::FiveHzIncludeSatellites | Self::FiveHzNoSatellites => 5,
            Self::TenHzIncludeSatellites | Self::TenHzNoSatellites => 10,
        }
    }

    /// Returns true if satellite sentences are requested.
    #[must_use]
    pub const fn includes_satellites(self) -> bool {
        matches!(
            self,
            Self::OneHzIncludeSatellites
                | Self::TwoHzIncludeSatellites
                | Self::FourHzIncludeSatellites
                | Self::FiveHzIncludeSatellites
                | Self::TenHzIncludeSatellites
        )
    }

    /// The bytes to send to the receiver.
    #[must_use]
    pub const fn payload(self) -> &'static [u8] {
        match self {
            Self::OneHzIncludeSatellites => &ONE_HZ_SATS,
            Self::TwoHzIncludeSatellites => &TWO_HZ_SATS,
            Self::FourHzIncludeSatellites => &FOUR_HZ_SATS,
            Self::FiveHzIncludeSatellites => &FIVE_HZ_SATS,
            Self::TenHzIncludeSatellites => &TEN_HZ_SATS,
            Self::OneHzNoSatellites => &ONE_HZ_NO_SATS,
            Self::TwoHzNoSatellites => &TWO_HZ_NO_SATS,
            Self::FourHzNoSatellites => &FOUR_HZ_NO_SATS,
            Self::FiveHzNoSatellites => &FIVE_HZ_NO_SATS,
            Self::TenHzNoSatellites => &TEN_HZ_NO_SATS,
        }
    }
}
