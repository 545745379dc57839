//! Raw 104-bit telegram as assembled by the demodulator

use chrono::{DateTime, Utc};

use super::DecodeError;

/// Bits per telegram
pub const FRAME_BITS: usize = 104;

/// 4-chip quaternary groups per telegram
pub const FRAME_GROUPS: usize = FRAME_BITS / 4;

const FRAME_MASK: u128 = (1u128 << FRAME_BITS) - 1;
const FRAME_BYTES: usize = FRAME_BITS / 8;

/// Completed telegram, first received bit in the most significant position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    bits: u128,

    /// Edge-clock timestamp of the edge that completed the frame (µs)
    pub tick_us: i64,

    /// Wall-clock arrival time
    pub received_at: DateTime<Utc>,
}

impl RawFrame {
    pub fn new(bits: u128, tick_us: i64, received_at: DateTime<Utc>) -> Self {
        Self {
            bits: bits & FRAME_MASK,
            tick_us,
            received_at,
        }
    }

    /// Parse the one-hex-digit-per-group rendering produced by [`RawFrame::to_hex`]
    pub fn from_hex(
        text: &str,
        tick_us: i64,
        received_at: DateTime<Utc>,
    ) -> Result<Self, DecodeError> {
        let text = text.trim();
        if text.len() != FRAME_GROUPS {
            return Err(DecodeError::InvalidLength {
                expected: FRAME_BITS,
                actual: text.len() * 4,
            });
        }

        let bytes = hex::decode(text).map_err(|_| DecodeError::InvalidHex)?;
        let bits = bytes
            .iter()
            .fold(0u128, |acc, &byte| (acc << 8) | byte as u128);

        Ok(Self::new(bits, tick_us, received_at))
    }

    /// Packed frame bits (low 104 bits)
    #[cfg(test)]
    pub fn bits(&self) -> u128 {
        self.bits
    }

    /// 4-chip group `index` (0..26) as a nibble, first chip in bit 3
    #[inline]
    pub fn group(&self, index: usize) -> u8 {
        debug_assert!(index < FRAME_GROUPS);
        let shift = 4 * (FRAME_GROUPS - 1 - index);
        ((self.bits >> shift) & 0x0F) as u8
    }

    /// Render as 26 hex digits, one per group
    pub fn to_hex(&self) -> String {
        let bytes = self.bits.to_be_bytes();
        hex::encode_upper(&bytes[bytes.len() - FRAME_BYTES..])
    }
}
