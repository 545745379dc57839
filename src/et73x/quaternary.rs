//! 4-chip to 2-bit line code

use super::DecodeError;

/// Decode one 4-chip group (low nibble, first chip in bit 3)
///
/// Valid codewords are the Manchester pairs 0101, 0110, 1001 and 1010.
#[inline]
pub fn decode_quaternary(chips: u8) -> Result<u8, DecodeError> {
    match chips & 0x0F {
        0b0101 => Ok(0),
        0b0110 => Ok(1),
        0b1001 => Ok(2),
        0b1010 => Ok(3),
        pattern => Err(DecodeError::InvalidSymbol { group: None, pattern }),
    }
}

/// Codeword for a 2-bit symbol
#[cfg(test)]
pub fn encode_quaternary(symbol: u8) -> u8 {
    match symbol & 0x03 {
        0 => 0b0101,
        1 => 0b0110,
        2 => 0b1001,
        _ => 0b1010,
    }
}
