//! Checksum and sender identity for ET-73x telegrams
//!
//! The transmitted checksum field is XORed with a per-power-cycle random value
//! by the probe, so the residue of computed vs. transmitted checksum is both
//! the integrity check and the sender id.

use super::frame::RawFrame;
use super::quaternary::decode_quaternary;
use super::types::DeviceType;
use super::DecodeError;

/// Initial mask register
const CHECKSUM_MASK_SEED: u16 = 0x3331;

/// Feedback polynomial applied when the mask shifts out a 1
const CHECKSUM_POLY: u16 = 0x1021;

/// Payload covers groups 6..18 (12 symbols, 24 bits)
const PAYLOAD_FIRST_GROUP: usize = 6;
const PAYLOAD_GROUPS: usize = 12;

/// Transmitted checksum field: groups 18..24, device marker in 24, tail in 25
const CHECKSUM_FIRST_GROUP: usize = 18;
const CHECKSUM_GROUPS: usize = 6;
const MARKER_GROUP: usize = 24;
const TAIL_GROUP: usize = 25;

/// ET-733 markers are raw chip patterns, not quaternary codewords
const ET733_MARKER_A: u8 = 0b0001;
const ET733_MARKER_B: u8 = 0b0010;

/// Decode group `index`, tagging any error with the group position
pub(crate) fn symbol(frame: &RawFrame, index: usize) -> Result<u8, DecodeError> {
    decode_quaternary(frame.group(index)).map_err(|err| err.at_group(index))
}

/// Assemble the 24-bit checksum payload from groups 6..18
pub fn checksum_payload(frame: &RawFrame) -> Result<u32, DecodeError> {
    let mut data: u32 = 0;
    for i in 0..PAYLOAD_GROUPS {
        data |= (symbol(frame, PAYLOAD_FIRST_GROUP + i)? as u32) << (22 - 2 * i);
    }
    Ok(data)
}

/// Compute the 16-bit checksum over the low 24 bits of `data`, LSB first
pub fn compute_checksum(data: u32) -> u16 {
    let mut mask = CHECKSUM_MASK_SEED;
    let mut checksum: u16 = 0;

    for i in 0..24 {
        if (data >> i) & 1 != 0 {
            checksum ^= mask;
        }
        let msb = mask & 0x8000 != 0;
        mask <<= 1;
        if msb {
            mask ^= CHECKSUM_POLY;
        }
    }

    checksum
}

/// Classify the probe and reconstruct the transmitted checksum field
pub fn transmitted_checksum(frame: &RawFrame) -> Result<(DeviceType, u16), DecodeError> {
    let mut value: u16 = 0;
    for i in 0..CHECKSUM_GROUPS {
        value |= (symbol(frame, CHECKSUM_FIRST_GROUP + i)? as u16) << (14 - 2 * i);
    }

    let marker = frame.group(MARKER_GROUP);
    let tail = symbol(frame, TAIL_GROUP)? as u16;

    let device_type = if marker == ET733_MARKER_A || marker == ET733_MARKER_B {
        value |= (tail & 0x01) << 3;
        value |= (tail & 0x02) << 1;
        if marker == ET733_MARKER_B {
            value |= 0x02;
        }
        DeviceType::Et733
    } else {
        value |= (symbol(frame, MARKER_GROUP)? as u16) << 2;
        value |= tail;
        DeviceType::Et732
    };

    Ok((device_type, value))
}

/// Derive the device type and sender id of a frame
pub fn sender_identity(frame: &RawFrame) -> Result<(DeviceType, u16), DecodeError> {
    let computed = compute_checksum(checksum_payload(frame)?);
    let (device_type, transmitted) = transmitted_checksum(frame)?;
    Ok((device_type, computed ^ transmitted))
}
