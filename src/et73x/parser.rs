//! ET-73x telegram parser

use thiserror::Error;

use super::checksum::{sender_identity, symbol};
use super::frame::RawFrame;
use super::types::{DecodedFrame, SensorReading, Status, TemperatureUnit};

/// Calibration offset subtracted from a non-zero raw channel value
const TEMPERATURE_OFFSET: i32 = 532;

/// Channel layouts: first group, 5 groups each, most significant first
const CHANNEL_1_GROUP: usize = 8;
const CHANNEL_2_GROUP: usize = 13;
const CHANNEL_GROUPS: usize = 5;

const STATUS_GROUP: usize = 6;

/// Parse error types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid quaternary symbol {pattern:04b}{}", group_suffix(.group))]
    InvalidSymbol { group: Option<usize>, pattern: u8 },

    #[error("invalid frame length: expected {expected} bits, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("frame is not valid hex")]
    InvalidHex,
}

fn group_suffix(group: &Option<usize>) -> String {
    group.map(|g| format!(" in group {}", g)).unwrap_or_default()
}

impl DecodeError {
    /// Attach the offending group position to a symbol error
    pub fn at_group(self, index: usize) -> Self {
        match self {
            Self::InvalidSymbol { pattern, .. } => Self::InvalidSymbol {
                group: Some(index),
                pattern,
            },
            other => other,
        }
    }
}

/// Parse a completed telegram
///
/// Any group that is not a valid codeword aborts the whole frame.
pub fn parse_frame(frame: &RawFrame) -> Result<DecodedFrame, DecodeError> {
    let (device_type, sender_id) = sender_identity(frame)?;
    let status = parse_status(frame)?;
    let temp1_raw = raw_channel(frame, CHANNEL_1_GROUP)?;
    let temp2_raw = raw_channel(frame, CHANNEL_2_GROUP)?;

    Ok(DecodedFrame {
        device_type,
        sender_id,
        status,
        temp1_raw,
        temp2_raw,
    })
}

/// Status nibble from groups 6 and 7
pub fn parse_status(frame: &RawFrame) -> Result<Status, DecodeError> {
    let code = (symbol(frame, STATUS_GROUP)? << 2) | symbol(frame, STATUS_GROUP + 1)?;
    Ok(Status::from(code))
}

/// 10-bit raw channel value, `None` when no probe is connected
fn raw_channel(frame: &RawFrame, first_group: usize) -> Result<Option<u16>, DecodeError> {
    let mut raw: u16 = 0;
    for i in 0..CHANNEL_GROUPS {
        let group = first_group + CHANNEL_GROUPS - 1 - i;
        raw |= (symbol(frame, group)? as u16) << (2 * i);
    }
    Ok((raw != 0).then_some(raw))
}

/// Convert a raw channel value to the configured unit
pub fn temperature(raw: u16, unit: TemperatureUnit) -> f64 {
    unit.convert((raw as i32 - TEMPERATURE_OFFSET) as f64)
}

/// Build the output reading for an accepted frame
pub fn to_reading(frame: &RawFrame, decoded: &DecodedFrame, unit: TemperatureUnit) -> SensorReading {
    SensorReading {
        received_at: frame.received_at,
        tick_us: frame.tick_us,
        sender_id: decoded.sender_id,
        device_type: decoded.device_type,
        unit,
        temperature_1: decoded.temp1_raw.map(|raw| temperature(raw, unit)),
        temperature_2: decoded.temp2_raw.map(|raw| temperature(raw, unit)),
    }
}
