//! ET-732/ET-733 telegram decoding

mod checksum;
mod frame;
pub mod parser;
mod quaternary;
mod types;

pub use frame::{RawFrame, FRAME_BITS};
pub use parser::{parse_frame, to_reading, DecodeError};
pub use types::{DecodedFrame, DeviceType, SensorReading, Status, TemperatureUnit};
