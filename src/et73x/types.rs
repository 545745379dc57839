//! ET-73x telegram data types

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Probe family, selected once from the marker in group 24
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Et732,
    Et733,
}

impl DeviceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Et732 => "et732",
            Self::Et733 => "et733",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transmitter state carried in groups 6 and 7
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Probe is (re)announcing itself after power-on or sync
    Init,
    Default,
    Unknown(u8),
}

impl From<u8> for Status {
    fn from(code: u8) -> Self {
        match code {
            7 => Self::Init,
            2 => Self::Default,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::Default => f.write_str("default"),
            Self::Unknown(code) => write!(f, "unknown {}", code),
        }
    }
}

/// Fields recovered from a well-formed telegram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame {
    pub device_type: DeviceType,

    /// Checksum residue, doubles as the random per-power-cycle sender id
    pub sender_id: u16,

    pub status: Status,

    /// Raw channel values, `None` when no probe is plugged in
    pub temp1_raw: Option<u16>,
    pub temp2_raw: Option<u16>,
}

/// Output temperature unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn label(self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "F",
        }
    }

    /// Convert a value given in the probe's base unit
    pub fn convert(self, base: f64) -> f64 {
        match self {
            Self::Celsius => base,
            Self::Fahrenheit => base * 9.0 / 5.0 + 32.0,
        }
    }
}

/// Accepted, deduplicated reading handed to the sinks
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// Wall-clock arrival time of the telegram
    pub received_at: DateTime<Utc>,

    /// Edge-clock timestamp of the completing edge (µs)
    pub tick_us: i64,

    pub sender_id: u16,
    pub device_type: DeviceType,
    pub unit: TemperatureUnit,
    pub temperature_1: Option<f64>,
    pub temperature_2: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::from(7), Status::Init);
        assert_eq!(Status::from(2), Status::Default);
        assert_eq!(Status::from(5), Status::Unknown(5));
        assert_eq!(Status::Unknown(5).to_string(), "unknown 5");
    }

    #[test]
    fn test_fahrenheit_conversion() {
        assert_eq!(TemperatureUnit::Fahrenheit.convert(0.0), 32.0);
        assert_eq!(TemperatureUnit::Fahrenheit.convert(100.0), 212.0);
        assert_eq!(TemperatureUnit::Celsius.convert(21.0), 21.0);
    }
}
