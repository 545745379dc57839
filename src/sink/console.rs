//! Verbose console output

use crate::et73x::SensorReading;

use super::text_log::format_reading;

pub fn print_reading(reading: &SensorReading) {
    println!("{}", format_reading(reading));
}
