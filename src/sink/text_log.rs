//! Append-only human-readable reading log
//!
//! One line per reading terminated by `<br>`, so the file can be embedded
//! in a web page as-is (no header or footer is written).

use anyhow::{Context, Result};
use chrono::Local;
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::et73x::SensorReading;

/// Render one reading, absent channels as empty fields
pub fn format_reading(reading: &SensorReading) -> String {
    let unit = reading.unit.label();
    format!(
        "{}: {} - {} - Temperature 1: {} {} Temperature 2: {} {}",
        reading.received_at.with_timezone(&Local).format("%c"),
        reading.device_type,
        reading.sender_id,
        format_temperature(reading.temperature_1),
        unit,
        format_temperature(reading.temperature_2),
        unit,
    )
}

fn format_temperature(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub struct TextLogWriter {
    file: File,
}

impl TextLogWriter {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open text log {}", path.display()))?;
        Ok(Self { file })
    }

    pub async fn write(&mut self, reading: &SensorReading) -> Result<()> {
        let line = format!("{} <br>\n", format_reading(reading));
        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await?;
        Ok(())
    }
}
