//! Append-only structured reading log, one JSON object per line

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::et73x::{DeviceType, SensorReading};

/// Serialized form of a reading
#[derive(Debug, Serialize)]
pub struct ReadingRecord {
    /// Unix time in seconds
    pub time: f64,
    pub checksum: u16,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub unit: &'static str,
    pub temperature_1: Option<f64>,
    pub temperature_2: Option<f64>,
}

impl From<&SensorReading> for ReadingRecord {
    fn from(reading: &SensorReading) -> Self {
        Self {
            time: reading.received_at.timestamp_micros() as f64 / 1_000_000.0,
            checksum: reading.sender_id,
            device_type: reading.device_type,
            unit: reading.unit.label(),
            temperature_1: reading.temperature_1,
            temperature_2: reading.temperature_2,
        }
    }
}

/// JSON lines writer
pub struct JsonLogWriter {
    file: File,
}

impl JsonLogWriter {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open JSON log {}", path.display()))?;
        Ok(Self { file })
    }

    pub async fn write(&mut self, reading: &SensorReading) -> Result<()> {
        let mut line = serde_json::to_string(&ReadingRecord::from(reading))?;
        line.push('\n');
        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await?;
        Ok(())
    }
}
