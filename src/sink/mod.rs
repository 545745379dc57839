//! Reading sinks
//!
//! Every sink owns a bounded channel and a task, so a slow disk never
//! holds up the frame worker or the other sinks.

mod console;
pub mod json_log;
pub mod text_log;

use anyhow::Result;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::et73x::SensorReading;
use json_log::JsonLogWriter;
use text_log::TextLogWriter;

/// Configured output
#[derive(Debug, Clone)]
pub enum SinkKind {
    Console,
    TextLog(PathBuf),
    JsonLog(PathBuf),
}

impl SinkKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Console => "console",
            Self::TextLog(_) => "text-log",
            Self::JsonLog(_) => "json-log",
        }
    }
}

/// Sending side of a sink, held by the frame worker
#[derive(Debug, Clone)]
pub struct SinkHandle {
    name: &'static str,
    tx: mpsc::Sender<SensorReading>,
}

impl SinkHandle {
    pub fn new(name: &'static str, tx: mpsc::Sender<SensorReading>) -> Self {
        Self { name, tx }
    }

    /// Queue a reading without waiting; returns false when it was dropped
    pub fn offer(&self, reading: &SensorReading) -> bool {
        match self.tx.try_send(reading.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("[{}] Sink queue full, dropping reading", self.name);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("[{}] Sink closed, dropping reading", self.name);
                false
            }
        }
    }
}

/// Open the sink's output and start its task
///
/// Opening errors are returned so start-up fails loudly.
pub async fn spawn_sink(kind: SinkKind, capacity: usize) -> Result<(SinkHandle, JoinHandle<()>)> {
    let name = kind.name();
    let (tx, mut rx) = mpsc::channel::<SensorReading>(capacity);

    let handle = match kind {
        SinkKind::Console => tokio::spawn(async move {
            while let Some(reading) = rx.recv().await {
                console::print_reading(&reading);
            }
        }),
        SinkKind::TextLog(path) => {
            let mut writer = TextLogWriter::open(&path).await?;
            info!("[{}] Appending readings to {}", name, path.display());
            tokio::spawn(async move {
                while let Some(reading) = rx.recv().await {
                    if let Err(e) = writer.write(&reading).await {
                        warn!("[{}] Write failed: {}", name, e);
                    }
                }
            })
        }
        SinkKind::JsonLog(path) => {
            let mut writer = JsonLogWriter::open(&path).await?;
            info!("[{}] Appending readings to {}", name, path.display());
            tokio::spawn(async move {
                while let Some(reading) = rx.recv().await {
                    if let Err(e) = writer.write(&reading).await {
                        warn!("[{}] Write failed: {}", name, e);
                    }
                }
            })
        }
    };

    Ok((SinkHandle::new(name, tx), handle))
}
