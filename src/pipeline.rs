//! Frame worker - validates frames, applies the registry policy and fans
//! readings out to the sinks

use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::et73x::{parse_frame, to_reading, RawFrame, SensorReading, TemperatureUnit};
use crate::sensor_registry::{RegistryConfig, SenderRegistry};
use crate::sink::SinkHandle;

/// Interval between statistics log lines
const STATS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub frames: u64,
    pub decode_errors: u64,
    pub accepted: u64,
    pub rejected: u64,
}

/// Owns the sender registry; runs on a blocking task of its own
pub struct FrameWorker {
    unit: TemperatureUnit,
    registry: SenderRegistry,
    sinks: Vec<SinkHandle>,
    stats: WorkerStats,
}

impl FrameWorker {
    pub fn new(unit: TemperatureUnit, registry: RegistryConfig, sinks: Vec<SinkHandle>) -> Self {
        Self {
            unit,
            registry: SenderRegistry::new(registry),
            sinks,
            stats: WorkerStats::default(),
        }
    }

    /// Parse, deduplicate and dispatch one frame
    pub fn process(&mut self, frame: RawFrame) -> Option<SensorReading> {
        self.stats.frames += 1;

        let decoded = match parse_frame(&frame) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.stats.decode_errors += 1;
                debug!("Dropping frame *{};: {}", frame.to_hex(), e);
                return None;
            }
        };

        if !self.registry.accept(
            decoded.sender_id,
            decoded.device_type,
            decoded.status,
            frame.tick_us,
        ) {
            self.stats.rejected += 1;
            return None;
        }

        self.stats.accepted += 1;
        let reading = to_reading(&frame, &decoded, self.unit);
        debug!(
            "Accepted {} {} ({}) raw *{};",
            decoded.device_type,
            decoded.sender_id,
            decoded.status,
            frame.to_hex()
        );
        if let Some(unit) = self.registry.get(decoded.sender_id) {
            debug!(
                "  {} {}: reading #{} since {}",
                unit.device_type,
                unit.sender_id,
                unit.readings,
                unit.first_seen.format("%H:%M:%S")
            );
        }

        for sink in &self.sinks {
            sink.offer(&reading);
        }

        Some(reading)
    }

    /// Blocking receive loop; returns when the capture side hangs up or
    /// `shutdown` is set, after handling frames already queued
    ///
    /// The sink senders are dropped on return, which lets the sink tasks finish.
    pub fn run(mut self, frame_rx: Receiver<RawFrame>, shutdown: Arc<AtomicBool>) -> WorkerStats {
        info!("Frame worker started with {} sinks", self.sinks.len());

        let mut last_stats_report = Instant::now();
        let mut last_tick_us = 0;

        loop {
            if shutdown.load(Ordering::SeqCst) {
                let pending: Vec<RawFrame> = frame_rx.try_iter().collect();
                info!("Shutdown requested, handling {} queued frames", pending.len());
                for frame in pending {
                    self.process(frame);
                }
                break;
            }

            match frame_rx.recv_timeout(Duration::from_millis(500)) {
                Ok(frame) => {
                    last_tick_us = frame.tick_us;
                    self.process(frame);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Frame channel closed");
                    break;
                }
            }

            if last_stats_report.elapsed() >= STATS_INTERVAL {
                self.registry.evict_stale(last_tick_us);
                self.log_stats();
                last_stats_report = Instant::now();
            }
        }

        self.log_stats();
        info!("Frame worker stopped, {} senders known", self.registry.count());
        self.stats
    }

    fn log_stats(&self) {
        info!(
            "[Worker] Frames: {} | Decode errors: {} | Accepted: {} | Rejected: {}",
            self.stats.frames, self.stats.decode_errors, self.stats.accepted, self.stats.rejected
        );
        info!("[Registry] {}", self.registry.stats_summary());
    }
}
