//! ET-73x Capture - wireless BBQ thermometer receiver
//!
//! Watches the data pin of a 433 MHz receiver through gpiomon (or replays
//! recorded edges), demodulates ET-732/ET-733 telegrams and writes one
//! reading per probe transmission to the configured sinks.

mod config;
mod et73x;
mod pipeline;
mod rf;
mod sensor_registry;
mod sink;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::Config;
use et73x::{parse_frame, to_reading, DecodeError, DecodedFrame, RawFrame, TemperatureUnit};
use pipeline::FrameWorker;
use rf::EdgeCapture;
use sink::spawn_sink;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    let default_level = if config.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Some(hex) = &config.decode {
        return decode_offline(hex, config.unit());
    }

    info!("===========================================");
    info!("   ET-73x Capture - 433 MHz BBQ probes");
    info!("===========================================");

    info!("Configuration:");
    match &config.replay {
        Some(path) => info!("  Replay: {}", path.display()),
        None => info!("  GPIO: {} line {}", config.chip, config.pin),
    }
    info!("  Unit: {}", config.unit().label());
    info!("  Cool-down: {} s", config.cool_down_secs);
    info!("  Register any sender: {}", config.nosync);

    let mut sinks = Vec::new();
    let mut sink_tasks = Vec::new();
    for kind in config.sinks() {
        let (handle, task) = spawn_sink(kind, config.queue_capacity).await?;
        sinks.push(handle);
        sink_tasks.push(task);
    }
    if sinks.is_empty() {
        warn!("No sinks configured, readings are only logged (use --verbose, --html or --json)");
    }

    let capture = EdgeCapture::new(config.capture());
    let frame_rx = match capture.start() {
        Ok(rx) => rx,
        Err(e) => {
            error!("Failed to start edge capture: {:#}", e);
            return Err(e);
        }
    };

    info!("===========================================");
    info!("  Listening for telegrams...");
    info!("  Press Ctrl+C to stop.");
    info!("===========================================");

    let worker = FrameWorker::new(config.unit(), config.registry(), sinks);
    let shutdown = Arc::new(AtomicBool::new(false));
    let worker_shutdown = shutdown.clone();
    let mut worker_task = tokio::task::spawn_blocking(move || worker.run(frame_rx, worker_shutdown));

    let finished = tokio::select! {
        result = &mut worker_task => Some(result),
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Interrupted");
            shutdown.store(true, Ordering::SeqCst);
            None
        }
    };

    if !capture.is_running() {
        info!("Edge source closed");
    }
    capture.stop();

    // the worker owns the sink senders; once it returns the sink tasks drain
    let worker_stats = match finished {
        Some(result) => result,
        None => worker_task.await,
    }
    .context("Frame worker panicked")?;
    for task in sink_tasks {
        if let Err(e) = task.await {
            warn!("Sink task failed: {}", e);
        }
    }

    if let Some(e) = capture.take_failure() {
        error!("Edge capture failed: {:#}", e);
        return Err(e.context("Edge capture failed"));
    }

    let stats = capture.stats();
    info!(
        "Shutdown complete. Edges: {} | Unparsed lines: {} | Frames: {} | Decode errors: {} | Readings: {}",
        stats.edges.load(Ordering::Relaxed),
        stats.unparsed_lines.load(Ordering::Relaxed),
        worker_stats.frames,
        worker_stats.decode_errors,
        worker_stats.accepted
    );
    Ok(())
}

/// Decode one frame given on the command line and print it
fn decode_offline(hex: &str, unit: TemperatureUnit) -> Result<()> {
    let frame = RawFrame::from_hex(hex.trim(), 0, Utc::now())?;
    let decoded: DecodedFrame = parse_frame(&frame).map_err(|e: DecodeError| {
        anyhow::anyhow!("Frame *{}; does not decode: {}", frame.to_hex(), e)
    })?;

    let reading = to_reading(&frame, &decoded, unit);
    let channel = |value: Option<f64>| match value {
        Some(v) => format!("{} {}", v, unit.label()),
        None => "-".to_string(),
    };

    println!("Type:          {}", decoded.device_type);
    println!("Sender:        {} (0x{:04X})", decoded.sender_id, decoded.sender_id);
    println!("Status:        {}", decoded.status);
    println!("Temperature 1: {}", channel(reading.temperature_1));
    println!("Temperature 2: {}", channel(reading.temperature_2));
    Ok(())
}
