//! Edge capture via gpiomon process or a recorded edge file
//!
//! Reads edge lines on a dedicated thread, runs them through the
//! demodulator and hands completed frames to the worker without blocking.

use anyhow::{bail, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::demod::Demodulator;
use super::edge::parse_edge_line;
use crate::et73x::RawFrame;

/// Where edges come from
#[derive(Debug, Clone)]
pub enum EdgeSource {
    /// `gpiomon` watching both edges of one line
    Gpiomon {
        path: PathBuf,
        chip: String,
        line: u32,
    },
    /// Recorded edge lines, `-` for stdin
    Replay(PathBuf),
}

/// Capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub source: EdgeSource,
    /// Correction added to rising edges (µs)
    pub rising_offset_us: i64,
    /// Capacity of the frame hand-off channel
    pub queue_capacity: usize,
}

/// Statistics for edge capture (atomic for thread-safe access)
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub edges: AtomicU64,
    pub unparsed_lines: AtomicU64,
    pub preambles_detected: AtomicU64,
    pub timing_errors: AtomicU64,
    pub frames_detected: AtomicU64,
    pub frames_dropped: AtomicU64,
}

impl CaptureStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

/// Edge capture controller
pub struct EdgeCapture {
    config: CaptureConfig,
    running: Arc<AtomicBool>,
    stats: Arc<CaptureStats>,
    child: Arc<Mutex<Option<Child>>>,
    failure: Arc<Mutex<Option<anyhow::Error>>>,
}

impl EdgeCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            stats: CaptureStats::new(),
            child: Arc::new(Mutex::new(None)),
            failure: Arc::new(Mutex::new(None)),
        }
    }

    /// Open the edge source and return a receiver for completed frames
    ///
    /// Failing to open the source is a start-up error.
    pub fn start(&self) -> Result<Receiver<RawFrame>> {
        info!("===========================================");
        info!("  Starting edge capture");
        info!("===========================================");
        info!("  Rising edge offset: {} us", self.config.rising_offset_us);

        let reader: Box<dyn Read + Send> = match &self.config.source {
            EdgeSource::Gpiomon { path, chip, line } => {
                let mut child = spawn_gpiomon(path, chip, *line)?;
                let stdout = child
                    .stdout
                    .take()
                    .context("Failed to capture gpiomon stdout")?;

                if let Some(stderr) = child.stderr.take() {
                    thread::spawn(move || {
                        for line in BufReader::new(stderr).lines().map_while(io::Result::ok) {
                            if !line.trim().is_empty() {
                                warn!("[gpiomon] {}", line.trim());
                            }
                        }
                    });
                }

                if let Ok(mut slot) = self.child.lock() {
                    *slot = Some(child);
                }
                Box::new(stdout)
            }
            EdgeSource::Replay(path) if path.as_os_str() == "-" => {
                info!("  Replaying edges from stdin");
                Box::new(io::stdin())
            }
            EdgeSource::Replay(path) => {
                info!("  Replaying edges from {}", path.display());
                let file = File::open(path)
                    .with_context(|| format!("Failed to open edge file {}", path.display()))?;
                Box::new(file)
            }
        };

        let (frame_tx, frame_rx) = bounded::<RawFrame>(self.config.queue_capacity);

        let offset = self.config.rising_offset_us;
        let running = self.running.clone();
        let stats = self.stats.clone();
        let child = self.child.clone();
        let failure = self.failure.clone();

        running.store(true, Ordering::SeqCst);

        thread::Builder::new()
            .name("edge-capture".to_string())
            .spawn(move || {
                let result = run_capture(reader, offset, running.clone(), stats, &frame_tx)
                    .and_then(|()| {
                        // end of output without stop() means the monitor quit on its own
                        if running.load(Ordering::SeqCst) {
                            reap_monitor(&child)
                        } else {
                            Ok(())
                        }
                    });
                if let Err(e) = result {
                    error!("Edge capture error: {:#}", e);
                    if let Ok(mut slot) = failure.lock() {
                        *slot = Some(e);
                    }
                }
                running.store(false, Ordering::SeqCst);
                // the failure is recorded before the worker sees the channel close
                drop(frame_tx);
            })
            .context("Failed to spawn capture thread")?;

        Ok(frame_rx)
    }

    /// Stop capturing and terminate the monitor process
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Stopping edge capture...");
        }
        if let Ok(mut slot) = self.child.lock() {
            if let Some(mut child) = slot.take() {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &Arc<CaptureStats> {
        &self.stats
    }

    /// Error that ended the capture thread, if any
    pub fn take_failure(&self) -> Option<anyhow::Error> {
        self.failure.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl Drop for EdgeCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_gpiomon(path: &Path, chip: &str, line: u32) -> Result<Child> {
    let mut cmd = Command::new(path);
    cmd.arg(chip)
        .arg(line.to_string())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    info!("Executing: {:?}", cmd);

    cmd.spawn().with_context(|| {
        format!(
            "Failed to spawn {}. Make sure libgpiod tools are installed",
            path.display()
        )
    })
}

/// Collect the monitor's exit status once its output has ended
fn reap_monitor(child: &Mutex<Option<Child>>) -> Result<()> {
    let Some(mut child) = child.lock().ok().and_then(|mut slot| slot.take()) else {
        return Ok(());
    };
    let status = child.wait().context("Failed to wait for gpiomon")?;
    if !status.success() {
        bail!("gpiomon exited with {}", status);
    }
    Ok(())
}

/// Main capture loop (runs in dedicated thread)
fn run_capture(
    reader: Box<dyn Read + Send>,
    rising_offset_us: i64,
    running: Arc<AtomicBool>,
    stats: Arc<CaptureStats>,
    frame_tx: &Sender<RawFrame>,
) -> Result<()> {
    let mut demod = Demodulator::new(rising_offset_us);
    let mut lines = BufReader::new(reader).lines();

    let mut last_stats_time = Instant::now();
    let mut first_edge = true;

    while running.load(Ordering::SeqCst) {
        let line = match lines.next() {
            Some(line) => line.context("Failed to read edge source")?,
            None => {
                info!("Edge source closed (EOF)");
                break;
            }
        };

        let Some(edge) = parse_edge_line(&line) else {
            if !line.trim().is_empty() {
                stats.unparsed_lines.fetch_add(1, Ordering::Relaxed);
                debug!("Ignoring edge source line: {}", line.trim());
            }
            continue;
        };

        if first_edge {
            info!("First edge received, capture is live");
            first_edge = false;
        }

        if let Some(frame) = demod.on_edge(edge) {
            debug!(">>> FRAME: *{}; at {}us", frame.to_hex(), frame.tick_us);

            if frame_tx.try_send(frame).is_err() {
                stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Frame channel full, dropping frame");
            }
        }

        stats.edges.store(demod.stats.edges, Ordering::Relaxed);
        stats
            .preambles_detected
            .store(demod.stats.preambles_detected, Ordering::Relaxed);
        stats
            .timing_errors
            .store(demod.stats.timing_errors, Ordering::Relaxed);
        stats
            .frames_detected
            .store(demod.stats.frames_emitted, Ordering::Relaxed);

        if last_stats_time.elapsed() >= Duration::from_secs(60) {
            info!(
                "[Capture Stats] Edges: {} | Preambles: {} | Frames: {} | Timing errors: {}",
                demod.stats.edges,
                demod.stats.preambles_detected,
                demod.stats.frames_emitted,
                demod.stats.timing_errors
            );
            last_stats_time = Instant::now();
        }
    }

    if demod.accumulated_bits() > 0 {
        debug!(
            "Discarding partial frame: {} bits in {:?} state",
            demod.accumulated_bits(),
            demod.state()
        );
    }
    info!("Edge capture stopped");
    info!(
        "Final stats: Edges={}, Preambles={}, Frames={}, Timing errors={}, Dropped={}",
        demod.stats.edges,
        demod.stats.preambles_detected,
        demod.stats.frames_emitted,
        demod.stats.timing_errors,
        stats.frames_dropped.load(Ordering::Relaxed)
    );

    Ok(())
}
