//! Configuration from the command line, with environment fallbacks

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::et73x::TemperatureUnit;
use crate::rf::{CaptureConfig, EdgeSource};
use crate::sensor_registry::RegistryConfig;
use crate::sink::SinkKind;

/// Receives ET-732/ET-733 wireless BBQ thermometer telegrams via a 433 MHz receiver
#[derive(Debug, Clone, Parser)]
#[command(name = "et73x-capture", version, about)]
pub struct Config {
    /// GPIO line offset the receiver data pin is wired to
    #[arg(long, env = "EDGE_PIN", default_value_t = 4)]
    pub pin: u32,

    /// GPIO chip holding the line
    #[arg(long, env = "GPIO_CHIP", default_value = "gpiochip0")]
    pub chip: String,

    /// Path to the libgpiod gpiomon executable
    #[arg(long, env = "GPIOMON_PATH", default_value = "gpiomon")]
    pub gpiomon_path: PathBuf,

    /// Read recorded edges (`<0|1> <µs>` or gpiomon output) instead of gpiomon, `-` for stdin
    #[arg(long, env = "EDGE_REPLAY")]
    pub replay: Option<PathBuf>,

    /// Offset added to rising edges in µs, depends on the receiver
    #[arg(long, env = "EDGE_OFFSET_US", default_value_t = -80, allow_negative_numbers = true)]
    pub offset: i64,

    /// Report temperatures in Fahrenheit
    #[arg(long, env = "FAHRENHEIT")]
    pub fahrenheit: bool,

    /// Always register new sender ids, not only from init telegrams
    #[arg(long)]
    pub nosync: bool,

    /// Seconds before a repeat from the same sender counts as a new reading
    #[arg(long, env = "COOL_DOWN_SECS", default_value_t = 5)]
    pub cool_down_secs: u64,

    /// Forget senders silent for this many seconds (default: never)
    #[arg(long, env = "FORGET_AFTER_SECS")]
    pub forget_after_secs: Option<u64>,

    /// Append readings to a text log with `<br>` line ends
    #[arg(long, num_args = 0..=1, default_missing_value = "et73x.html")]
    pub html: Option<PathBuf>,

    /// Append readings to a JSON lines log
    #[arg(long, num_args = 0..=1, default_missing_value = "et73x.json")]
    pub json: Option<PathBuf>,

    /// Print every reading to stdout
    #[arg(long)]
    pub verbose: bool,

    /// Debug logging (`RUST_LOG` takes precedence)
    #[arg(long)]
    pub debug: bool,

    /// Capacity of the frame and sink queues
    #[arg(long, env = "QUEUE_CAPACITY", default_value_t = 1000)]
    pub queue_capacity: usize,

    /// Decode a single frame given as 26 hex digits (one per group) and exit
    #[arg(long, value_name = "HEX")]
    pub decode: Option<String>,
}

impl Config {
    pub fn unit(&self) -> TemperatureUnit {
        if self.fahrenheit {
            TemperatureUnit::Fahrenheit
        } else {
            TemperatureUnit::Celsius
        }
    }

    pub fn capture(&self) -> CaptureConfig {
        let source = match &self.replay {
            Some(path) => EdgeSource::Replay(path.clone()),
            None => EdgeSource::Gpiomon {
                path: self.gpiomon_path.clone(),
                chip: self.chip.clone(),
                line: self.pin,
            },
        };

        CaptureConfig {
            source,
            rising_offset_us: self.offset,
            queue_capacity: self.queue_capacity,
        }
    }

    pub fn registry(&self) -> RegistryConfig {
        RegistryConfig {
            cool_down: Duration::from_secs(self.cool_down_secs),
            always_register: self.nosync,
            forget_after: self.forget_after_secs.map(Duration::from_secs),
        }
    }

    pub fn sinks(&self) -> Vec<SinkKind> {
        let mut sinks = Vec::new();
        if self.verbose {
            sinks.push(SinkKind::Console);
        }
        if let Some(path) = &self.html {
            sinks.push(SinkKind::TextLog(path.clone()));
        }
        if let Some(path) = &self.json {
            sinks.push(SinkKind::JsonLog(path.clone()));
        }
        sinks
    }
}
