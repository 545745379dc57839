//! Edge capture and ET-73x demodulation
//!
//! Pipeline on the capture thread:
//! 1. Read edge lines from gpiomon or a recording
//! 2. Parse them into timestamped edges
//! 3. Recover the bitstream from edge-to-edge timing
//! 4. Hand completed 104-bit frames to the worker

pub mod capture;
mod demod;
mod edge;

pub use capture::{CaptureConfig, EdgeCapture, EdgeSource};
