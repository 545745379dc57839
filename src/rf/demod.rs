//! Edge-timing demodulator for the ET-73x on-off-keyed line code
//!
//! Telegram timing (all durations edge to edge):
//! - > 4000µs idle before a rising edge starts the preamble
//! - preamble pulses are short (200-300µs)
//! - a long pulse (400-600µs) ends the preamble and seeds bits `1, 0`
//! - data: a long pulse appends the bit of the level that just ended,
//!   a short pulse is the second half of a cell and only repeats the
//!   previous bit when it matches
//!
//! All windows are open intervals.

use chrono::Utc;
use tracing::trace;

use super::edge::{EdgeEvent, Level};
use crate::et73x::{RawFrame, FRAME_BITS};

/// Idle time that marks the start of a preamble
const PREAMBLE_IDLE_US: i64 = 4000;

/// Short (half-cell) pulse window
const SHORT_MIN_US: i64 = 200;
const SHORT_MAX_US: i64 = 300;

/// Long (full-cell) pulse window
const LONG_MIN_US: i64 = 400;
const LONG_MAX_US: i64 = 600;

/// Demodulator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemodState {
    Wait,
    Preamble,
    Data,
}

/// Pulse classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pulse {
    Short,
    Long,
    Invalid,
}

impl Pulse {
    #[inline]
    fn classify(duration_us: i64) -> Self {
        if duration_us > SHORT_MIN_US && duration_us < SHORT_MAX_US {
            Self::Short
        } else if duration_us > LONG_MIN_US && duration_us < LONG_MAX_US {
            Self::Long
        } else {
            Self::Invalid
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct DemodStats {
    pub edges: u64,
    pub preambles_detected: u64,
    pub timing_errors: u64,
    pub frames_emitted: u64,
}

/// Demodulator for one monitored line
pub struct Demodulator {
    state: DemodState,
    /// Received bits, first bit most significant
    bits: u128,
    bit_count: usize,
    last_bit: u8,
    previous_tick: Option<i64>,
    /// Correction added to rising-edge timestamps (receiver skew)
    rising_offset_us: i64,
    pub stats: DemodStats,
}

impl Demodulator {
    pub fn new(rising_offset_us: i64) -> Self {
        Self {
            state: DemodState::Wait,
            bits: 0,
            bit_count: 0,
            last_bit: 0,
            previous_tick: None,
            rising_offset_us,
            stats: DemodStats::default(),
        }
    }

    pub fn state(&self) -> DemodState {
        self.state
    }

    /// Number of bits collected for the frame in progress
    pub fn accumulated_bits(&self) -> usize {
        self.bit_count
    }

    /// Feed one edge; returns a frame when the 104th bit arrives
    pub fn on_edge(&mut self, edge: EdgeEvent) -> Option<RawFrame> {
        self.stats.edges += 1;

        let tick = match edge.level {
            Level::Rising => edge.tick_us + self.rising_offset_us,
            Level::Falling => edge.tick_us,
        };

        let Some(previous) = self.previous_tick.replace(tick) else {
            return None;
        };
        let duration = tick - previous;

        trace!("edge {} after {}us in {:?}", edge.level, duration, self.state);

        match self.state {
            DemodState::Wait => {
                if edge.level == Level::Rising && duration > PREAMBLE_IDLE_US {
                    self.state = DemodState::Preamble;
                }
            }
            DemodState::Preamble => match Pulse::classify(duration) {
                Pulse::Long => {
                    self.state = DemodState::Data;
                    self.stats.preambles_detected += 1;
                    self.bits = 0;
                    self.bit_count = 0;
                    self.push_bit(1);
                    self.push_bit(0);
                    self.last_bit = 1;
                }
                Pulse::Short => {}
                Pulse::Invalid => self.reset(),
            },
            DemodState::Data => {
                let bit = edge.level.bit();
                match Pulse::classify(duration) {
                    Pulse::Short => {
                        if self.last_bit == bit {
                            self.push_bit(bit);
                        }
                    }
                    Pulse::Long => {
                        self.push_bit(bit);
                        self.last_bit = bit;
                    }
                    Pulse::Invalid => {
                        trace!(
                            "timing error: {}us {} edge after {} bits",
                            duration,
                            edge.level,
                            self.bit_count
                        );
                        self.stats.timing_errors += 1;
                        self.reset();
                    }
                }
            }
        }

        if self.bit_count == FRAME_BITS {
            let frame = RawFrame::new(self.bits, edge.tick_us, Utc::now());
            self.stats.frames_emitted += 1;
            self.reset();
            return Some(frame);
        }

        None
    }

    #[inline]
    fn push_bit(&mut self, bit: u8) {
        self.bits = (self.bits << 1) | bit as u128;
        self.bit_count += 1;
    }

    fn reset(&mut self) {
        self.state = DemodState::Wait;
        self.bits = 0;
        self.bit_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME_HEX: &str = "9AA5696A959955555569A56996";

    fn frame_bits(hex: &str) -> Vec<u8> {
        hex.chars()
            .map(|c| c.to_digit(16).unwrap() as u8)
            .flat_map(|nibble| (0..4).rev().map(move |i| (nibble >> i) & 1))
            .collect()
    }

    /// Synthesize edges for a frame; `bits` must start with `1, 0`
    ///
    /// A repeated bit takes a short pulse that appends nothing followed by a
    /// long pulse, or with `short_repeats` a second short pulse.
    fn edges_for(bits: &[u8], short: i64, long: i64) -> Vec<EdgeEvent> {
        encode(bits, short, long, false)
    }

    fn encode(bits: &[u8], short: i64, long: i64, short_repeats: bool) -> Vec<EdgeEvent> {
        assert_eq!(&bits[..2], &[1, 0]);

        let mut t = 1_000;
        let mut edges = vec![EdgeEvent::new(Level::Falling, t)];
        let mut push = |edges: &mut Vec<EdgeEvent>, level, dt| {
            t += dt;
            edges.push(EdgeEvent::new(level, t));
        };

        // idle, then preamble pulses, then the long pulse that starts data
        push(&mut edges, Level::Rising, 5_000);
        push(&mut edges, Level::Falling, short);
        push(&mut edges, Level::Rising, short);
        push(&mut edges, Level::Falling, short);
        push(&mut edges, Level::Rising, long);

        let mut level = Level::Rising;
        let mut last_bit = 1;
        for &bit in &bits[2..] {
            let mut next = opposite(level);
            if next.bit() != bit {
                // half-cell that appends nothing
                assert_eq!(last_bit, bit);
                push(&mut edges, next, short);
                level = next;
                next = opposite(level);
                push(&mut edges, next, if short_repeats { short } else { long });
            } else {
                push(&mut edges, next, long);
            }
            level = next;
            last_bit = bit;
        }
        edges
    }

    fn opposite(level: Level) -> Level {
        match level {
            Level::Rising => Level::Falling,
            Level::Falling => Level::Rising,
        }
    }

    fn run(demod: &mut Demodulator, edges: &[EdgeEvent]) -> Vec<RawFrame> {
        edges.iter().filter_map(|e| demod.on_edge(*e)).collect()
    }

    #[test]
    fn test_decodes_synthetic_frame() {
        let bits = frame_bits(FRAME_HEX);
        let mut demod = Demodulator::new(0);
        let frames = run(&mut demod, &edges_for(&bits, 250, 500));

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].to_hex(), FRAME_HEX);
        assert_eq!(demod.state(), DemodState::Wait);
        assert_eq!(demod.accumulated_bits(), 0);
        assert_eq!(demod.stats.frames_emitted, 1);
        assert_eq!(demod.stats.preambles_detected, 1);
    }

    /// Demodulator in `Data` right after the preamble, last edge rising at 5750
    fn after_preamble() -> Demodulator {
        let mut demod = Demodulator::new(0);
        run(
            &mut demod,
            &[
                EdgeEvent::new(Level::Falling, 0),
                EdgeEvent::new(Level::Rising, 5_000),
                EdgeEvent::new(Level::Falling, 5_250),
                EdgeEvent::new(Level::Rising, 5_750),
            ],
        );
        assert_eq!(demod.state(), DemodState::Data);
        assert_eq!(demod.accumulated_bits(), 2);
        demod
    }

    #[test]
    fn test_short_falling_pulse_repeats_zero() {
        let mut demod = after_preamble();
        demod.on_edge(EdgeEvent::new(Level::Falling, 6_250));
        assert_eq!(demod.accumulated_bits(), 3);

        // first half-cell of the next zero appends nothing
        demod.on_edge(EdgeEvent::new(Level::Rising, 6_500));
        assert_eq!(demod.accumulated_bits(), 3);

        demod.on_edge(EdgeEvent::new(Level::Falling, 6_750));
        assert_eq!(demod.accumulated_bits(), 4);
        assert_eq!(demod.bits, 0b1000);
        assert_eq!(demod.state(), DemodState::Data);
    }

    #[test]
    fn test_short_rising_pulse_repeats_one() {
        let mut demod = after_preamble();
        demod.on_edge(EdgeEvent::new(Level::Falling, 6_250));
        demod.on_edge(EdgeEvent::new(Level::Rising, 6_750));
        assert_eq!(demod.accumulated_bits(), 4);

        demod.on_edge(EdgeEvent::new(Level::Falling, 7_000));
        assert_eq!(demod.accumulated_bits(), 4);

        demod.on_edge(EdgeEvent::new(Level::Rising, 7_250));
        assert_eq!(demod.accumulated_bits(), 5);
        assert_eq!(demod.bits, 0b10011);
        assert_eq!(demod.state(), DemodState::Data);
    }

    #[test]
    fn test_decodes_frame_with_short_repeats() {
        let bits = frame_bits(FRAME_HEX);
        let long_repeats = edges_for(&bits, 250, 500);
        let short_repeats = encode(&bits, 250, 500, true);
        assert_eq!(long_repeats.len(), short_repeats.len());
        assert!(short_repeats.last().unwrap().tick_us < long_repeats.last().unwrap().tick_us);

        let mut demod = Demodulator::new(0);
        let frames = run(&mut demod, &short_repeats);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].to_hex(), FRAME_HEX);
        assert_eq!(demod.stats.timing_errors, 0);
    }

    #[test]
    fn test_timing_jitter_inside_windows() {
        let bits = frame_bits(FRAME_HEX);
        let mut demod = Demodulator::new(0);
        let frames = run(&mut demod, &edges_for(&bits, 299, 401));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].to_hex(), FRAME_HEX);
    }

    #[test]
    fn test_window_bounds_are_exclusive() {
        let bits = frame_bits(FRAME_HEX);

        for (short, long) in [(300, 500), (250, 600), (200, 500), (250, 400)] {
            let mut demod = Demodulator::new(0);
            let frames = run(&mut demod, &edges_for(&bits, short, long));
            assert!(frames.is_empty(), "short={} long={}", short, long);
            assert_eq!(demod.state(), DemodState::Wait);
        }
    }

    #[test]
    fn test_rising_offset_is_applied() {
        let bits = frame_bits(FRAME_HEX);
        // rising edges arrive 80µs late: the pulse before each rising edge
        // looks longer, the one after looks shorter
        let skewed: Vec<EdgeEvent> = edges_for(&bits, 250, 500)
            .into_iter()
            .map(|e| match e.level {
                Level::Rising => EdgeEvent::new(e.level, e.tick_us + 80),
                Level::Falling => e,
            })
            .collect();

        let mut uncorrected = Demodulator::new(0);
        assert!(run(&mut uncorrected, &skewed).is_empty());

        let mut corrected = Demodulator::new(-80);
        let frames = run(&mut corrected, &skewed);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].to_hex(), FRAME_HEX);
    }

    #[test]
    fn test_timing_error_discards_partial_frame() {
        let bits = frame_bits(FRAME_HEX);
        let edges = edges_for(&bits, 250, 500);
        let mut demod = Demodulator::new(0);

        run(&mut demod, &edges[..40]);
        assert_eq!(demod.state(), DemodState::Data);
        assert!(demod.accumulated_bits() > 2);

        let last = edges[39];
        let glitch = EdgeEvent::new(
            match last.level {
                Level::Rising => Level::Falling,
                Level::Falling => Level::Rising,
            },
            last.tick_us + 350,
        );
        assert!(demod.on_edge(glitch).is_none());
        assert_eq!(demod.state(), DemodState::Wait);
        assert_eq!(demod.accumulated_bits(), 0);
        assert_eq!(demod.stats.timing_errors, 1);
    }

    #[test]
    fn test_preamble_needs_long_idle() {
        let mut demod = Demodulator::new(0);
        demod.on_edge(EdgeEvent::new(Level::Falling, 0));
        demod.on_edge(EdgeEvent::new(Level::Rising, 3_000));
        assert_eq!(demod.state(), DemodState::Wait);

        demod.on_edge(EdgeEvent::new(Level::Falling, 8_000));
        assert_eq!(demod.state(), DemodState::Wait, "falling edges never start a preamble");

        demod.on_edge(EdgeEvent::new(Level::Rising, 12_001));
        assert_eq!(demod.state(), DemodState::Preamble);

        demod.on_edge(EdgeEvent::new(Level::Falling, 12_251));
        assert_eq!(demod.state(), DemodState::Preamble);

        demod.on_edge(EdgeEvent::new(Level::Rising, 12_251 + 1_000));
        assert_eq!(demod.state(), DemodState::Wait);
    }

    #[test]
    fn test_back_to_back_frames() {
        let bits = frame_bits(FRAME_HEX);
        let first = edges_for(&bits, 250, 500);
        let end = first.last().unwrap().tick_us;
        let second: Vec<EdgeEvent> = edges_for(&bits, 250, 500)
            .into_iter()
            .map(|e| EdgeEvent::new(e.level, e.tick_us + end + 10_000))
            .collect();

        let mut demod = Demodulator::new(0);
        let mut frames = run(&mut demod, &first);
        frames.extend(run(&mut demod, &second));
        assert_eq!(frames.len(), 2);
        assert!(frames[1].tick_us > frames[0].tick_us);
    }
}
