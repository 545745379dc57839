//! Signal edges and the line formats edge sources emit
//!
//! Supported inputs:
//! - libgpiod v1 `gpiomon`: `event:  RISING EDGE offset: 4 timestamp: [    1620.123456789]`
//! - libgpiod v2 `gpiomon`: `1620.123456789	rising	"gpiochip0 4"`
//! - replay files: `<level 0|1> <timestamp µs>`, `#` starts a comment

use std::fmt;

/// Level the line switched to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Rising,
    Falling,
}

impl Level {
    /// Bit implied by a pulse that ends on this edge
    #[inline]
    pub fn bit(self) -> u8 {
        match self {
            Self::Rising => 1,
            Self::Falling => 0,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rising => f.write_str("rising"),
            Self::Falling => f.write_str("falling"),
        }
    }
}

/// One transition on the monitored line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub level: Level,
    pub tick_us: i64,
}

impl EdgeEvent {
    pub fn new(level: Level, tick_us: i64) -> Self {
        Self { level, tick_us }
    }
}

/// Parse one line of edge-source output
/// Returns `None` for lines that carry no edge (banners, comments, garbage)
pub fn parse_edge_line(line: &str) -> Option<EdgeEvent> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    parse_replay_line(line).or_else(|| parse_gpiomon_line(line))
}

/// `<0|1> <µs>`
fn parse_replay_line(line: &str) -> Option<EdgeEvent> {
    let mut fields = line.split_whitespace();
    let level = match fields.next()? {
        "1" => Level::Rising,
        "0" => Level::Falling,
        _ => return None,
    };
    let tick_us = fields.next()?.parse::<i64>().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some(EdgeEvent::new(level, tick_us))
}

/// Either gpiomon dialect: a level word plus `seconds.fraction`
fn parse_gpiomon_line(line: &str) -> Option<EdgeEvent> {
    let lower = line.to_ascii_lowercase();
    let level = if lower.contains("rising") {
        Level::Rising
    } else if lower.contains("falling") {
        Level::Falling
    } else {
        return None;
    };

    let tick_us = lower
        .split(|c: char| c.is_whitespace() || c == '[' || c == ']')
        .filter(|token| token.contains('.'))
        .find_map(seconds_to_micros)?;

    Some(EdgeEvent::new(level, tick_us))
}

/// `1620.123456789` → 1_620_123_456 µs, without going through f64
fn seconds_to_micros(token: &str) -> Option<i64> {
    let (secs, frac) = token.split_once('.')?;
    if secs.is_empty() || frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let secs: i64 = secs.parse().ok()?;

    let micros = frac
        .bytes()
        .chain(std::iter::repeat(b'0'))
        .take(6)
        .fold(0i64, |acc, digit| acc * 10 + (digit - b'0') as i64);

    secs.checked_mul(1_000_000)?.checked_add(micros)
}
