//! Conversion between seconds and subtitle timestamps.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Separator between start and end on an SRT timing line.
pub const ARROW: &str = "-->";

static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{2,}):(\d{2}):(\d{2})[,.](\d{3})\s*$").expect("valid timestamp regex")
});

/// Milliseconds in `seconds`, flooring fractional milliseconds.
///
/// A tolerance of one nanosecond absorbs f64 representation error, so `0.29`
/// (stored as `0.28999…`) still lands on 290 ms while `1.9999995` stays at
/// 1999 ms.
fn total_millis(seconds: f64) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * 1_000.0 + 1e-6).floor() as u64
}

fn split_millis(total_ms: u64) -> (u64, u64, u64, u64) {
    let ms = total_ms % 1_000;
    let total_s = total_ms / 1_000;
    let s = total_s % 60;
    let total_m = total_s / 60;
    (total_m / 60, total_m % 60, s, ms)
}

/// Format seconds as an SRT timestamp: `HH:MM:SS,mmm`.
///
/// Negative and non-finite input clamps to zero.
pub fn seconds_to_timestamp(seconds: f64) -> String {
    let (h, m, s, ms) = split_millis(total_millis(seconds));
    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}

/// Format seconds as a WebVTT timestamp: `HH:MM:SS.mmm`.
pub fn seconds_to_vtt_timestamp(seconds: f64) -> String {
    let (h, m, s, ms) = split_millis(total_millis(seconds));
    format!("{h:02}:{m:02}:{s:02}.{ms:03}")
}

/// Parse a single `HH:MM:SS,mmm` (or `HH:MM:SS.mmm`) timestamp into seconds.
pub fn timestamp_to_seconds(ts: &str) -> Result<f64> {
    let caps = TIMESTAMP
        .captures(ts)
        .ok_or_else(|| Error::Format(ts.to_string()))?;

    let field = |i: usize| -> Result<u64> {
        caps[i]
            .parse::<u64>()
            .map_err(|_| Error::Format(ts.to_string()))
    };

    let (h, m, s, ms) = (field(1)?, field(2)?, field(3)?, field(4)?);
    if m >= 60 || s >= 60 {
        return Err(Error::Format(ts.to_string()));
    }

    let total_ms = h
        .checked_mul(3_600_000)
        .and_then(|t| t.checked_add(m * 60_000 + s * 1_000 + ms))
        .ok_or_else(|| Error::Format(ts.to_string()))?;
    Ok(total_ms as f64 / 1_000.0)
}

/// Parse an SRT timing line (`start --> end`) into seconds.
pub fn parse_timing_line(line: &str) -> Result<(f64, f64)> {
    let mut parts = line.split(ARROW);
    let (Some(start), Some(end), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(Error::Format(line.to_string()));
    };
    Ok((timestamp_to_seconds(start)?, timestamp_to_seconds(end)?))
}

/// Whether `line` is a well-formed SRT timing line.
pub fn is_timing_line(line: &str) -> bool {
    parse_timing_line(line).is_ok()
}
