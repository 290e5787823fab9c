//! Completion estimates from FFmpeg's diagnostic output.
//!
//! FFmpeg's stats line is not a stable interface, so everything here is
//! best-effort: a line that does not parse simply yields no estimate.

use once_cell::sync::Lazy;
use regex::Regex;

use super::formats;
use super::probe::MediaInfo;
use super::sequence;

static FRAME_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"frame=\s*(\d+)").unwrap());

static TIME_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"time=(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").unwrap());

/// Which counter in the stats line drives the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// `frame=` against the total frame count (sequences, frame-counted containers)
    Frames,
    /// `time=` against the total duration
    Timed,
}

impl ProgressMode {
    /// Pick the mode for an input path or sequence pattern.
    pub fn for_input(input: &str) -> Self {
        if sequence::is_sequence_pattern(input) || formats::is_frame_counted(input) {
            ProgressMode::Frames
        } else {
            ProgressMode::Timed
        }
    }

    /// Whether the media info carries the total this mode divides by.
    pub fn has_total(&self, media: &MediaInfo) -> bool {
        match self {
            ProgressMode::Frames => media.frame_count.is_some_and(|n| n > 0),
            ProgressMode::Timed => media.duration.is_some_and(|d| d > 0.0),
        }
    }
}

/// Parse an `HH:MM:SS.frac` timestamp into seconds.
pub fn parse_timestamp(hours: &str, minutes: &str, seconds: &str) -> Option<f64> {
    let h: f64 = hours.parse().ok()?;
    let m: f64 = minutes.parse().ok()?;
    let s: f64 = seconds.parse().ok()?;
    Some(h * 3600.0 + m * 60.0 + s)
}

/// Estimate the completed fraction (0.0 - 1.0) from one diagnostic line.
///
/// Returns `None` when the line has no matching counter or the total the
/// mode needs is unknown.
pub fn parse_progress(line: &str, mode: ProgressMode, media: &MediaInfo) -> Option<f64> {
    match mode {
        ProgressMode::Frames => {
            let total = media.frame_count.filter(|n| *n > 0)?;
            let caps = FRAME_TOKEN.captures(line)?;
            let frame: u64 = caps[1].parse().ok()?;
            Some((frame as f64 / total as f64).min(1.0))
        }
        ProgressMode::Timed => {
            let total = media.duration.filter(|d| *d > 0.0)?;
            let caps = TIME_TOKEN.captures(line)?;
            let elapsed = parse_timestamp(&caps[1], &caps[2], &caps[3])?;
            Some((elapsed / total).min(1.0))
        }
    }
}
