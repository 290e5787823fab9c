//! Source media totals used to turn encoder counters into percentages.

use std::path::Path;
use std::process::{Command, Stdio};

use once_cell::sync::Lazy;
use regex::Regex;

use super::progress::parse_timestamp;
use super::sequence;

static DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Duration: (\d+):(\d+):(\d+\.\d+)").unwrap());

static FRAME_RATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?) fps").unwrap());

/// Totals known about a source before conversion starts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MediaInfo {
    /// Total duration in seconds (if known)
    pub duration: Option<f64>,
    /// Total frames (if known)
    pub frame_count: Option<u64>,
}

impl MediaInfo {
    /// Totals for an image sequence of `count` files.
    pub fn from_frame_count(count: u64) -> Self {
        Self {
            duration: None,
            frame_count: Some(count),
        }
    }

    /// Check whether neither total could be resolved.
    pub fn is_empty(&self) -> bool {
        self.duration.is_none() && self.frame_count.is_none()
    }
}

/// Extract duration and frame count from the banner FFmpeg prints for `-i <file>`.
pub fn parse_media_info(diagnostics: &str) -> MediaInfo {
    let duration = DURATION
        .captures(diagnostics)
        .and_then(|caps| parse_timestamp(&caps[1], &caps[2], &caps[3]));

    let fps = FRAME_RATE
        .captures(diagnostics)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .filter(|fps| *fps > 0.0);

    let frame_count = match (duration, fps) {
        (Some(d), Some(f)) if d > 0.0 => Some((d * f).floor() as u64),
        _ => None,
    };

    MediaInfo {
        duration,
        frame_count,
    }
}

/// Count the files of a sequence pattern.
pub fn probe_sequence(pattern: &str) -> MediaInfo {
    let files = sequence::matching_files(pattern);
    if files.is_empty() {
        tracing::warn!(pattern, "No files match sequence pattern");
        return MediaInfo::default();
    }
    tracing::debug!(pattern, count = files.len(), "Resolved image sequence");
    MediaInfo::from_frame_count(files.len() as u64)
}

/// Ask the encoder to describe a media file.
///
/// FFmpeg exits with an error when given no output, but still prints the
/// input description first, so the exit status is ignored.
pub fn probe_media(encoder: &Path, input: &str) -> MediaInfo {
    let output = Command::new(encoder)
        .arg("-i")
        .arg(input)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output();

    match output {
        Ok(output) => {
            let diagnostics = String::from_utf8_lossy(&output.stderr);
            let info = parse_media_info(&diagnostics);
            if info.frame_count.is_none() {
                tracing::warn!(input, "Could not determine duration or frame count");
            }
            info
        }
        Err(e) => {
            tracing::warn!(input, error = %e, "Failed to run encoder in probe mode");
            MediaInfo::default()
        }
    }
}

/// Resolve totals for either a sequence pattern or a media file.
pub fn probe(encoder: &Path, input: &str) -> MediaInfo {
    if sequence::is_sequence_pattern(input) {
        probe_sequence(input)
    } else {
        probe_media(encoder, input)
    }
}
