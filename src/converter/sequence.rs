//! Numbered image sequence patterns.
//!
//! A sequence is addressed by a printf-style pattern such as `shot_%04d.png`,
//! the same form FFmpeg's image2 demuxer accepts.

use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use super::formats;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"%0?\d*d").unwrap());

static NUMBERED_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)([._])(\d+)(\.\w+)$").unwrap());

/// Check whether the input contains exactly one numeric placeholder.
pub fn is_sequence_pattern(input: &str) -> bool {
    PLACEHOLDER.find_iter(input).count() == 1
}

/// Derive the sequence pattern from one concrete member of the sequence.
///
/// `renders/shot_0001.png` becomes `renders/shot_%04d.png`. Returns `None`
/// for files that are not numbered still images.
pub fn derive_pattern(sample: &str) -> Option<String> {
    if !formats::is_sequence_image(sample) {
        return None;
    }
    let caps = NUMBERED_FILE.captures(sample)?;
    Some(format!(
        "{}{}%0{}d{}",
        &caps[1],
        &caps[2],
        caps[3].len(),
        &caps[4]
    ))
}

/// Base name for an input, with any placeholder and the separator before it
/// removed.
///
/// `renders/shot_%04d.png` gives `shot` and `clip.mov` gives `clip`.
pub fn base_name(input: &str) -> Option<String> {
    let stem = Path::new(input).file_stem()?.to_string_lossy();
    let stem = PLACEHOLDER.replace_all(&stem, "");
    let stem = stem.trim_end_matches(['_', '.', '-']);
    (!stem.is_empty()).then(|| stem.to_string())
}

/// Build a matcher for file names belonging to the sequence.
fn file_name_matcher(file_pattern: &str) -> Option<Regex> {
    let placeholder = PLACEHOLDER.find(file_pattern)?;
    let prefix = regex::escape(&file_pattern[..placeholder.start()]);
    let suffix = regex::escape(&file_pattern[placeholder.end()..]);
    Regex::new(&format!(r"^{}\d+{}$", prefix, suffix)).ok()
}

/// List the files on disk matching a sequence pattern, sorted by name.
///
/// A missing directory yields an empty list.
pub fn matching_files(pattern: &str) -> Vec<PathBuf> {
    let path = Path::new(pattern);
    let Some(file_pattern) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
        return Vec::new();
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let Some(matcher) = file_name_matcher(&file_pattern) else {
        return Vec::new();
    };

    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "Sequence directory not readable");
            return Vec::new();
        }
    };

    let mut matches: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| matcher.is_match(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.path())
        .collect();
    matches.sort();
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_pattern() {
        assert_eq!(derive_pattern("shot_0001.png").as_deref(), Some("shot_%04d.png"));
        assert_eq!(
            derive_pattern("/renders/fx.v2.00120.png").as_deref(),
            Some("/renders/fx.v2.%05d.png")
        );
        assert_eq!(derive_pattern("clip_0001.mov"), None);
        assert_eq!(derive_pattern("poster.png"), None);
    }

    #[test]
    fn test_is_sequence_pattern() {
        assert!(is_sequence_pattern("img_%03d.png"));
        assert!(is_sequence_pattern("img_%d.png"));
        assert!(!is_sequence_pattern("img_001.png"));
        assert!(!is_sequence_pattern("%03d_%03d.png"));
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("/renders/shot_%04d.png").as_deref(), Some("shot"));
        assert_eq!(base_name("fx.v2.%05d.png").as_deref(), Some("fx.v2"));
        assert_eq!(base_name("clip.mov").as_deref(), Some("clip"));
        assert_eq!(base_name("%04d.png"), None);
        assert_eq!(base_name(""), None);
    }

    #[test]
    fn test_matching_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for i in [3, 1, 10, 2] {
            fs::write(dir.path().join(format!("img_{:03}.png", i)), b"").unwrap();
        }
        fs::write(dir.path().join("img_cover.png"), b"").unwrap();
        fs::write(dir.path().join("other_001.png"), b"").unwrap();

        let pattern = dir.path().join("img_%03d.png");
        let files = matching_files(&pattern.to_string_lossy());
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["img_001.png", "img_002.png", "img_003.png", "img_010.png"]);
    }

    #[test]
    fn test_matching_files_missing_dir() {
        assert!(matching_files("/definitely/not/here/img_%03d.png").is_empty());
    }
}
