//! Output format constants and input classification tables.

use std::path::Path;

/// Extension (without the dot) every output file must carry.
pub const OUTPUT_EXTENSION: &str = "webm";

/// VP9 encoder with alpha support.
pub const VIDEO_CODEC: &str = "libvpx-vp9";

/// Pixel format carrying an alpha plane.
pub const PIXEL_FORMAT: &str = "yuva420p";

/// Longest edge of the scaled output, aspect ratio preserved.
pub const MAX_DIMENSION: u32 = 512;

/// Highest CRF accepted by libvpx-vp9.
pub const MAX_QUALITY: u8 = 63;

/// Containers whose progress is tracked by frame counter rather than timestamp.
pub fn frame_counted_extensions() -> &'static [&'static str] {
    &["mov"]
}

/// Still-image formats that can make up a numbered sequence.
pub fn sequence_image_extensions() -> &'static [&'static str] {
    &["png", "tga", "tif", "tiff"]
}

fn extension_of(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Check whether the input is a container that reports progress in frames.
pub fn is_frame_counted(path: &str) -> bool {
    extension_of(path)
        .map(|ext| frame_counted_extensions().contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Check whether the file is a still image usable as a sequence member.
pub fn is_sequence_image(path: &str) -> bool {
    extension_of(path)
        .map(|ext| sequence_image_extensions().contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Check whether the output path carries the required container extension.
pub fn has_output_extension(path: &str) -> bool {
    extension_of(path).as_deref() == Some(OUTPUT_EXTENSION)
}

/// The fixed filter chain: frame-rate normalization, bounded scale, alpha pixel format.
pub fn filter_chain(frame_rate: u32) -> String {
    format!(
        "fps={fr},scale={dim}:{dim}:force_original_aspect_ratio=decrease,format={pix}",
        fr = frame_rate,
        dim = MAX_DIMENSION,
        pix = PIXEL_FORMAT,
    )
}
