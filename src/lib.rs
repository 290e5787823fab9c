//! WebM Converter Library
//!
//! Supervises FFmpeg to turn image sequences and video files into VP9 WebM
//! with an alpha channel, with progress events and cancellation.

pub mod converter;
pub mod settings;
pub mod telemetry;

pub use converter::{
    ConversionError, ConversionEvent, ConversionRequest, ConversionSupervisor, MediaInfo, Outcome,
    ProgressEvent, TaskId, TaskStatus, TerminalEvent, ValidationError,
};
pub use settings::{ConverterSettings, SettingsError};
