//! WebM Conversion Module
//!
//! Converts image sequences and video files to VP9 WebM with alpha using FFmpeg.

mod diagnostics;
mod error;
pub mod ffmpeg;
pub mod formats;
mod job;
pub mod probe;
pub mod progress;
mod registry;
pub mod sequence;
mod supervisor;

pub use diagnostics::{DiagnosticLines, DiagnosticTail, TAIL_LINES};
pub use error::{ConversionError, ValidationError};
pub use job::{
    ConversionEvent, ConversionRequest, Outcome, ProgressEvent, TaskId, TaskStatus, TerminalEvent,
};
pub use probe::MediaInfo;
pub use progress::{parse_progress, ProgressMode};
pub use registry::{TaskRecord, TaskRegistry, TaskSummary};
pub use supervisor::{validate, ConversionSupervisor};
