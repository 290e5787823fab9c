//! Conversion task definition.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ConversionError;
use super::formats;

/// Unique identifier for a conversion task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new unique task ID.
    pub fn new() -> Self {
        TaskId(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Parameters of one conversion. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRequest {
    /// Input file, or a sequence pattern such as `shot_%04d.png`
    pub input: String,
    /// Output file, must end in `.webm`
    pub output: String,
    /// Output frame rate
    pub frame_rate: u32,
    /// Constant rate factor handed to the encoder
    pub quality: u8,
    /// Target bitrate passed verbatim to `-b:v`; `None` or zero leaves it to the encoder
    pub bitrate: Option<u32>,
}

impl ConversionRequest {
    /// Create a request with default frame rate and quality.
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            frame_rate: 24,
            quality: 30,
            bitrate: None,
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_bitrate(mut self, bitrate: Option<u32>) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// The bitrate to pass to the encoder, if any. Zero counts as unset.
    pub fn effective_bitrate(&self) -> Option<u32> {
        self.bitrate.filter(|b| *b > 0)
    }

    /// Check whether the quality factor is within the codec's range.
    pub fn quality_in_range(&self) -> bool {
        self.quality <= formats::MAX_QUALITY
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Submitted, worker not started yet
    Pending,
    /// Checking encoder, paths and media totals
    Validating,
    /// Building the command and spawning the encoder
    Launching,
    /// Encoder process is running
    Running,
    /// Encoder exited successfully
    Completed,
    /// Validation, launch or encoding failed
    Failed,
    /// Encoder was terminated on request
    Cancelled,
}

impl TaskStatus {
    /// Check if the task is finished (completed, failed, or cancelled).
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Get a display string for the status.
    pub fn display(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Validating => "Validating",
            TaskStatus::Launching => "Launching",
            TaskStatus::Running => "Converting",
            TaskStatus::Completed => "Done",
            TaskStatus::Failed => "Failed",
            TaskStatus::Cancelled => "Cancelled",
        }
    }
}

/// Progress update for a running task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    pub task_id: TaskId,
    /// Estimated percentage complete (0.0 - 100.0)
    pub percent: f64,
}

/// How a task ended.
#[derive(Debug)]
pub enum Outcome {
    /// Output written to the given path
    Success(PathBuf),
    Failure(ConversionError),
    Cancelled,
}

impl Outcome {
    /// The terminal status this outcome corresponds to.
    pub fn status(&self) -> TaskStatus {
        match self {
            Outcome::Success(_) => TaskStatus::Completed,
            Outcome::Failure(_) => TaskStatus::Failed,
            Outcome::Cancelled => TaskStatus::Cancelled,
        }
    }
}

/// The last event published for a task.
#[derive(Debug)]
pub struct TerminalEvent {
    pub task_id: TaskId,
    pub outcome: Outcome,
}

/// Events published by the supervisor.
#[derive(Debug)]
pub enum ConversionEvent {
    Progress(ProgressEvent),
    Finished(TerminalEvent),
}

impl ConversionEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            ConversionEvent::Progress(p) => p.task_id,
            ConversionEvent::Finished(t) => t.task_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_ids_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
    }

    #[test]
    fn test_zero_bitrate_is_unset() {
        let request = ConversionRequest::new("in.mov", "out.webm");
        assert_eq!(request.effective_bitrate(), None);
        assert_eq!(request.clone().with_bitrate(Some(0)).effective_bitrate(), None);
        assert_eq!(request.with_bitrate(Some(4000)).effective_bitrate(), Some(4000));
    }

    #[test]
    fn test_status_finished() {
        assert!(!TaskStatus::Pending.is_finished());
        assert!(!TaskStatus::Running.is_finished());
        assert!(TaskStatus::Completed.is_finished());
        assert!(TaskStatus::Failed.is_finished());
        assert!(TaskStatus::Cancelled.is_finished());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TaskStatus::Validating.display(), "Validating");
        assert_eq!(TaskStatus::Running.display(), "Converting");
        assert_eq!(TaskStatus::Completed.display(), "Done");
    }

    #[test]
    fn test_outcome_status() {
        assert_eq!(Outcome::Cancelled.status(), TaskStatus::Cancelled);
        assert_eq!(Outcome::Success(PathBuf::from("out.webm")).status(), TaskStatus::Completed);
    }
}
