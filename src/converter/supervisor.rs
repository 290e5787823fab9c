//! Conversion supervisor: one worker thread per task.
//!
//! Each submitted request is validated, launched and pumped on its own
//! thread. Progress and the final outcome are published on a shared event
//! channel, and a running encoder can be killed through [`ConversionSupervisor::cancel`].

use std::any::Any;
use std::io::{self, BufReader};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::diagnostics::{DiagnosticLines, DiagnosticTail};
use super::error::{ConversionError, ValidationError};
use super::ffmpeg::{self, ExitKind};
use super::formats;
use super::job::{
    ConversionEvent, ConversionRequest, Outcome, ProgressEvent, TaskId, TaskStatus, TerminalEvent,
};
use super::probe::{self, MediaInfo};
use super::progress::{parse_progress, ProgressMode};
use super::registry::TaskRegistry;
use super::sequence;

/// How often the worker polls for the encoder's exit once its output closed.
const REAP_INTERVAL: Duration = Duration::from_millis(20);

#[cfg(test)]
static PANIC_AFTER_SPAWN: AtomicBool = AtomicBool::new(false);

/// Check a request before anything is spawned.
///
/// Checks run in a fixed order and the first failure wins. On success the
/// resolved source totals are returned.
pub fn validate(encoder: &Path, request: &ConversionRequest) -> Result<MediaInfo, ValidationError> {
    ffmpeg::check_encoder(encoder)?;

    if request.input.trim().is_empty() {
        return Err(ValidationError::MissingInput);
    }
    if request.output.trim().is_empty() {
        return Err(ValidationError::MissingOutput);
    }
    if !formats::has_output_extension(&request.output) {
        return Err(ValidationError::InvalidOutputExtension {
            path: request.output.clone(),
            expected: formats::OUTPUT_EXTENSION,
        });
    }
    if request.frame_rate == 0 {
        return Err(ValidationError::InvalidFrameRate);
    }
    if !request.quality_in_range() {
        return Err(ValidationError::InvalidQuality {
            quality: request.quality,
            max: formats::MAX_QUALITY,
        });
    }

    let mode = ProgressMode::for_input(&request.input);
    let media = probe::probe(encoder, &request.input);
    if !mode.has_total(&media) {
        return Err(if sequence::is_sequence_pattern(&request.input) {
            ValidationError::NoSequenceMatches(request.input.clone())
        } else {
            ValidationError::MediaInfoUnavailable(request.input.clone())
        });
    }
    Ok(media)
}

/// Runs conversions in the background and publishes their events.
pub struct ConversionSupervisor {
    /// Encoder binary used for probing and converting
    encoder: PathBuf,
    /// Live tasks
    registry: Arc<TaskRegistry>,
    /// Event channel shared by all workers
    event_tx: Sender<ConversionEvent>,
    event_rx: Receiver<ConversionEvent>,
    /// Set on drop so tasks that have not launched yet never do
    shutdown: Arc<AtomicBool>,
}

impl ConversionSupervisor {
    pub fn new(encoder: impl Into<PathBuf>) -> Self {
        let (event_tx, event_rx) = unbounded();
        Self {
            encoder: encoder.into(),
            registry: Arc::new(TaskRegistry::new()),
            event_tx,
            event_rx,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn encoder(&self) -> &Path {
        &self.encoder
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Start converting `request` on a new worker thread.
    ///
    /// Never blocks on the conversion. All results, including validation
    /// failures, arrive as events.
    pub fn submit(&self, request: ConversionRequest) -> TaskId {
        let id = TaskId::new();
        self.registry.insert(id, request.clone());
        tracing::info!(task = %id, input = %request.input, output = %request.output, "Conversion submitted");

        let worker = TaskWorker {
            id,
            encoder: self.encoder.clone(),
            registry: Arc::clone(&self.registry),
            events: self.event_tx.clone(),
            shutdown: Arc::clone(&self.shutdown),
        };

        let spawned = thread::Builder::new()
            .name(format!("convert-{}", id))
            .spawn(move || worker.run(request));

        match spawned {
            Ok(handle) => {
                // The task may already be gone if it failed fast
                self.registry.attach_worker(id, handle);
            }
            Err(e) => {
                tracing::error!(task = %id, error = %e, "Failed to start conversion worker");
                self.registry.remove(id);
                let _ = self.event_tx.send(ConversionEvent::Finished(TerminalEvent {
                    task_id: id,
                    outcome: Outcome::Failure(ConversionError::Io(e)),
                }));
            }
        }
        id
    }

    /// Kill the encoder of a running task.
    ///
    /// Returns `false` when the task is unknown or has no live process. The
    /// terminal event follows asynchronously from the worker.
    pub fn cancel(&self, id: TaskId) -> bool {
        let result = self.registry.cancel_process(id, |pid| {
            tracing::info!(task = %id, pid, "Cancelling conversion");
            ffmpeg::kill_process_tree(pid)
        });

        match result {
            Some(Ok(())) => true,
            Some(Err(e)) => {
                // The process most likely exited on its own in the meantime
                tracing::warn!(task = %id, error = %e, "Failed to kill encoder");
                false
            }
            None => {
                tracing::debug!(task = %id, "Nothing to cancel");
                false
            }
        }
    }

    /// Cancel every task with a live encoder. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        self.registry
            .ids()
            .into_iter()
            .filter(|id| self.cancel(*id))
            .count()
    }

    /// A receiver for all task events.
    pub fn events(&self) -> Receiver<ConversionEvent> {
        self.event_rx.clone()
    }

    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.registry.status(id)
    }

    pub fn active_count(&self) -> usize {
        self.registry.len()
    }
}

impl Drop for ConversionSupervisor {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let cancelled = self.cancel_all();
        if cancelled > 0 {
            tracing::info!(cancelled, "Cancelled running conversions on shutdown");
        }
        for id in self.registry.ids() {
            if let Some(handle) = self.registry.take_worker(id) {
                let _ = handle.join();
            }
        }
    }
}

/// State moved onto a task's worker thread.
struct TaskWorker {
    id: TaskId,
    encoder: PathBuf,
    registry: Arc<TaskRegistry>,
    events: Sender<ConversionEvent>,
    shutdown: Arc<AtomicBool>,
}

impl TaskWorker {
    fn run(self, request: ConversionRequest) {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.supervise(&request))) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => Outcome::Failure(e),
            Err(payload) => Outcome::Failure(ConversionError::Internal(panic_message(payload))),
        };

        match &outcome {
            Outcome::Success(path) => {
                tracing::info!(task = %self.id, output = %path.display(), "Conversion finished")
            }
            Outcome::Failure(e) => tracing::error!(task = %self.id, error = %e, "Conversion failed"),
            Outcome::Cancelled => tracing::info!(task = %self.id, "Conversion cancelled"),
        }

        self.registry.set_status(self.id, outcome.status());
        self.registry.remove(self.id);
        let _ = self.events.send(ConversionEvent::Finished(TerminalEvent {
            task_id: self.id,
            outcome,
        }));
    }

    fn supervise(&self, request: &ConversionRequest) -> Result<Outcome, ConversionError> {
        self.registry.set_status(self.id, TaskStatus::Validating);
        let media = validate(&self.encoder, request)?;
        self.registry.set_media(self.id, media);
        tracing::debug!(task = %self.id, ?media, "Request validated");

        self.registry.set_status(self.id, TaskStatus::Launching);
        if self.shutdown.load(Ordering::SeqCst) {
            return Ok(Outcome::Cancelled);
        }

        let args = ffmpeg::build_args(request);
        let mut child = ffmpeg::spawn_encoder(&self.encoder, &args).map_err(ConversionError::Launch)?;
        let pid = child.id();
        self.registry.attach_process(self.id, pid);
        tracing::info!(task = %self.id, pid, "FFmpeg started");

        // Shutdown may have raced past cancel_all before the pid was visible
        if self.shutdown.load(Ordering::SeqCst) {
            let _ = self.registry.cancel_process(self.id, ffmpeg::kill_process_tree);
        }

        // The encoder must not outlive its task, whether supervision fails or panics
        match panic::catch_unwind(AssertUnwindSafe(|| self.drive(&mut child, request, media))) {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => {
                self.abort(&mut child);
                Err(e)
            }
            Err(payload) => {
                self.abort(&mut child);
                panic::resume_unwind(payload)
            }
        }
    }

    /// Pump the running encoder's output and resolve how it ended.
    fn drive(
        &self,
        child: &mut Child,
        request: &ConversionRequest,
        media: MediaInfo,
    ) -> Result<Outcome, ConversionError> {
        #[cfg(test)]
        {
            if PANIC_AFTER_SPAWN.swap(false, Ordering::SeqCst) {
                panic!("encoder supervision panicked");
            }
        }

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ConversionError::Internal("encoder error stream was not captured".to_string()))?;
        let tail = self.pump(stderr, ProgressMode::for_input(&request.input), media)?;

        let status = self.wait_exit(child)?;
        tracing::debug!(task = %self.id, code = ?status.code(), "FFmpeg exited");

        let details = if tail.is_empty() {
            "FFmpeg produced no diagnostic output".to_string()
        } else {
            tail.joined()
        };

        match ffmpeg::classify_exit(&status) {
            ExitKind::Success => Ok(Outcome::Success(PathBuf::from(&request.output))),
            _ if self.registry.cancel_requested(self.id) => Ok(Outcome::Cancelled),
            ExitKind::Terminated(exit) => {
                tracing::warn!(task = %self.id, %exit, "FFmpeg was terminated without a cancel request");
                Err(ConversionError::Encoder { exit, details })
            }
            ExitKind::Failed(exit) => Err(ConversionError::Encoder { exit, details }),
        }
    }

    /// Wait for the encoder to exit. Reaping happens under the registry lock.
    fn wait_exit(&self, child: &mut Child) -> io::Result<ExitStatus> {
        loop {
            if let Some(status) = self.registry.reap_process(self.id, || child.try_wait())? {
                return Ok(status);
            }
            thread::sleep(REAP_INTERVAL);
        }
    }

    /// Read the diagnostic stream on its own thread until it closes.
    fn pump(
        &self,
        stderr: ChildStderr,
        mode: ProgressMode,
        media: MediaInfo,
    ) -> Result<DiagnosticTail, ConversionError> {
        let id = self.id;
        let events = self.events.clone();

        let reader = thread::Builder::new()
            .name(format!("ffmpeg-stderr-{}", id))
            .spawn(move || {
                let mut tail = DiagnosticTail::default();
                for line in DiagnosticLines::new(BufReader::new(stderr)) {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            tracing::warn!(task = %id, error = %e, "Error reading FFmpeg output");
                            break;
                        }
                    };
                    tracing::trace!(task = %id, "{}", line);

                    if let Some(fraction) = parse_progress(&line, mode, &media) {
                        let _ = events.send(ConversionEvent::Progress(ProgressEvent {
                            task_id: id,
                            percent: fraction * 100.0,
                        }));
                    }
                    tail.push(line);
                }

                let _ = events.send(ConversionEvent::Progress(ProgressEvent {
                    task_id: id,
                    percent: 100.0,
                }));
                tail
            })?;

        reader
            .join()
            .map_err(|payload| ConversionError::Internal(panic_message(payload)))
    }

    /// Kill and reap the encoder after a supervision error.
    fn abort(&self, child: &mut Child) {
        if let Some(Err(e)) = self.registry.cancel_process(self.id, ffmpeg::kill_process_tree) {
            tracing::warn!(task = %self.id, error = %e, "Failed to kill encoder");
        }
        if let Err(e) = self.wait_exit(child) {
            tracing::warn!(task = %self.id, error = %e, "Failed to reap encoder");
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::time::{Duration, Instant};

    const TIMEOUT: Duration = Duration::from_secs(20);

    /// Write a shell script standing in for FFmpeg.
    fn fake_encoder(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("ffmpeg");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn image_sequence(dir: &Path, count: usize) -> String {
        for i in 1..=count {
            fs::write(dir.join(format!("img_{:03}.png", i)), b"").unwrap();
        }
        dir.join("img_%03d.png").to_string_lossy().to_string()
    }

    fn output(dir: &Path) -> String {
        dir.join("out.webm").to_string_lossy().to_string()
    }

    /// Collect one task's events up to its terminal event, checking ordering.
    fn collect(rx: &Receiver<ConversionEvent>, id: TaskId) -> (Vec<f64>, Outcome) {
        let deadline = Instant::now() + TIMEOUT;
        let mut percents = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining).expect("timed out waiting for task events") {
                ConversionEvent::Progress(p) if p.task_id == id => {
                    assert!((0.0..=100.0).contains(&p.percent));
                    percents.push(p.percent);
                }
                ConversionEvent::Finished(t) if t.task_id == id => {
                    let late = rx.recv_timeout(Duration::from_millis(200));
                    assert!(
                        !matches!(late, Ok(ref e) if e.task_id() == id),
                        "event published after terminal event"
                    );
                    return (percents, t.outcome);
                }
                _ => {}
            }
        }
    }

    fn assert_progress_complete(percents: &[f64]) {
        assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
        assert_eq!(percents.last().copied(), Some(100.0));
    }

    #[test]
    #[serial]
    fn test_sequence_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = fake_encoder(
            dir.path(),
            "printf 'frame=    5 fps=0.0 q=0.0 size=       0kB time=00:00:00.20 bitrate=N/A speed=   0x\\r' >&2\nexit 0",
        );
        let input = image_sequence(dir.path(), 10);
        let out = output(dir.path());

        let supervisor = ConversionSupervisor::new(&encoder);
        let rx = supervisor.events();
        let id = supervisor.submit(ConversionRequest::new(input, out.clone()).with_frame_rate(24));

        let (percents, outcome) = collect(&rx, id);
        assert_eq!(percents, vec![50.0, 100.0]);
        match outcome {
            Outcome::Success(path) => assert_eq!(path, PathBuf::from(out)),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!supervisor.registry().contains(id));
    }

    #[test]
    #[serial]
    fn test_timed_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = fake_encoder(
            dir.path(),
            r#"if [ "$#" -eq 2 ]; then
  echo "  Duration: 00:00:10.00, start: 0.000000, bitrate: 1205 kb/s" >&2
  echo "  Stream #0:0: Video: h264 (High), yuv420p, 1280x720, 25 fps, 25 tbr" >&2
  echo "At least one output file must be specified" >&2
  exit 1
fi
printf 'frame=  125 fps= 25 q=28.0 size=     256kB time=00:00:05.00 bitrate= 419.4kbits/s speed=1.0x\r' >&2
exit 0"#,
        );
        let supervisor = ConversionSupervisor::new(&encoder);
        let rx = supervisor.events();
        let id = supervisor.submit(ConversionRequest::new("clip.mp4", output(dir.path())));

        let (percents, outcome) = collect(&rx, id);
        assert_eq!(percents, vec![50.0, 100.0]);
        assert!(matches!(outcome, Outcome::Success(_)));
    }

    #[test]
    #[serial]
    fn test_encoder_failure_reports_tail() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = fake_encoder(
            dir.path(),
            "for i in 1 2 3 4 5 6 7; do echo \"line $i\" >&2; done\nexit 3",
        );
        let input = image_sequence(dir.path(), 1);

        let supervisor = ConversionSupervisor::new(&encoder);
        let rx = supervisor.events();
        let id = supervisor.submit(ConversionRequest::new(input, output(dir.path())));

        let (percents, outcome) = collect(&rx, id);
        assert_progress_complete(&percents);
        match outcome {
            Outcome::Failure(ConversionError::Encoder { exit, details }) => {
                assert_eq!(exit, "error code 3");
                assert_eq!(details, "line 3\nline 4\nline 5\nline 6\nline 7");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_invalid_output_extension_never_spawns() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("spawned");
        let encoder = fake_encoder(dir.path(), &format!("touch '{}'", marker.display()));
        let input = image_sequence(dir.path(), 3);
        let out = dir.path().join("out.mp4").to_string_lossy().to_string();

        let supervisor = ConversionSupervisor::new(&encoder);
        let rx = supervisor.events();
        let id = supervisor.submit(ConversionRequest::new(input, out));

        let (percents, outcome) = collect(&rx, id);
        assert!(percents.is_empty());
        assert!(matches!(
            outcome,
            Outcome::Failure(ConversionError::Validation(
                ValidationError::InvalidOutputExtension { .. }
            ))
        ));
        assert!(!marker.exists());
    }

    #[test]
    #[serial]
    fn test_missing_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let input = image_sequence(dir.path(), 3);

        let supervisor = ConversionSupervisor::new(dir.path().join("no-ffmpeg"));
        let rx = supervisor.events();
        let id = supervisor.submit(ConversionRequest::new(input, output(dir.path())));

        let (percents, outcome) = collect(&rx, id);
        assert!(percents.is_empty());
        assert!(matches!(
            outcome,
            Outcome::Failure(ConversionError::Validation(ValidationError::EncoderNotFound(_)))
        ));
    }

    #[test]
    #[serial]
    fn test_sequence_without_matches() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = fake_encoder(dir.path(), "exit 0");
        let input = dir.path().join("none_%04d.png").to_string_lossy().to_string();

        let supervisor = ConversionSupervisor::new(&encoder);
        let rx = supervisor.events();
        let id = supervisor.submit(ConversionRequest::new(input, output(dir.path())));

        let (_, outcome) = collect(&rx, id);
        assert!(matches!(
            outcome,
            Outcome::Failure(ConversionError::Validation(ValidationError::NoSequenceMatches(_)))
        ));
    }

    #[test]
    #[serial]
    fn test_validation_order() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = fake_encoder(dir.path(), "exit 0");

        let err = validate(&encoder, &ConversionRequest::new("", "out.mp4")).unwrap_err();
        assert!(matches!(err, ValidationError::MissingInput));

        let err = validate(&encoder, &ConversionRequest::new("a.mov", " ")).unwrap_err();
        assert!(matches!(err, ValidationError::MissingOutput));

        let request = ConversionRequest::new("a.mov", "out.webm").with_frame_rate(0);
        assert!(matches!(validate(&encoder, &request), Err(ValidationError::InvalidFrameRate)));

        let request = ConversionRequest::new("a.mov", "out.webm").with_quality(64);
        assert!(matches!(
            validate(&encoder, &request),
            Err(ValidationError::InvalidQuality { quality: 64, max: 63 })
        ));

        // The fake prints no banner, so totals stay unknown
        let request = ConversionRequest::new("a.mov", "out.WEBM");
        assert!(matches!(
            validate(&encoder, &request),
            Err(ValidationError::MediaInfoUnavailable(_))
        ));
    }

    #[test]
    #[serial]
    fn test_cancel_running_task() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = fake_encoder(dir.path(), "echo 'frame=    1 fps=0.0' >&2\nsleep 30\nexit 0");
        let input = image_sequence(dir.path(), 4);

        let supervisor = ConversionSupervisor::new(&encoder);
        let rx = supervisor.events();
        let id = supervisor.submit(ConversionRequest::new(input, output(dir.path())));

        // The first progress event means the encoder is up and registered
        let first = rx.recv_timeout(TIMEOUT).unwrap();
        assert!(matches!(first, ConversionEvent::Progress(ref p) if p.task_id == id && p.percent == 25.0));
        assert!(supervisor.registry().process_id(id).is_some());

        let started = Instant::now();
        assert!(supervisor.cancel(id));

        let (percents, outcome) = collect(&rx, id);
        assert_eq!(percents, vec![100.0]);
        assert!(matches!(outcome, Outcome::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!supervisor.cancel(id));
    }

    #[test]
    #[serial]
    fn test_unrequested_termination_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = fake_encoder(dir.path(), "echo 'frame=    1 fps=0.0' >&2\nkill -TERM $$");
        let input = image_sequence(dir.path(), 4);

        let supervisor = ConversionSupervisor::new(&encoder);
        let rx = supervisor.events();
        let id = supervisor.submit(ConversionRequest::new(input, output(dir.path())));

        let (percents, outcome) = collect(&rx, id);
        assert_eq!(percents, vec![25.0, 100.0]);
        match outcome {
            Outcome::Failure(ConversionError::Encoder { exit, details }) => {
                assert_eq!(exit, "signal 15");
                assert_eq!(details, "frame=    1 fps=0.0");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        // Executable, but exec fails on the missing interpreter
        let encoder = dir.path().join("ffmpeg");
        fs::write(&encoder, "#!/no/such/interpreter\n").unwrap();
        fs::set_permissions(&encoder, fs::Permissions::from_mode(0o755)).unwrap();
        let input = image_sequence(dir.path(), 2);

        let supervisor = ConversionSupervisor::new(&encoder);
        let rx = supervisor.events();
        let id = supervisor.submit(ConversionRequest::new(input, output(dir.path())));

        let (percents, outcome) = collect(&rx, id);
        assert!(percents.is_empty());
        assert!(matches!(outcome, Outcome::Failure(ConversionError::Launch(_))));
        assert!(supervisor.registry().is_empty());
    }

    #[test]
    #[serial]
    fn test_panic_after_spawn_kills_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("survived");
        let encoder = fake_encoder(dir.path(), &format!("sleep 2\ntouch '{}'", marker.display()));
        let input = image_sequence(dir.path(), 2);

        let supervisor = ConversionSupervisor::new(&encoder);
        let rx = supervisor.events();
        PANIC_AFTER_SPAWN.store(true, Ordering::SeqCst);
        let id = supervisor.submit(ConversionRequest::new(input, output(dir.path())));

        let (percents, outcome) = collect(&rx, id);
        PANIC_AFTER_SPAWN.store(false, Ordering::SeqCst);
        assert!(percents.is_empty());
        match outcome {
            Outcome::Failure(ConversionError::Internal(msg)) => {
                assert_eq!(msg, "encoder supervision panicked")
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(supervisor.registry().is_empty());

        thread::sleep(Duration::from_secs(3));
        assert!(!marker.exists(), "encoder kept running after the worker panicked");
    }

    #[test]
    #[serial]
    fn test_drop_before_launch_cancels() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("spawned");
        let encoder = fake_encoder(
            dir.path(),
            &format!(
                r#"if [ "$#" -eq 2 ]; then
  sleep 1
  echo "  Duration: 00:00:10.00, start: 0.000000, bitrate: 1205 kb/s" >&2
  exit 1
fi
touch '{}'"#,
                marker.display()
            ),
        );

        let supervisor = ConversionSupervisor::new(&encoder);
        let rx = supervisor.events();
        let id = supervisor.submit(ConversionRequest::new("clip.mp4", output(dir.path())));
        // Media info is still being read when the supervisor goes away
        drop(supervisor);

        let (percents, outcome) = collect(&rx, id);
        assert!(percents.is_empty());
        assert!(matches!(outcome, Outcome::Cancelled));
        assert!(!marker.exists());
    }

    #[test]
    #[serial]
    fn test_concurrent_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = fake_encoder(dir.path(), "printf 'frame=    2\\rframe=    4\\r' >&2\nexit 0");
        let input = image_sequence(dir.path(), 4);

        let supervisor = ConversionSupervisor::new(&encoder);
        let rx = supervisor.events();
        let ids: Vec<TaskId> = (0..3)
            .map(|i| {
                let out = dir.path().join(format!("out{}.webm", i));
                supervisor.submit(ConversionRequest::new(input.clone(), out.to_string_lossy()))
            })
            .collect();

        let mut finished = Vec::new();
        let mut percents: std::collections::HashMap<TaskId, Vec<f64>> = Default::default();
        while finished.len() < ids.len() {
            match rx.recv_timeout(TIMEOUT).unwrap() {
                ConversionEvent::Progress(p) => {
                    assert!(!finished.contains(&p.task_id));
                    percents.entry(p.task_id).or_default().push(p.percent);
                }
                ConversionEvent::Finished(t) => {
                    assert!(matches!(t.outcome, Outcome::Success(_)));
                    assert!(!finished.contains(&t.task_id));
                    finished.push(t.task_id);
                }
            }
        }
        for id in &ids {
            assert_eq!(percents[id], vec![50.0, 100.0, 100.0]);
        }
        assert_eq!(supervisor.active_count(), 0);
    }

    #[test]
    fn test_cancel_without_process() {
        let supervisor = ConversionSupervisor::new("/no/such/ffmpeg");
        assert!(!supervisor.cancel(TaskId::new()));

        let id = TaskId::new();
        supervisor
            .registry()
            .insert(id, ConversionRequest::new("img_%03d.png", "out.webm"));
        assert!(!supervisor.cancel(id));
        assert_eq!(supervisor.cancel_all(), 0);
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("boom".to_string())), "boom");
        assert_eq!(panic_message(Box::new(42)), "worker panicked");
    }
}
