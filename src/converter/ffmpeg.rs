//! FFmpeg discovery, command construction and process control.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use super::error::ValidationError;
use super::formats;
use super::job::ConversionRequest;
use super::sequence;

/// Find FFmpeg binary in various locations.
pub fn find_ffmpeg() -> Option<PathBuf> {
    // 1. Check bundled location
    let bundled_paths = if cfg!(target_os = "windows") {
        vec![PathBuf::from("ffmpeg/ffmpeg.exe"), PathBuf::from("ffmpeg.exe")]
    } else {
        vec![PathBuf::from("ffmpeg/ffmpeg")]
    };

    for path in bundled_paths {
        if path.is_file() {
            return Some(path);
        }
    }

    // 2. Check system PATH using which crate
    if let Ok(path) = which::which("ffmpeg") {
        return Some(path);
    }

    // 3. Check common install locations
    let common_paths = if cfg!(target_os = "macos") {
        vec![
            "/usr/local/bin/ffmpeg",
            "/opt/homebrew/bin/ffmpeg",
            "/opt/local/bin/ffmpeg",
        ]
    } else if cfg!(target_os = "windows") {
        vec![
            "C:\\ffmpeg\\bin\\ffmpeg.exe",
            "C:\\Program Files\\ffmpeg\\bin\\ffmpeg.exe",
        ]
    } else {
        vec!["/usr/bin/ffmpeg", "/usr/local/bin/ffmpeg"]
    };

    common_paths
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
}

/// Check that the encoder exists and can be executed.
pub fn check_encoder(path: &Path) -> Result<(), ValidationError> {
    let metadata = match fs::metadata(path) {
        Ok(m) if m.is_file() => m,
        _ => return Err(ValidationError::EncoderNotFound(path.to_path_buf())),
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(ValidationError::EncoderNotExecutable(path.to_path_buf()));
        }
    }
    #[cfg(not(unix))]
    let _ = metadata;

    Ok(())
}

/// Build the argument list for converting `request` to WebM.
///
/// Arguments are kept discrete so paths with spaces or shell metacharacters
/// reach FFmpeg untouched.
pub fn build_args(request: &ConversionRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(24);
    let frame_rate = request.frame_rate.to_string();

    if sequence::is_sequence_pattern(&request.input) {
        args.push("-framerate".into());
        args.push(frame_rate.clone().into());
    }

    args.push("-i".into());
    args.push(request.input.clone().into());
    args.push("-vf".into());
    args.push(formats::filter_chain(request.frame_rate).into());
    args.push("-c:v".into());
    args.push(formats::VIDEO_CODEC.into());
    args.push("-pix_fmt".into());
    args.push(formats::PIXEL_FORMAT.into());

    // A literal zero bitrate degrades the output, so unset means absent
    if let Some(bitrate) = request.effective_bitrate() {
        args.push("-b:v".into());
        args.push(bitrate.to_string().into());
    }

    let quality = request.quality.to_string();
    for arg in ["-crf", quality.as_str(), "-deadline", "best", "-cpu-used", "0", "-y", "-an"] {
        args.push(arg.into());
    }
    args.push(request.output.clone().into());
    args
}

/// Spawn the encoder in its own process group with the error stream piped.
pub fn spawn_encoder(encoder: &Path, args: &[OsString]) -> io::Result<Child> {
    let mut cmd = Command::new(encoder);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }

    tracing::debug!(encoder = %encoder.display(), ?args, "Spawning FFmpeg");
    cmd.spawn()
}

/// Forcibly terminate the encoder and every process in its group.
pub fn kill_process_tree(pid: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        // The encoder leads its own group, so its pid is the group id
        killpg(Pid::from_raw(pid as i32), Signal::SIGKILL).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    {
        let status = Command::new("taskkill")
            .args(["/F", "/T", "/PID", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("taskkill exited with {:?}", status.code()),
            ))
        }
    }
}

/// How the encoder process ended.
///
/// Whether a termination counts as a cancellation is decided by the
/// supervisor, which knows if a kill was actually requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitKind {
    Success,
    /// Killed from outside (a termination signal, or Ctrl+C on Windows)
    Terminated(String),
    /// Any other failure, with a human readable description
    Failed(String),
}

/// Windows reports a console-interrupted process with STATUS_CONTROL_C_EXIT.
#[cfg(not(unix))]
const STATUS_CONTROL_C_EXIT: u32 = 0xC000_013A;

/// Classify an exit status into success, external termination or failure.
pub fn classify_exit(status: &ExitStatus) -> ExitKind {
    if status.success() {
        return ExitKind::Success;
    }

    #[cfg(unix)]
    {
        use nix::sys::signal::Signal;
        use std::os::unix::process::ExitStatusExt;

        if let Some(signal) = status.signal() {
            let description = format!("signal {}", signal);
            let terminated = [Signal::SIGKILL, Signal::SIGTERM, Signal::SIGINT]
                .iter()
                .any(|s| *s as i32 == signal);
            return if terminated {
                ExitKind::Terminated(description)
            } else {
                ExitKind::Failed(description)
            };
        }
    }

    match status.code() {
        #[cfg(not(unix))]
        Some(code) if code as u32 == STATUS_CONTROL_C_EXIT => {
            ExitKind::Terminated(format!("error code {:#X}", code as u32))
        }
        Some(code) => ExitKind::Failed(format!("error code {}", code)),
        None => ExitKind::Failed("unknown exit status".to_string()),
    }
}
