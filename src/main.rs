//! WebM Converter - Main Entry Point
//!
//! Converts an image sequence or a video file to VP9 WebM with alpha,
//! showing progress in the terminal. Ctrl+C cancels the running encode.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use crossbeam_channel::{select, unbounded};
use indicatif::{ProgressBar, ProgressStyle};

use webm_converter::converter::{
    ffmpeg, formats, sequence, ConversionEvent, ConversionSupervisor, Outcome,
};
use webm_converter::settings::ConverterSettings;
use webm_converter::telemetry::{init_logging, LogConfig};

const PROGRESS_BAR_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {wide_bar:.cyan/blue} {pos:>3}%";

/// Exit code for a run stopped with Ctrl+C
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "webm-converter",
    version,
    about = "Convert image sequences and videos to VP9 WebM with alpha"
)]
struct Args {
    /// Input video, sequence pattern (shot_%04d.png) or any frame of a sequence
    input: String,

    /// Output file (.webm) [default: <input name>.webm in the last used output folder, else next to the input]
    output: Option<String>,

    /// Output frame rate [default: last used, initially 24]
    #[arg(long)]
    fps: Option<u32>,

    /// Constant rate factor, 0-63, lower is better [default: last used, initially 30]
    #[arg(long)]
    crf: Option<u8>,

    /// Target bitrate passed to -b:v, 0 lets the encoder decide [default: last used]
    #[arg(long)]
    bitrate: Option<u32>,

    /// Path to the FFmpeg executable
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log as JSON
    #[arg(long)]
    json_logs: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let log_config = LogConfig {
        file_path: args.log_file.clone(),
        json_format: args.json_logs,
        ..LogConfig::default()
    }
    .with_verbosity(args.verbose);
    let _log_guard = init_logging(&log_config).context("Failed to initialize logging")?;

    let mut settings = ConverterSettings::load();

    let encoder = args
        .ffmpeg
        .clone()
        .or_else(|| settings.existing_encoder())
        .or_else(ffmpeg::find_ffmpeg)
        .context("FFmpeg not found. Install it or pass --ffmpeg <PATH>")?;

    let input = resolve_input(&args.input);
    let output = match args.output.clone() {
        Some(output) => output,
        None => default_output(&input, settings.output_dir().as_deref()),
    };
    let mut request = settings.request(input, output);
    if let Some(fps) = args.fps {
        request = request.with_frame_rate(fps);
    }
    if let Some(crf) = args.crf {
        request = request.with_quality(crf);
    }
    if args.bitrate.is_some() {
        request = request.with_bitrate(args.bitrate);
    }

    let supervisor = ConversionSupervisor::new(encoder);

    println!("Input:  {}", truncate_path_by_folder(&request.input, 2, 2));
    println!("Output: {}", truncate_path_by_folder(&request.output, 2, 2));
    println!(
        "FFmpeg: {}",
        truncate_path_by_folder(&supervisor.encoder().to_string_lossy(), 2, 2)
    );

    let (interrupt_tx, interrupt_rx) = unbounded::<()>();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(());
    })
    .context("Failed to set Ctrl+C handler")?;

    let events = supervisor.events();
    let task = supervisor.submit(request.clone());

    let progress_bar = ProgressBar::new(100);
    progress_bar.set_style(ProgressStyle::with_template(PROGRESS_BAR_TEMPLATE)?.progress_chars("=>-"));

    let outcome = loop {
        let event = select! {
            recv(events) -> event => Some(event),
            recv(interrupt_rx) -> _ => None,
        };
        let event = event
            .transpose()
            .context("Conversion worker disconnected")?;

        match event {
            Some(ConversionEvent::Progress(p)) if p.task_id == task => {
                progress_bar.set_position(p.percent.round() as u64);
            }
            Some(ConversionEvent::Finished(t)) if t.task_id == task => break t.outcome,
            Some(_) => {}
            None => {
                if supervisor.cancel(task) {
                    progress_bar.println("Cancelling...");
                } else {
                    let stage = supervisor.status(task).map_or("Finishing", |s| s.display());
                    progress_bar.println(format!("{}, nothing to cancel yet", stage));
                }
            }
        }
    };

    match outcome {
        Outcome::Success(path) => {
            progress_bar.finish();
            println!("Conversion complete: {}", path.display());
            settings.remember_request(&request);
            settings.encoder_path = Some(supervisor.encoder().to_path_buf());
            if let Err(e) = settings.save() {
                tracing::warn!("Failed to save settings: {}", e);
            }
            Ok(ExitCode::SUCCESS)
        }
        Outcome::Cancelled => {
            progress_bar.abandon();
            println!("Conversion cancelled");
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
        Outcome::Failure(e) => {
            progress_bar.abandon();
            eprintln!("Conversion failed: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Turn one frame of a numbered image sequence into its pattern.
///
/// Patterns and non-image inputs are passed through unchanged.
fn resolve_input(input: &str) -> String {
    if sequence::is_sequence_pattern(input) || !formats::is_sequence_image(input) {
        return input.to_string();
    }
    match sequence::derive_pattern(input) {
        Some(pattern) => {
            tracing::info!(sample = input, %pattern, "Using image sequence");
            pattern
        }
        None => input.to_string(),
    }
}

/// Output path used when none is given: the input's base name with a
/// `.webm` extension, in `output_dir` or else next to the input.
fn default_output(input: &str, output_dir: Option<&Path>) -> String {
    let name = format!(
        "{}.{}",
        sequence::base_name(input).unwrap_or_else(|| "output".to_string()),
        formats::OUTPUT_EXTENSION
    );
    let dir = output_dir.or_else(|| Path::new(input).parent().filter(|d| !d.as_os_str().is_empty()));
    match dir {
        Some(dir) => dir.join(name).to_string_lossy().to_string(),
        None => name,
    }
}

/// Shorten a path to its first `keep_start` and last `keep_end` components.
fn truncate_path_by_folder(path: &str, keep_start: usize, keep_end: usize) -> String {
    let parts: Vec<&str> = path
        .split(|c| c == '/' || c == MAIN_SEPARATOR)
        .enumerate()
        .filter(|(i, part)| *i == 0 || !part.is_empty())
        .map(|(_, part)| part)
        .collect();

    if parts.len() <= keep_start + keep_end {
        return path.to_string();
    }

    let sep = MAIN_SEPARATOR.to_string();
    format!(
        "{}{sep}...{sep}{}",
        parts[..keep_start].join(&sep),
        parts[parts.len() - keep_end..].join(&sep),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_truncate_path_by_folder() {
        assert_eq!(
            truncate_path_by_folder("/renders/project/shots/sh010/img_%04d.png", 2, 2),
            "/renders/.../sh010/img_%04d.png"
        );
        assert_eq!(
            truncate_path_by_folder("a/b/c/d/e.webm", 2, 2),
            "a/b/.../d/e.webm"
        );
        assert_eq!(truncate_path_by_folder("a/b/c.webm", 2, 2), "a/b/c.webm");
        assert_eq!(truncate_path_by_folder("out.webm", 2, 2), "out.webm");
    }

    #[test]
    fn test_resolve_input() {
        assert_eq!(resolve_input("shot_0001.png"), "shot_%04d.png");
        assert_eq!(resolve_input("shot_%04d.png"), "shot_%04d.png");
        assert_eq!(resolve_input("clip_0001.mov"), "clip_0001.mov");
        assert_eq!(resolve_input("logo.png"), "logo.png");
    }

    #[cfg(unix)]
    #[test]
    fn test_default_output() {
        assert_eq!(default_output("/renders/shot_%04d.png", None), "/renders/shot.webm");
        assert_eq!(
            default_output("/renders/clip.mov", Some(Path::new("/exports"))),
            "/exports/clip.webm"
        );
        assert_eq!(default_output("clip.mov", None), "clip.webm");
        assert_eq!(default_output("%04d.png", None), "output.webm");
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "webm-converter",
            "in.mov",
            "out.webm",
            "--fps",
            "30",
            "--bitrate",
            "4000",
            "-vv",
        ])
        .unwrap();
        assert_eq!(args.fps, Some(30));
        assert_eq!(args.crf, None);
        assert_eq!(args.bitrate, Some(4000));
        assert_eq!(args.output.as_deref(), Some("out.webm"));
        assert_eq!(args.verbose, 2);

        let args = Args::try_parse_from(["webm-converter", "shot_%04d.png"]).unwrap();
        assert_eq!(args.output, None);
    }
}
