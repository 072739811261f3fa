//! External decode-tool invocation and output parsing.
//!
//! Duration comes from `ffprobe` JSON output (container duration first,
//! primary video stream as fallback); loudness comes from `ffmpeg`'s
//! `volumedetect` diagnostic text. Subprocesses run under a per-invocation
//! timeout and are killed, never abandoned, on timeout or cancellation.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use log::debug;
use serde_json::Value;

use crate::scan_manager::CancelToken;

pub const DEFAULT_DURATION_TOOL: &str = "ffprobe";
pub const DEFAULT_LOUDNESS_TOOL: &str = "ffmpeg";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(15);

const SUBPROCESS_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Decode tool binary not found on this system.
    #[error("decode tool not found: {0}")]
    ToolUnavailable(String),

    /// Tool ran past its per-invocation timeout and was killed.
    #[error("decode tool timed out after {0:?}")]
    Timeout(Duration),

    /// Tool could not be spawned or exited with a failure status.
    #[error("decode tool failed: {0}")]
    Process(String),

    /// Tool output did not contain the expected values.
    #[error("unparseable tool output: {0}")]
    Parse(String),

    /// Invocation was abandoned because the scan session was cancelled.
    #[error("probe cancelled")]
    Cancelled,
}

/// Result of a duration probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationProbe {
    pub duration_secs: u32,
    pub has_audio: bool,
}

/// Result of a loudness probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessProbe {
    pub mean_volume_db: f64,
    pub peak_db: f64,
}

/// Seam between the scan pipeline and the external tools, so the pipeline
/// is testable without decoder binaries installed.
pub trait MediaProber: Send + Sync {
    fn verify_duration_tool(&self) -> Result<(), ProbeError>;
    fn verify_loudness_tool(&self) -> Result<(), ProbeError>;
    fn probe_duration(&self, path: &Path, cancel: &CancelToken) -> Result<DurationProbe, ProbeError>;
    fn probe_loudness(&self, path: &Path, cancel: &CancelToken) -> Result<LoudnessProbe, ProbeError>;
}

/// Production prober invoking ffprobe/ffmpeg.
pub struct FfmpegProber {
    pub ffprobe_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub timeout: Duration,
}

impl Default for FfmpegProber {
    fn default() -> Self {
        Self {
            ffprobe_path: PathBuf::from(DEFAULT_DURATION_TOOL),
            ffmpeg_path: PathBuf::from(DEFAULT_LOUDNESS_TOOL),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl FfmpegProber {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    fn verify_tool(tool: &Path) -> Result<(), ProbeError> {
        match Command::new(tool)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(
                ProbeError::ToolUnavailable(tool.to_string_lossy().to_string()),
            ),
            Err(err) => Err(ProbeError::Process(err.to_string())),
        }
    }
}

impl MediaProber for FfmpegProber {
    fn verify_duration_tool(&self) -> Result<(), ProbeError> {
        Self::verify_tool(&self.ffprobe_path)
    }

    fn verify_loudness_tool(&self) -> Result<(), ProbeError> {
        Self::verify_tool(&self.ffmpeg_path)
    }

    fn probe_duration(
        &self,
        path: &Path,
        cancel: &CancelToken,
    ) -> Result<DurationProbe, ProbeError> {
        let mut command = Command::new(&self.ffprobe_path);
        command
            .arg("-v")
            .arg("error")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg("-show_streams")
            .arg(path);
        let output = run_with_timeout(command, self.timeout, cancel)?;
        parse_ffprobe_output(&output.stdout)
    }

    fn probe_loudness(
        &self,
        path: &Path,
        cancel: &CancelToken,
    ) -> Result<LoudnessProbe, ProbeError> {
        let mut command = Command::new(&self.ffmpeg_path);
        command
            .arg("-hide_banner")
            .arg("-nostats")
            .arg("-i")
            .arg(path)
            .arg("-vn")
            .arg("-af")
            .arg("volumedetect")
            .arg("-f")
            .arg("null")
            .arg("-");
        let output = run_with_timeout(command, self.timeout, cancel)?;
        // volumedetect reports on stderr.
        parse_volumedetect_output(&output.stderr)
    }
}

struct CapturedOutput {
    stdout: String,
    stderr: String,
}

/// Runs a command to completion, killing the child when the timeout
/// elapses or the cancellation token fires. Pipes are drained on reader
/// threads so a chatty tool cannot deadlock the poll loop.
fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<CapturedOutput, ProbeError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let program = command.get_program().to_string_lossy().to_string();
    let mut child = command.spawn().map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => ProbeError::ToolUnavailable(program),
        _ => ProbeError::Process(err.to_string()),
    })?;

    let stdout_reader = spawn_pipe_reader(child.stdout.take());
    let stderr_reader = spawn_pipe_reader(child.stderr.take());

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(err) => {
                kill_child(&mut child);
                return Err(ProbeError::Process(err.to_string()));
            }
        }
        if cancel.is_cancelled() {
            kill_child(&mut child);
            return Err(ProbeError::Cancelled);
        }
        if started.elapsed() >= timeout {
            kill_child(&mut child);
            return Err(ProbeError::Timeout(timeout));
        }
        std::thread::sleep(SUBPROCESS_POLL_INTERVAL);
    };

    let stdout = join_pipe_reader(stdout_reader);
    let stderr = join_pipe_reader(stderr_reader);

    // ffmpeg exits non-zero for files without the probed stream; the parser
    // decides whether the captured diagnostics are still usable.
    if !status.success() && stdout.trim().is_empty() && stderr.trim().is_empty() {
        return Err(ProbeError::Process(format!(
            "exit status {:?} with no output",
            status.code()
        )));
    }
    Ok(CapturedOutput { stdout, stderr })
}

fn spawn_pipe_reader<R>(pipe: Option<R>) -> Option<std::thread::JoinHandle<String>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buffer = String::new();
            let _ = pipe.read_to_string(&mut buffer);
            buffer
        })
    })
}

fn join_pipe_reader(reader: Option<std::thread::JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn kill_child(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!("Failed to kill probe subprocess: {}", err);
    }
    let _ = child.wait();
}

/// Extracts duration and audio presence from ffprobe JSON. Prefers the
/// container-level duration, falls back to the first video stream. Zero or
/// negative durations count as unknown.
pub fn parse_ffprobe_output(json_text: &str) -> Result<DurationProbe, ProbeError> {
    let root: Value = serde_json::from_str(json_text)
        .map_err(|err| ProbeError::Parse(format!("ffprobe output is not JSON: {}", err)))?;

    let streams = root
        .get("streams")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    let has_audio = streams.iter().any(|stream| {
        stream.get("codec_type").and_then(Value::as_str) == Some("audio")
    });

    let format_duration = root
        .get("format")
        .and_then(|format| format.get("duration"))
        .and_then(duration_value_secs);
    let stream_duration = streams
        .iter()
        .find(|stream| stream.get("codec_type").and_then(Value::as_str) == Some("video"))
        .and_then(|stream| stream.get("duration"))
        .and_then(duration_value_secs);

    let duration_secs = format_duration
        .or(stream_duration)
        .ok_or_else(|| ProbeError::Parse("no usable duration field".to_string()))?;
    Ok(DurationProbe {
        duration_secs,
        has_audio,
    })
}

fn duration_value_secs(value: &Value) -> Option<u32> {
    let secs = match value {
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        Value::Number(number) => number.as_f64()?,
        _ => return None,
    };
    if !secs.is_finite() {
        return None;
    }
    let rounded = secs.round();
    if rounded <= 0.0 {
        return None;
    }
    Some(rounded as u32)
}

/// Extracts mean and peak level from volumedetect diagnostics. Both lines
/// must be present for a measurement to count.
pub fn parse_volumedetect_output(text: &str) -> Result<LoudnessProbe, ProbeError> {
    let mean_volume_db = find_db_value(text, "mean_volume:");
    let peak_db = find_db_value(text, "max_volume:");
    match (mean_volume_db, peak_db) {
        (Some(mean_volume_db), Some(peak_db)) => Ok(LoudnessProbe {
            mean_volume_db,
            peak_db,
        }),
        _ => Err(ProbeError::Parse(
            "missing mean_volume/max_volume lines".to_string(),
        )),
    }
}

fn find_db_value(text: &str, marker: &str) -> Option<f64> {
    for line in text.lines() {
        let Some(position) = line.find(marker) else {
            continue;
        };
        let tail = line[position + marker.len()..].trim();
        let number = tail.split_whitespace().next()?;
        if let Ok(value) = number.parse::<f64>() {
            return Some(value);
        }
    }
    None
}
