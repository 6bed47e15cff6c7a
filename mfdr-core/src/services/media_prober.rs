//! External media prober
//!
//! The classifier never decodes audio itself. It asks a [`MediaProber`] for
//! three signals: can the end of the stream be decoded, what duration do the
//! stream headers report, and which codec is inside.
//!
//! **Algorithm** (default [`FfmpegProber`]):
//! 1. `ffprobe` reports duration and codec tags as JSON
//! 2. `ffmpeg -sseof` seeks close to the end and decodes one second
//!    ([`ProbeDepth::Decode`]) or stream-copies it ([`ProbeDepth::Seek`])
//! 3. Exit code and stderr are interpreted: exit 234 or a known failure
//!    marker means undecodable, exit 0/1 otherwise means decodable
//!
//! The whole sequence runs under a single deadline; on expiry the child
//! process is killed and [`ProbeError::Timeout`] is returned.

use crate::error::ProbeError;
use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Exit code ffmpeg uses for invalid input data
pub const FFMPEG_CORRUPT_EXIT_CODE: i32 = 234;

/// Lower-case stderr fragments that mark an undecodable tail
pub const DECODE_FAILURE_MARKERS: &[&str] = &[
    "error decoding",
    "truncated",
    "invalid data",
    "could not find codec",
    "moov atom not found",
    "incomplete frame",
    "premature end",
];

/// How much work the tail check does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeDepth {
    /// Decode the final segment
    Decode,
    /// Only seek to and copy the final segment
    Seek,
}

/// Signals returned by one probe of one file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    /// Final segment decoded (or was reachable, for seek depth)
    pub decodable: bool,
    /// Duration from stream headers, in seconds
    pub duration: Option<f64>,
    /// Codec names and codec tags of all streams, lower-cased
    pub codecs: Vec<String>,
    /// Failure description when not decodable
    pub detail: Option<String>,
}

/// Black-box oracle answering decode questions about a file
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(
        &self,
        path: &Path,
        depth: ProbeDepth,
        timeout: Duration,
    ) -> Result<ProbeReport, ProbeError>;
}

/// Prober backed by the `ffprobe`/`ffmpeg` binaries
#[derive(Debug, Clone)]
pub struct FfmpegProber {
    ffprobe: OsString,
    ffmpeg: OsString,
}

impl FfmpegProber {
    /// Use `ffprobe` and `ffmpeg` from PATH
    pub fn new() -> Self {
        Self::with_binaries("ffprobe", "ffmpeg")
    }

    pub fn with_binaries(ffprobe: impl Into<OsString>, ffmpeg: impl Into<OsString>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
            ffmpeg: ffmpeg.into(),
        }
    }

    async fn probe_inner(&self, path: &Path, depth: ProbeDepth) -> Result<ProbeReport, ProbeError> {
        let mut args: Vec<OsString> = [
            "-v",
            "error",
            "-show_entries",
            "format=duration:stream=codec_name,codec_tag_string",
            "-of",
            "json",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(path.as_os_str().to_os_string());

        let output = run(&self.ffprobe, &args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(
                file = %path.display(),
                code = ?output.status.code(),
                "ffprobe rejected file"
            );
            return Ok(ProbeReport {
                decodable: false,
                detail: Some(first_line(&stderr, "ffprobe could not read stream headers")),
                ..Default::default()
            });
        }

        let mut report = parse_ffprobe_json(&output.stdout)?;

        let output = run(&self.ffmpeg, &tail_args(path, depth)).await?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        match interpret_tail_output(output.status.code(), &stderr) {
            Ok(()) => report.decodable = true,
            Err(detail) => {
                report.decodable = false;
                report.detail = Some(detail);
            }
        }
        Ok(report)
    }
}

impl Default for FfmpegProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaProber for FfmpegProber {
    async fn probe(
        &self,
        path: &Path,
        depth: ProbeDepth,
        timeout: Duration,
    ) -> Result<ProbeReport, ProbeError> {
        match tokio::time::timeout(timeout, self.probe_inner(path, depth)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    file = %path.display(),
                    timeout_s = timeout.as_secs(),
                    "Probe timed out"
                );
                Err(ProbeError::Timeout(timeout))
            }
        }
    }
}

async fn run(program: &OsString, args: &[OsString]) -> Result<Output, ProbeError> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProbeError::ToolNotFound(program.to_string_lossy().to_string())
            } else {
                ProbeError::Io(e)
            }
        })
}

fn tail_args(path: &Path, depth: ProbeDepth) -> Vec<OsString> {
    let offset = match depth {
        ProbeDepth::Decode => "-10",
        ProbeDepth::Seek => "-1",
    };
    let mut args: Vec<OsString> = ["-v", "error", "-sseof", offset, "-i"]
        .iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_os_string());
    args.extend(["-t", "1"].iter().map(OsString::from));
    if depth == ProbeDepth::Seek {
        args.extend(["-c", "copy"].iter().map(OsString::from));
    }
    args.extend(["-f", "null", "-"].iter().map(OsString::from));
    args
}

/// Judge a tail-decode run from its exit code and stderr
///
/// `Err` carries a short description of the failure.
pub fn interpret_tail_output(code: Option<i32>, stderr: &str) -> Result<(), String> {
    if code == Some(FFMPEG_CORRUPT_EXIT_CODE) {
        return Err(format!("decoder exited with code {}", FFMPEG_CORRUPT_EXIT_CODE));
    }
    let lower = stderr.to_lowercase();
    if let Some(marker) = DECODE_FAILURE_MARKERS.iter().find(|m| lower.contains(*m)) {
        return Err(format!("decoder reported \"{}\"", marker));
    }
    match code {
        Some(0) | Some(1) => Ok(()),
        Some(other) => Err(format!("decoder exited with code {}", other)),
        None => Err("decoder terminated by signal".to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_name: Option<String>,
    codec_tag_string: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Extract duration and codec identifiers from `ffprobe -of json` output
pub fn parse_ffprobe_json(stdout: &[u8]) -> Result<ProbeReport, ProbeError> {
    let parsed: FfprobeOutput =
        serde_json::from_slice(stdout).map_err(|e| ProbeError::InvalidOutput(e.to_string()))?;

    let duration = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);

    let mut codecs = Vec::new();
    for stream in parsed.streams {
        for value in [stream.codec_name, stream.codec_tag_string].into_iter().flatten() {
            let value = value.trim().to_lowercase();
            if !value.is_empty() && !codecs.contains(&value) {
                codecs.push(value);
            }
        }
    }

    Ok(ProbeReport {
        decodable: false,
        duration,
        codecs,
        detail: None,
    })
}

fn first_line(text: &str, fallback: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_exit_is_decodable() {
        assert!(interpret_tail_output(Some(0), "").is_ok());
        assert!(interpret_tail_output(Some(1), "some harmless warning").is_ok());
    }

    #[test]
    fn test_corrupt_exit_code() {
        let err = interpret_tail_output(Some(234), "").unwrap_err();
        assert!(err.contains("234"));
    }

    #[test]
    fn test_failure_markers_are_case_insensitive() {
        assert!(interpret_tail_output(Some(0), "[mp3] Error decoding frame").is_err());
        assert!(interpret_tail_output(Some(1), "moov atom not found").is_err());
        assert!(interpret_tail_output(Some(0), "Premature end of stream").is_err());
    }

    #[test]
    fn test_unknown_exit_code_is_failure() {
        assert!(interpret_tail_output(Some(69), "").is_err());
        assert!(interpret_tail_output(None, "").is_err());
    }

    #[test]
    fn test_parse_ffprobe_json() {
        let json = br#"{
            "programs": [],
            "streams": [
                {"codec_name": "aac", "codec_tag_string": "drms"},
                {"codec_name": "mjpeg", "codec_tag_string": "[0][0][0][0]"}
            ],
            "format": {"duration": "245.330000"}
        }"#;
        let report = parse_ffprobe_json(json).unwrap();
        assert_eq!(report.duration, Some(245.33));
        assert_eq!(report.codecs, vec!["aac", "drms", "mjpeg", "[0][0][0][0]"]);
    }

    #[test]
    fn test_parse_ffprobe_without_duration() {
        let report = parse_ffprobe_json(br#"{"streams": [], "format": {"duration": "N/A"}}"#).unwrap();
        assert_eq!(report.duration, None);
        assert!(parse_ffprobe_json(b"not json").is_err());
    }

    #[test]
    fn test_tail_args_by_depth() {
        let decode = tail_args(Path::new("/a.mp3"), ProbeDepth::Decode);
        assert!(decode.contains(&OsString::from("-10")));
        assert!(!decode.contains(&OsString::from("copy")));

        let seek = tail_args(Path::new("/a.mp3"), ProbeDepth::Seek);
        assert!(seek.contains(&OsString::from("-1")));
        assert!(seek.contains(&OsString::from("copy")));
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_not_found() {
        let prober = FfmpegProber::with_binaries("mfdr-no-such-ffprobe", "mfdr-no-such-ffmpeg");
        let result = prober
            .probe(Path::new("/a.mp3"), ProbeDepth::Decode, Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(ProbeError::ToolNotFound(_))));
    }
}
