//! Still-image + audio video synthesis behind a capability interface.
//!
//! The production implementation shells out to the system `ffmpeg` binary
//! with a fixed profile; keeping it behind [`Transcoder`] lets the pipeline
//! decision logic stay untouched if synthesis ever moves in-process or to a
//! remote service.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Errors that can occur during video synthesis
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("failed to launch transcoder: {0}")]
    Spawn(String),

    #[error("transcoder exited with status {code}: {stderr}")]
    Failed { code: i32, stderr: String },
}

/// Combines a still image and an audio track into a single video file
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Write the synthesized video to `output`. The paths live in scratch
    /// storage owned by the caller.
    async fn synthesize(
        &self,
        image: &Path,
        audio: &Path,
        output: &Path,
    ) -> Result<(), TranscodeError>;
}

/// Transcoder shelling out to `ffmpeg`
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// Fixed encoding profile: loop the still image for the duration of the
/// audio track, h264 video tuned for still images, aac audio at 192k,
/// yuv420p for broad player compatibility.
fn synthesis_args(image: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
    vec![
        OsString::from("-y"),
        OsString::from("-loop"),
        OsString::from("1"),
        OsString::from("-i"),
        image.into(),
        OsString::from("-i"),
        audio.into(),
        OsString::from("-c:v"),
        OsString::from("libx264"),
        OsString::from("-tune"),
        OsString::from("stillimage"),
        OsString::from("-c:a"),
        OsString::from("aac"),
        OsString::from("-b:a"),
        OsString::from("192k"),
        OsString::from("-pix_fmt"),
        OsString::from("yuv420p"),
        OsString::from("-shortest"),
        output.into(),
    ]
}

/// Last few stderr lines, enough to diagnose a failed run without
/// dumping the full encoder log
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join("\n")
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn synthesize(
        &self,
        image: &Path,
        audio: &Path,
        output: &Path,
    ) -> Result<(), TranscodeError> {
        debug!(
            image = %image.display(),
            audio = %audio.display(),
            output = %output.display(),
            "invoking transcoder"
        );

        let result = Command::new(&self.program)
            .args(synthesis_args(image, audio, output))
            .output()
            .await
            .map_err(|err| TranscodeError::Spawn(err.to_string()))?;

        if !result.status.success() {
            let stderr = stderr_tail(&String::from_utf8_lossy(&result.stderr));
            let code = result.status.code().unwrap_or(-1);
            warn!(code, stderr = %stderr, "transcoder failed");
            return Err(TranscodeError::Failed { code, stderr });
        }

        debug!(output = %output.display(), "synthesis complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesis_args_profile() {
        let args = synthesis_args(
            Path::new("/tmp/in.jpg"),
            Path::new("/tmp/in.mp3"),
            Path::new("/tmp/out.mp4"),
        );
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        // Image is looped, both inputs present, output comes last
        assert_eq!(args[..5], ["-y", "-loop", "1", "-i", "/tmp/in.jpg"]);
        assert!(args.windows(2).any(|w| w == ["-i", "/tmp/in.mp3"]));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mp4"));

        // Fixed codec pair, pixel format, and shortest-duration flag
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "aac"]));
        assert!(args.windows(2).any(|w| w == ["-pix_fmt", "yuv420p"]));
        assert!(args.contains(&"-shortest".to_string()));
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let long = (0..20).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let tail = stderr_tail(&long);
        assert!(tail.starts_with("line 15"));
        assert!(tail.ends_with("line 19"));

        assert_eq!(stderr_tail("short"), "short");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let transcoder = FfmpegTranscoder::new("false");

        let err = transcoder
            .synthesize(
                Path::new("/tmp/in.jpg"),
                Path::new("/tmp/in.mp3"),
                Path::new("/tmp/out.mp4"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TranscodeError::Failed { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let transcoder = FfmpegTranscoder::new("/nonexistent/ffmpeg-binary");

        let err = transcoder
            .synthesize(
                Path::new("/tmp/in.jpg"),
                Path::new("/tmp/in.mp3"),
                Path::new("/tmp/out.mp4"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TranscodeError::Spawn(_)));
    }
}
