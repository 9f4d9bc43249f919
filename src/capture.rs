//! ffmpeg-based system-audio capture.
//!
//! Each chunk is one short-lived `ffmpeg` child process recording from an
//! avfoundation device index into a 16 kHz mono 16-bit WAV. The child gets a
//! hard deadline slightly above the chunk length; on timeout it is killed,
//! never left behind.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// How many times a single recording is attempted before giving up.
const RECORD_ATTEMPTS: u32 = 3;

/// Max stderr bytes carried in a capture error.
const STDERR_TAIL: usize = 800;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("ffmpeg capture failed (idx={idx}) after {attempts} tries. Last error:\n{detail}")]
    Failed { idx: u32, attempts: u32, detail: String },
    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Arguments for one recording invocation. Kept separate from the spawn so
/// the command surface is testable.
pub fn record_args(audio_idx: u32, seconds: u32, out_path: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-nostdin".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "avfoundation".into(),
        "-i".into(),
        format!(":{audio_idx}"),
        "-t".into(),
        seconds.to_string(),
        "-ar".into(),
        "16000".into(),
        "-ac".into(),
        "1".into(),
        out_path.to_string_lossy().into_owned(),
    ]
}

/// Hard deadline for one recording: chunk length plus startup slack.
pub fn record_timeout(seconds: u32) -> Duration {
    Duration::from_secs(u64::from(seconds.saturating_add(4)).max(8))
}

fn stderr_tail(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    let start = trimmed.len().saturating_sub(STDERR_TAIL);
    // Stay on a char boundary when slicing the tail.
    let mut idx = start;
    while idx < trimmed.len() && !trimmed.is_char_boundary(idx) {
        idx += 1;
    }
    trimmed[idx..].to_string()
}

/// Record `seconds` of audio from avfoundation device `audio_idx` to
/// `out_path`. Retries internally with linear backoff; the returned error
/// means the whole recording is lost.
pub async fn record_chunk(audio_idx: u32, seconds: u32, out_path: &Path) -> Result<(), CaptureError> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let timeout = record_timeout(seconds);
    let mut last_err = String::new();

    for attempt in 1..=RECORD_ATTEMPTS {
        let child = Command::new("ffmpeg")
            .args(record_args(audio_idx, seconds, out_path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => {
                debug!(path = %out_path.display(), "recorded chunk");
                return Ok(());
            }
            Ok(Ok(output)) => {
                let tail = stderr_tail(&output.stderr);
                last_err = if tail.is_empty() {
                    format!("returncode={:?}", output.status.code())
                } else {
                    tail
                };
            }
            Ok(Err(e)) => {
                last_err = format!("ffmpeg wait failed: {e}");
            }
            Err(_) => {
                // wait_with_output consumed the child; kill_on_drop reaps it.
                last_err = format!(
                    "ffmpeg timed out after {}s (device idx {audio_idx})",
                    timeout.as_secs()
                );
            }
        }

        tokio::time::sleep(Duration::from_millis(300 * u64::from(attempt))).await;
    }

    Err(CaptureError::Failed {
        idx: audio_idx,
        attempts: RECORD_ATTEMPTS,
        detail: last_err,
    })
}

/// Run the avfoundation device listing and return combined stdout+stderr
/// (ffmpeg prints the list on stderr).
pub async fn list_devices() -> std::io::Result<String> {
    let output = tokio::time::timeout(
        Duration::from_secs(5),
        Command::new("ffmpeg")
            .args(["-f", "avfoundation", "-list_devices", "true", "-i", ""])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "device listing timed out"))??;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push('\n');
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(text)
}

/// Timestamped chunk path inside the data directory.
pub fn chunk_path(data_dir: &Path, stamp: &str) -> PathBuf {
    data_dir.join(format!("sys_{stamp}.wav"))
}

/// Path for one VAD segment extracted from the chunk recorded at `stamp`.
pub fn segment_path(data_dir: &Path, stamp: &str, segment: usize) -> PathBuf {
    data_dir.join(format!("sys_{stamp}_seg{segment}.wav"))
}
