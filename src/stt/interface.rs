//! Speech-to-text engine contract.
//!
//! The pipeline treats transcription as a pure function WAV file -> text.
//! One engine is constructed per run; its backend and model never change
//! while the pipeline lives.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

/// Smallest possible well-formed WAV: RIFF header + fmt + data chunk heads.
const MIN_WAV_BYTES: u64 = 44;

#[derive(Debug, Error)]
pub enum SttError {
    /// The input file is empty, truncated or not a WAV. This is a
    /// transcription-stage failure even when capture exited cleanly.
    #[error("invalid audio input: {0}")]
    InvalidAudio(String),
    #[error("transcription backend unavailable: {0}")]
    Unavailable(String),
    #[error("transcription failed: {0}")]
    Failed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait SttEngine: Send + Sync {
    /// Backend identifier for logs.
    fn id(&self) -> &str;

    /// Whether the backend currently answers.
    async fn is_available(&self) -> bool;

    /// Transcribe one WAV file to plain text. Implementations trim the
    /// result; emptiness handling is the caller's concern.
    async fn transcribe(&self, wav: &Path) -> Result<String, SttError>;
}

/// Load the file and reject obviously broken payloads before they reach a
/// backend.
pub(crate) fn read_wav_bytes(wav: &Path) -> Result<Vec<u8>, SttError> {
    let meta = std::fs::metadata(wav)?;
    if meta.len() < MIN_WAV_BYTES {
        return Err(SttError::InvalidAudio(format!(
            "{} is {} bytes, smaller than a WAV header",
            wav.display(),
            meta.len()
        )));
    }
    let bytes = std::fs::read(wav)?;
    if !bytes.starts_with(b"RIFF") {
        return Err(SttError::InvalidAudio(format!("{} is not a RIFF file", wav.display())));
    }
    Ok(bytes)
}
