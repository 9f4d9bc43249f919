//! Voice activity detection.
//!
//! The pipeline only depends on the [`VadEngine`] capability: a cheap speech
//! presence check, speech-window segmentation, and sample extraction. Two
//! implementations exist; config picks one at startup. [`energy::EnergyVad`]
//! does real detection on frame RMS, [`NoopVad`] passes chunks through
//! untouched for fixed-length chunking.

pub mod energy;
pub mod wav;

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VadError {
    #[error("failed to read WAV: {0}")]
    Wav(#[from] hound::Error),
    #[error("unsupported audio format: {0}")]
    Format(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A speech window in seconds relative to the start of the file.
pub type SpeechWindow = (f64, f64);

/// Segmentation bounds. Windows shorter than `min_chunk_seconds` are merged
/// with their neighbor, windows separated by less than `silence_gap_seconds`
/// are merged, windows longer than `max_chunk_seconds` are split into equal
/// parts.
#[derive(Debug, Clone, Copy)]
pub struct SegmentParams {
    pub min_chunk_seconds: f64,
    pub max_chunk_seconds: f64,
    pub silence_gap_seconds: f64,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            min_chunk_seconds: 3.0,
            max_chunk_seconds: 15.0,
            silence_gap_seconds: 0.5,
        }
    }
}

pub trait VadEngine: Send + Sync {
    /// Whether this engine actually segments audio. The pipeline enqueues
    /// chunks unchanged when this is false.
    fn is_active(&self) -> bool {
        true
    }

    /// Cheap presence check: does the file contain any speech at all?
    fn has_speech(&self, wav: &Path) -> Result<bool, VadError>;

    /// Speech windows honoring [`SegmentParams`]. An empty result means the
    /// recording carries no usable speech.
    fn segment(&self, wav: &Path, params: &SegmentParams) -> Result<Vec<SpeechWindow>, VadError>;

    /// Extract the samples of one window.
    fn extract(&self, wav: &Path, start_s: f64, end_s: f64) -> Result<Vec<i16>, VadError>;
}

/// Pass-through engine used when VAD is disabled.
pub struct NoopVad;

impl VadEngine for NoopVad {
    fn is_active(&self) -> bool {
        false
    }

    fn has_speech(&self, _wav: &Path) -> Result<bool, VadError> {
        Ok(true)
    }

    fn segment(&self, _wav: &Path, _params: &SegmentParams) -> Result<Vec<SpeechWindow>, VadError> {
        Ok(Vec::new())
    }

    fn extract(&self, wav: &Path, start_s: f64, end_s: f64) -> Result<Vec<i16>, VadError> {
        wav::read_range(wav, start_s, end_s)
    }
}

/// Select the engine for this run.
pub fn create_vad(enabled: bool) -> Arc<dyn VadEngine> {
    if enabled {
        Arc::new(energy::EnergyVad::default())
    } else {
        Arc::new(NoopVad)
    }
}

/// Merge raw speech windows, then split oversized ones. Shared by every
/// real engine so the bounds behave identically regardless of detector.
pub(crate) fn shape_windows(raw: &[SpeechWindow], params: &SegmentParams) -> Vec<SpeechWindow> {
    if raw.is_empty() {
        return Vec::new();
    }

    let mut merged: Vec<SpeechWindow> = Vec::new();
    let (mut cur_start, mut cur_end) = raw[0];
    for &(start, end) in &raw[1..] {
        let duration = cur_end - cur_start;
        let gap = start - cur_end;
        if duration < params.min_chunk_seconds || gap < params.silence_gap_seconds {
            cur_end = end;
        } else {
            merged.push((cur_start, cur_end));
            cur_start = start;
            cur_end = end;
        }
    }
    merged.push((cur_start, cur_end));

    let mut shaped = Vec::new();
    for (start, end) in merged {
        let duration = end - start;
        if duration <= params.max_chunk_seconds {
            shaped.push((start, end));
        } else {
            let parts = (duration / params.max_chunk_seconds).ceil() as usize;
            let part_duration = duration / parts as f64;
            for i in 0..parts {
                let part_start = start + i as f64 * part_duration;
                let part_end = (start + (i + 1) as f64 * part_duration).min(end);
                shaped.push((part_start, part_end));
            }
        }
    }
    shaped
}
