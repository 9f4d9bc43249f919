//! Energy-based voice activity detector.
//!
//! Frames the signal at 30 ms and thresholds normalized frame RMS. Crude
//! next to a neural detector, but deterministic, dependency-free and good
//! enough to find speech boundaries in loopback audio.

use std::path::Path;

use super::{shape_windows, wav, SegmentParams, SpeechWindow, VadEngine, VadError};

const FRAME_MS: usize = 30;

pub struct EnergyVad {
    /// Normalized RMS above which a frame counts as speech.
    threshold: f32,
}

impl EnergyVad {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    fn frame_len(sample_rate: u32) -> usize {
        (sample_rate as usize * FRAME_MS / 1000).max(1)
    }

    /// Raw per-frame speech windows before merge/split shaping.
    fn raw_windows(&self, samples: &[i16], sample_rate: u32) -> Vec<SpeechWindow> {
        let frame_len = Self::frame_len(sample_rate);
        let rate = f64::from(sample_rate);

        let mut windows: Vec<SpeechWindow> = Vec::new();
        let mut open: Option<f64> = None;

        for (i, frame) in samples.chunks(frame_len).enumerate() {
            let start_s = (i * frame_len) as f64 / rate;
            if frame_rms(frame) >= self.threshold {
                if open.is_none() {
                    open = Some(start_s);
                }
            } else if let Some(window_start) = open.take() {
                windows.push((window_start, start_s));
            }
        }
        if let Some(window_start) = open {
            windows.push((window_start, samples.len() as f64 / rate));
        }
        windows
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        // Matches the sustain threshold common to RMS segmenters at 16 kHz.
        Self::new(0.015)
    }
}

fn frame_rms(frame: &[i16]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let mut sum = 0.0f32;
    for &sample in frame {
        let value = f32::from(sample) / f32::from(i16::MAX);
        sum += value * value;
    }
    (sum / frame.len() as f32).sqrt()
}

impl VadEngine for EnergyVad {
    fn has_speech(&self, wav_path: &Path) -> Result<bool, VadError> {
        let (samples, rate) = wav::read_mono(wav_path)?;
        let frame_len = Self::frame_len(rate);
        Ok(samples.chunks(frame_len).any(|f| frame_rms(f) >= self.threshold))
    }

    fn segment(&self, wav_path: &Path, params: &SegmentParams) -> Result<Vec<SpeechWindow>, VadError> {
        let (samples, rate) = wav::read_mono(wav_path)?;
        let raw = self.raw_windows(&samples, rate);
        Ok(shape_windows(&raw, params))
    }

    fn extract(&self, wav_path: &Path, start_s: f64, end_s: f64) -> Result<Vec<i16>, VadError> {
        wav::read_range(wav_path, start_s, end_s)
    }
}
