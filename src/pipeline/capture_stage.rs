//! Capture worker: records fixed-length chunks, optionally segments them on
//! speech boundaries, and feeds the transcription queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{enqueue_until_stop, AudioChunk, Signals};
use crate::capture;
use crate::config::Config;
use crate::health::{CaptureVerdict, HealthMonitor};
use crate::vad::{wav, SegmentParams, VadEngine};

pub struct CaptureStage {
    system_audio_idx: u32,
    chunk_seconds: u32,
    cleanup_wav: bool,
    data_dir: PathBuf,
    segment_params: SegmentParams,
    signals: Arc<Signals>,
    health: Arc<HealthMonitor>,
    vad: Arc<dyn VadEngine>,
    tx: mpsc::Sender<AudioChunk>,
}

impl CaptureStage {
    pub fn new(
        config: &Config,
        signals: Arc<Signals>,
        health: Arc<HealthMonitor>,
        vad: Arc<dyn VadEngine>,
        tx: mpsc::Sender<AudioChunk>,
    ) -> Self {
        Self {
            system_audio_idx: config.system_audio_idx,
            chunk_seconds: config.chunk_seconds,
            cleanup_wav: config.cleanup_wav,
            data_dir: config.data_dir.clone(),
            segment_params: SegmentParams::default(),
            signals,
            health,
            vad,
            tx,
        }
    }

    pub async fn run(self) {
        info!(
            idx = self.system_audio_idx,
            chunk_seconds = self.chunk_seconds,
            vad = self.vad.is_active(),
            "capture stage started"
        );

        while !self.signals.is_stopped() {
            if self.signals.is_paused() {
                tokio::time::sleep(Duration::from_millis(200)).await;
                continue;
            }

            let stamp = Local::now().format("%Y%m%d_%H%M%S_%6f").to_string();
            let wav_path = capture::chunk_path(&self.data_dir, &stamp);

            match capture::record_chunk(self.system_audio_idx, self.chunk_seconds, &wav_path).await
            {
                Ok(()) => self.health.on_capture_success(),
                Err(e) => {
                    let verdict = self.health.on_capture_error();
                    error!(error = %e, ?verdict, "capture failed");
                    let sleep = match verdict {
                        CaptureVerdict::Retry => Duration::from_secs(1),
                        CaptureVerdict::Backoff => Duration::from_secs(3),
                        CaptureVerdict::Skip => Duration::from_secs(5),
                    };
                    self.signals.sleep_interruptible(sleep).await;
                    continue;
                }
            }

            if self.vad.is_active() {
                self.dispatch_with_vad(&wav_path, &stamp).await;
            } else {
                let chunk = AudioChunk {
                    path: wav_path,
                    window: None,
                    captured_at: Local::now(),
                };
                if !enqueue_until_stop(&self.tx, &self.signals, chunk).await {
                    break;
                }
            }
        }

        info!("capture stage stopped");
    }

    async fn enqueue_whole(&self, wav_path: &Path) {
        let chunk = AudioChunk {
            path: wav_path.to_path_buf(),
            window: None,
            captured_at: Local::now(),
        };
        enqueue_until_stop(&self.tx, &self.signals, chunk).await;
    }

    /// Segment a finished recording and enqueue the speech windows. Any VAD
    /// failure falls back to enqueueing the recording unchanged; detection is
    /// an optimization, not a gate the pipeline may die on.
    async fn dispatch_with_vad(&self, wav_path: &Path, stamp: &str) {
        let has_speech = match self.vad.has_speech(wav_path) {
            Ok(present) => present,
            Err(e) => {
                warn!(error = %e, "speech presence check failed, keeping chunk");
                self.enqueue_whole(wav_path).await;
                return;
            }
        };

        if !has_speech {
            debug!(path = %wav_path.display(), "no speech detected, skipping chunk");
            self.discard(wav_path);
            return;
        }

        let windows = match self.vad.segment(wav_path, &self.segment_params) {
            Ok(windows) => windows,
            Err(e) => {
                warn!(error = %e, "segmentation failed, keeping chunk");
                self.enqueue_whole(wav_path).await;
                return;
            }
        };

        if windows.is_empty() {
            debug!(path = %wav_path.display(), "no speech windows, dropping chunk");
            self.discard(wav_path);
            return;
        }

        for (i, &(start_s, end_s)) in windows.iter().enumerate() {
            let samples = match self.vad.extract(wav_path, start_s, end_s) {
                Ok(samples) => samples,
                Err(e) => {
                    warn!(error = %e, start_s, end_s, "segment extraction failed");
                    continue;
                }
            };
            let seg_path = capture::segment_path(&self.data_dir, stamp, i);
            if let Err(e) = wav::write_mono(&seg_path, &samples) {
                warn!(error = %e, path = %seg_path.display(), "failed to write segment");
                continue;
            }
            let chunk = AudioChunk {
                path: seg_path,
                window: Some((start_s, end_s)),
                captured_at: Local::now(),
            };
            if !enqueue_until_stop(&self.tx, &self.signals, chunk).await {
                return;
            }
        }

        // The segments carry the audio now.
        self.discard(wav_path);
    }

    fn discard(&self, wav_path: &Path) {
        if self.cleanup_wav {
            if let Err(e) = std::fs::remove_file(wav_path) {
                debug!(error = %e, path = %wav_path.display(), "could not remove chunk");
            }
        }
    }
}
