//! Transcription worker: turns queued WAV chunks into transcript items.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{enqueue_until_stop, timestamp_now, AudioChunk, Signals, TranscriptItem};
use crate::config::Config;
use crate::health::{HealthMonitor, TranscribeVerdict};
use crate::output::{logs, AppendLog};
use crate::stt::SttEngine;
use crate::ui::UiSink;

/// Attempts per chunk before it is given up.
const TRANSCRIBE_ATTEMPTS: u32 = 3;

/// Whisper idle-audio artifacts. A transcription matching one of these (after
/// lowercasing and trimming) is filler from silence, not speech.
pub const HALLUCINATION_BLACKLIST: [&str; 9] = [
    "thank you",
    "thanks for watching",
    "thanks for listening",
    "you",
    "bye",
    "the end",
    "thank you for watching",
    "subscribe",
    "like and subscribe",
];

pub fn is_hallucination(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    HALLUCINATION_BLACKLIST.contains(&normalized.as_str())
}

pub struct TranscribeStage {
    skip_empty_chunks: bool,
    cleanup_wav: bool,
    signals: Arc<Signals>,
    health: Arc<HealthMonitor>,
    stt: Arc<dyn SttEngine>,
    ui: Arc<dyn UiSink>,
    rx: mpsc::Receiver<AudioChunk>,
    tx: mpsc::Sender<TranscriptItem>,
    transcript_log: AppendLog,
}

impl TranscribeStage {
    pub fn new(
        config: &Config,
        signals: Arc<Signals>,
        health: Arc<HealthMonitor>,
        stt: Arc<dyn SttEngine>,
        ui: Arc<dyn UiSink>,
        rx: mpsc::Receiver<AudioChunk>,
        tx: mpsc::Sender<TranscriptItem>,
    ) -> Self {
        Self {
            skip_empty_chunks: config.skip_empty_chunks,
            cleanup_wav: config.cleanup_wav,
            signals,
            health,
            stt,
            ui,
            rx,
            tx,
            transcript_log: AppendLog::new(config.out_dir.join("transcript.txt")),
        }
    }

    pub async fn run(mut self) {
        info!(engine = self.stt.id(), "transcribe stage started");

        while !self.signals.is_stopped() {
            let chunk = match tokio::time::timeout(Duration::from_secs(1), self.rx.recv()).await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(_) => continue,
            };
            if !self.process(chunk).await {
                break;
            }
        }

        info!("transcribe stage stopped");
    }

    /// Returns false when the downstream queue is gone and the stage should
    /// exit.
    async fn process(&mut self, chunk: AudioChunk) -> bool {
        let Some(raw) = self.transcribe_with_retry(&chunk.path).await else {
            // Only successfully transcribed or explicitly skipped chunks may
            // be removed from disk; failures keep their file.
            return true;
        };

        let text = raw.trim();
        if text.is_empty() {
            debug!(path = %chunk.path.display(), "empty transcript");
            self.discard(&chunk.path);
            return true;
        }
        if self.skip_empty_chunks && is_hallucination(text) {
            debug!(text, "dropping idle-audio filler");
            self.discard(&chunk.path);
            return true;
        }

        self.ui.on_transcript(text);
        let timestamp = timestamp_now();
        if let Err(e) = self.transcript_log.append(&logs::transcript_line(&timestamp, text)) {
            error!(error = %e, "failed to append transcript line");
        }

        let item = TranscriptItem::new(text.to_string(), timestamp);
        let delivered = enqueue_until_stop(&self.tx, &self.signals, item).await;
        self.discard(&chunk.path);
        delivered || self.signals.is_stopped()
    }

    async fn transcribe_with_retry(&self, path: &Path) -> Option<String> {
        for _attempt in 1..=TRANSCRIBE_ATTEMPTS {
            match self.stt.transcribe(path).await {
                Ok(text) => {
                    self.health.on_transcribe_success();
                    return Some(text);
                }
                Err(e) => {
                    let verdict = self.health.on_transcribe_error();
                    error!(error = %e, ?verdict, path = %path.display(), "transcription failed");
                    if verdict == TranscribeVerdict::Skip {
                        return None;
                    }
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        }
        None
    }

    fn discard(&self, path: &Path) {
        if self.cleanup_wav {
            if let Err(e) = std::fs::remove_file(path) {
                debug!(error = %e, path = %path.display(), "could not remove chunk");
            }
        }
    }
}
