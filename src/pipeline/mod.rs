//! The four-stage streaming pipeline and its coordinator.
//!
//! Capture -> Transcribe -> Translate -> Minutes, joined by bounded queues.
//! The coordinator owns the queues, the shared buffer, the stop/pause flags
//! and the worker lifecycles; each stage owns nothing but its local state.

pub mod capture_stage;
pub mod minutes_stage;
pub mod transcribe_stage;
pub mod translate_stage;

#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::buffer::TranslationBuffer;
use crate::config::Config;
use crate::health::HealthMonitor;
use crate::llm::LmClient;
use crate::output::StructuredOutput;
use crate::stt::SttEngine;
use crate::ui::{ConsoleUi, UiSink};
use crate::vad::VadEngine;

/// In-flight bound for the capture and transcription queues. Capture stalls
/// against this when transcription falls behind.
pub const QUEUE_CAPACITY: usize = 4;

/// Deadline for joining one worker at shutdown.
const JOIN_DEADLINE: Duration = Duration::from_secs(5);

/// Wall-clock format used in log lines and queue items.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// One recorded (or VAD-extracted) WAV waiting for transcription.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub path: PathBuf,
    /// Sub-range of the parent recording this chunk was cut from, when VAD
    /// split it.
    pub window: Option<(f64, f64)>,
    pub captured_at: DateTime<Local>,
}

/// One recognized utterance waiting for translation. Always the full
/// three-field struct; `retry_count` is the only field that ever changes,
/// and only by requeueing.
#[derive(Debug, Clone)]
pub struct TranscriptItem {
    pub text: String,
    pub timestamp: String,
    pub retry_count: u32,
}

impl TranscriptItem {
    pub fn new(text: String, timestamp: String) -> Self {
        Self { text, timestamp, retry_count: 0 }
    }
}

/// Stop/pause flags shared by every stage. All timed waits poll these on
/// one-second boundaries, so a stop lands within a second.
#[derive(Default)]
pub struct Signals {
    stop: AtomicBool,
    pause: AtomicBool,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub fn set_paused(&self, paused: bool) {
        self.pause.store(paused, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.pause.load(Ordering::Relaxed)
    }

    /// Clear both flags so a stopped pipeline can run again.
    pub fn rearm(&self) {
        self.stop.store(false, Ordering::Relaxed);
        self.pause.store(false, Ordering::Relaxed);
    }

    /// Sleep up to `duration`, waking early when stop is requested.
    pub async fn sleep_interruptible(&self, duration: Duration) {
        let mut remaining = duration;
        while !self.is_stopped() && remaining > Duration::ZERO {
            let slice = remaining.min(Duration::from_secs(1));
            tokio::time::sleep(slice).await;
            remaining = remaining.saturating_sub(slice);
        }
    }
}

/// Blocking enqueue that stays responsive to stop: retries `send_timeout`
/// in one-second slices. Returns false when the pipeline is stopping or the
/// receiver is gone.
pub(crate) async fn enqueue_until_stop<T>(
    tx: &mpsc::Sender<T>,
    signals: &Signals,
    mut item: T,
) -> bool {
    loop {
        if signals.is_stopped() {
            return false;
        }
        match tx.send_timeout(item, Duration::from_secs(1)).await {
            Ok(()) => return true,
            Err(mpsc::error::SendTimeoutError::Timeout(back)) => item = back,
            Err(mpsc::error::SendTimeoutError::Closed(_)) => return false,
        }
    }
}

pub struct Pipeline {
    config: Config,
    signals: Arc<Signals>,
    health: Arc<HealthMonitor>,
    buffer: Arc<TranslationBuffer>,
    structured: Arc<StructuredOutput>,
    ui: Arc<dyn UiSink>,
    lm: LmClient,
    stt: Arc<dyn SttEngine>,
    vad: Arc<dyn VadEngine>,
    workers: Vec<(&'static str, JoinHandle<()>)>,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        let meeting_start = Local::now();
        let lm = LmClient::new(&config.lm_base_url);
        let stt = crate::stt::create_engine(&config);
        let vad = crate::vad::create_vad(config.vad_enabled);
        let structured = Arc::new(StructuredOutput::new(&config.out_dir, meeting_start));
        Self {
            signals: Arc::new(Signals::new()),
            health: Arc::new(HealthMonitor::new()),
            buffer: Arc::new(TranslationBuffer::new()),
            structured,
            ui: Arc::new(ConsoleUi::new(meeting_start)),
            lm,
            stt,
            vad,
            workers: Vec::new(),
            config,
        }
    }

    pub fn with_ui(mut self, ui: Arc<dyn UiSink>) -> Self {
        self.ui = ui;
        self
    }

    pub fn with_stt(mut self, stt: Arc<dyn SttEngine>) -> Self {
        self.stt = stt;
        self
    }

    pub fn with_vad(mut self, vad: Arc<dyn VadEngine>) -> Self {
        self.vad = vad;
        self
    }

    pub fn signals(&self) -> Arc<Signals> {
        Arc::clone(&self.signals)
    }

    pub fn health(&self) -> Arc<HealthMonitor> {
        Arc::clone(&self.health)
    }

    pub fn buffer(&self) -> Arc<TranslationBuffer> {
        Arc::clone(&self.buffer)
    }

    pub fn lm(&self) -> &LmClient {
        &self.lm
    }

    /// Spawn the four workers. Queues are created fresh on every start.
    pub fn start(&mut self) {
        std::fs::create_dir_all(&self.config.data_dir).ok();
        std::fs::create_dir_all(&self.config.out_dir).ok();

        let (capture_tx, capture_rx) = mpsc::channel::<AudioChunk>(QUEUE_CAPACITY);
        let (transcript_tx, transcript_rx) = mpsc::channel::<TranscriptItem>(QUEUE_CAPACITY);

        info!(
            idx = self.config.system_audio_idx,
            chunk_seconds = self.config.chunk_seconds,
            target = %self.config.target_lang,
            summary_every = self.config.summary_every_seconds,
            vad = self.config.vad_enabled,
            "pipeline starting"
        );
        self.ui.on_status(&format!(
            "Pipeline starting (idx={}, chunk={}s)",
            self.config.system_audio_idx, self.config.chunk_seconds
        ));

        let capture = capture_stage::CaptureStage::new(
            &self.config,
            Arc::clone(&self.signals),
            Arc::clone(&self.health),
            Arc::clone(&self.vad),
            capture_tx,
        );
        let transcribe = transcribe_stage::TranscribeStage::new(
            &self.config,
            Arc::clone(&self.signals),
            Arc::clone(&self.health),
            Arc::clone(&self.stt),
            Arc::clone(&self.ui),
            capture_rx,
            transcript_tx.clone(),
        );
        let translate = translate_stage::TranslateStage::new(
            &self.config,
            Arc::clone(&self.signals),
            Arc::clone(&self.health),
            self.lm.clone(),
            Arc::clone(&self.ui),
            Arc::clone(&self.structured),
            Arc::clone(&self.buffer),
            transcript_rx,
            transcript_tx,
        );
        let minutes = minutes_stage::MinutesStage::new(
            &self.config,
            Arc::clone(&self.signals),
            self.lm.clone(),
            Arc::clone(&self.ui),
            Arc::clone(&self.buffer),
        );

        self.workers = vec![
            ("capture", tokio::spawn(capture.run())),
            ("transcribe", tokio::spawn(transcribe.run())),
            ("translate", tokio::spawn(translate.run())),
            ("minutes", tokio::spawn(minutes.run())),
        ];
    }

    /// Block until a stop is requested, then shut down.
    pub async fn run(&mut self) {
        self.start();
        while !self.signals.is_stopped() {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        self.shutdown().await;
    }

    /// Stop every worker (joining each with a deadline), then force-flush
    /// the structured output.
    pub async fn shutdown(&mut self) {
        self.signals.request_stop();
        for (name, handle) in self.workers.drain(..) {
            match tokio::time::timeout(JOIN_DEADLINE, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(worker = name, error = %e, "worker ended abnormally"),
                Err(_) => warn!(worker = name, "worker missed the join deadline"),
            }
        }
        self.structured.flush_final();
        self.ui.on_status("Pipeline stopped");
        info!("pipeline stopped");
    }

    /// Suspend capture before its next recording. Downstream queues keep
    /// draining.
    pub fn pause(&self) {
        self.signals.set_paused(true);
        self.ui.on_status("Paused");
    }

    pub fn resume(&self) {
        self.signals.set_paused(false);
        self.ui.on_status("Resumed");
    }

    /// Stop everything, clear the buffer and sequence counter, re-arm the
    /// flags. The pipeline can be started again afterwards.
    pub async fn reset(&mut self) {
        self.shutdown().await;
        self.buffer.reset();
        self.signals.rearm();
        info!("pipeline reset");
    }
}
