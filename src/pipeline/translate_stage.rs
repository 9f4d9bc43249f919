//! Translation worker: translates transcript items, persists them and feeds
//! the summary buffer. When the LM server is down the stage degrades to a
//! drop-and-continue mode; transcription stays the log of record.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{timestamp_now, Signals, TranscriptItem};
use crate::buffer::TranslationBuffer;
use crate::config::Config;
use crate::health::{HealthMonitor, LlmVerdict};
use crate::llm::{prompts, LmClient, LmError};
use crate::output::{logs, AppendLog, StructuredOutput};
use crate::ui::UiSink;

/// A transcript item is requeued at most this many times (I3).
const MAX_RETRIES: u32 = 3;

const TRANSLATE_TIMEOUT: Duration = Duration::from_secs(60);

pub struct TranslateStage {
    target_lang: String,
    model_fast: String,
    stream_translation: bool,
    signals: Arc<Signals>,
    health: Arc<HealthMonitor>,
    lm: LmClient,
    ui: Arc<dyn UiSink>,
    structured: Arc<StructuredOutput>,
    buffer: Arc<TranslationBuffer>,
    rx: mpsc::Receiver<TranscriptItem>,
    /// Clone of our own queue's sender, for requeueing failed items.
    requeue_tx: mpsc::Sender<TranscriptItem>,
    translation_log: AppendLog,
}

impl TranslateStage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &Config,
        signals: Arc<Signals>,
        health: Arc<HealthMonitor>,
        lm: LmClient,
        ui: Arc<dyn UiSink>,
        structured: Arc<StructuredOutput>,
        buffer: Arc<TranslationBuffer>,
        rx: mpsc::Receiver<TranscriptItem>,
        requeue_tx: mpsc::Sender<TranscriptItem>,
    ) -> Self {
        Self {
            target_lang: config.target_lang.clone(),
            model_fast: config.lm_model_fast.clone(),
            stream_translation: config.stream_translation,
            signals,
            health,
            lm,
            ui,
            structured,
            buffer,
            rx,
            requeue_tx,
            translation_log: AppendLog::new(config.out_dir.join("translation.txt")),
        }
    }

    pub async fn run(mut self) {
        info!(target = %self.target_lang, "translate stage started");

        while !self.signals.is_stopped() {
            let item = match tokio::time::timeout(Duration::from_secs(1), self.rx.recv()).await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(_) => continue,
            };
            self.process(item).await;
        }

        info!("translate stage stopped");
    }

    async fn process(&mut self, item: TranscriptItem) {
        // Degraded-mode gate: while the latch is set, probe once per item
        // and drop unless the server came back.
        if self.health.is_lm_down() {
            if self.lm.is_alive().await {
                self.health.on_llm_success();
            } else {
                debug!("LM server still down, dropping translation");
                return;
            }
        }

        match self.translate(&item.text).await {
            Ok(raw) => {
                self.health.on_llm_success();
                let translation = raw.trim();
                if !translation.is_empty() {
                    self.emit(&item, translation);
                }
            }
            Err(e) => {
                let verdict = self.health.on_llm_error(&self.lm).await;
                error!(error = %e, ?verdict, "translation failed");
                match verdict {
                    LlmVerdict::Retry if item.retry_count < MAX_RETRIES => self.requeue(item),
                    LlmVerdict::Retry => {
                        warn!(retries = item.retry_count, "retry budget exhausted, dropping item")
                    }
                    LlmVerdict::TranscribeOnly => {
                        debug!("degraded mode, dropping item");
                    }
                }
            }
        }
    }

    async fn translate(&self, text: &str) -> Result<String, LmError> {
        let messages = prompts::translation_messages(&self.target_lang, text);
        if self.stream_translation {
            self.lm
                .chat_collected(&self.model_fast, &messages, 0.0, TRANSLATE_TIMEOUT)
                .await
        } else {
            self.lm
                .chat(&self.model_fast, &messages, 0.0, TRANSLATE_TIMEOUT)
                .await
        }
    }

    fn emit(&self, item: &TranscriptItem, translation: &str) {
        self.ui.on_translation(translation, &self.target_lang);

        let now = timestamp_now();
        if let Err(e) = self
            .translation_log
            .append(&logs::translation_line(&now, &self.target_lang, translation))
        {
            error!(error = %e, "failed to append translation line");
        }

        self.structured.add_entry(&item.text, translation);
        self.buffer.push(format!("[{now}] {translation}"));
    }

    /// Requeue with the retry counter bumped; text and timestamp are reused
    /// untouched. Non-blocking: a consumer must never block on its own full
    /// queue, so a full queue costs the item instead.
    fn requeue(&self, item: TranscriptItem) {
        let retried = TranscriptItem {
            retry_count: item.retry_count + 1,
            ..item
        };
        if let Err(e) = self.requeue_tx.try_send(retried) {
            error!(error = %e, "could not requeue failed translation, dropping item");
        }
    }
}
