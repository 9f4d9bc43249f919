//! Minutes worker: periodically folds new translated lines into a rolling
//! Markdown summary.
//!
//! The stage windows on sequence numbers, not buffer positions: the ring
//! evicts under pressure, and only seqs survive eviction. `last_seen_seq`
//! advances solely on a successful summary, so a failed regeneration retries
//! the same range on the next tick and nothing is summarized twice.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, error, info};

use super::{Signals, TIMESTAMP_FORMAT};
use crate::buffer::TranslationBuffer;
use crate::config::Config;
use crate::llm::{prompts, LmClient};
use crate::ui::UiSink;

/// Longest single sleep between stop checks.
const TICK_SLICE: Duration = Duration::from_secs(10);

const SUMMARY_TIMEOUT: Duration = Duration::from_secs(180);

pub struct MinutesStage {
    summary_every: Duration,
    window_seconds: i64,
    model_smart: String,
    out_dir: PathBuf,
    signals: Arc<Signals>,
    lm: LmClient,
    ui: Arc<dyn UiSink>,
    buffer: Arc<TranslationBuffer>,
    last_seen_seq: u64,
    last_summary: String,
}

impl MinutesStage {
    pub fn new(
        config: &Config,
        signals: Arc<Signals>,
        lm: LmClient,
        ui: Arc<dyn UiSink>,
        buffer: Arc<TranslationBuffer>,
    ) -> Self {
        Self {
            summary_every: Duration::from_secs(config.summary_every_seconds),
            window_seconds: config.minutes_window_seconds,
            model_smart: config.lm_model_smart.clone(),
            out_dir: config.out_dir.clone(),
            signals,
            lm,
            ui,
            buffer,
            last_seen_seq: 0,
            last_summary: String::new(),
        }
    }

    pub async fn run(mut self) {
        info!(every_seconds = self.summary_every.as_secs(), "minutes stage started");

        let mut last_attempt = Instant::now();
        while !self.signals.is_stopped() {
            let elapsed = last_attempt.elapsed();
            if elapsed < self.summary_every {
                let remaining = self.summary_every - elapsed;
                self.signals.sleep_interruptible(remaining.min(TICK_SLICE)).await;
                continue;
            }
            self.tick().await;
            last_attempt = Instant::now();
        }

        info!("minutes stage stopped");
    }

    /// One regeneration attempt. Public to the crate so tests can drive
    /// ticks without waiting out the timer.
    pub(crate) async fn tick(&mut self) {
        let snapshot = self.buffer.snapshot_since(self.last_seen_seq, self.window_seconds);
        if snapshot.lines.is_empty() {
            debug!("no new entries for minutes");
            return;
        }

        let block = snapshot.lines.join("\n");
        if block.trim().is_empty() {
            return;
        }

        let messages = prompts::summary_messages(&block, &self.last_summary);
        match self
            .lm
            .chat(&self.model_smart, &messages, 0.2, SUMMARY_TIMEOUT)
            .await
        {
            Ok(minutes) => {
                self.last_summary = minutes;
                self.last_seen_seq = snapshot.max_seq;
                self.write_artifacts();
                self.ui.on_minutes_updated();
                info!(through_seq = self.last_seen_seq, "minutes updated");
            }
            Err(e) => {
                // last_seen_seq stays put; the same range retries next tick.
                error!(error = %e, "minutes regeneration failed");
            }
        }
    }

    fn write_artifacts(&self) {
        let stamp = Local::now().format(TIMESTAMP_FORMAT);
        let markdown = format!("# Rolling Minutes (updated {stamp})\n\n{}\n", self.last_summary);
        if let Err(e) = std::fs::write(self.out_dir.join("rolling_minutes.md"), markdown) {
            error!(error = %e, "failed to write rolling_minutes.md");
        }
        if let Err(e) = std::fs::write(
            self.out_dir.join("rolling_minutes.txt"),
            format!("{}\n", self.last_summary),
        ) {
            error!(error = %e, "failed to write rolling_minutes.txt");
        }
    }

    #[cfg(test)]
    pub(crate) fn last_seen_seq(&self) -> u64 {
        self.last_seen_seq
    }

    #[cfg(test)]
    pub(crate) fn last_summary(&self) -> &str {
        &self.last_summary
    }
}
