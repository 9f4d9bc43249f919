//! Structured transcript artifacts: JSON document and SRT subtitle track.
//!
//! Entries stay in memory for the whole meeting; files are fully rewritten
//! on a batched schedule (at most once per flush interval) plus one forced
//! flush at shutdown.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde::Serialize;

/// Minimum spacing between on-disk rewrites.
const FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Subtitle duration assumed for the final cue, which has no successor.
const LAST_CUE_SECONDS: f64 = 10.0;

#[derive(Debug, Clone)]
struct Record {
    index: u64,
    timestamp: DateTime<Local>,
    relative_seconds: f64,
    text: String,
    translation: String,
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    timestamp: String,
    relative_seconds: f64,
    text: &'a str,
    translation: &'a str,
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    meeting_start: String,
    entries: Vec<JsonEntry<'a>>,
}

struct State {
    records: Vec<Record>,
    counter: u64,
    dirty: bool,
    last_flush: Instant,
}

pub struct StructuredOutput {
    out_dir: PathBuf,
    meeting_start: DateTime<Local>,
    flush_interval: Duration,
    state: Mutex<State>,
}

impl StructuredOutput {
    pub fn new(out_dir: impl Into<PathBuf>, meeting_start: DateTime<Local>) -> Self {
        Self {
            out_dir: out_dir.into(),
            meeting_start,
            flush_interval: FLUSH_INTERVAL,
            state: Mutex::new(State {
                records: Vec::new(),
                counter: 0,
                dirty: false,
                last_flush: Instant::now(),
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Record one translated utterance. O(1); only triggers a file rewrite
    /// when the flush interval has elapsed.
    pub fn add_entry(&self, text: &str, translation: &str) {
        self.add_entry_at(text, translation, Local::now());
    }

    pub fn add_entry_at(&self, text: &str, translation: &str, timestamp: DateTime<Local>) {
        let mut state = self.state.lock().unwrap();
        state.counter += 1;
        let index = state.counter;
        let relative_seconds =
            (timestamp - self.meeting_start).num_milliseconds() as f64 / 1000.0;
        state.records.push(Record {
            index,
            timestamp,
            relative_seconds,
            text: text.to_string(),
            translation: translation.to_string(),
        });
        state.dirty = true;

        if state.last_flush.elapsed() >= self.flush_interval {
            self.flush(&mut state);
        }
    }

    /// Force a rewrite regardless of the interval. Called at shutdown.
    pub fn flush_final(&self) {
        let mut state = self.state.lock().unwrap();
        self.flush(&mut state);
    }

    fn flush(&self, state: &mut State) {
        if !state.dirty {
            return;
        }
        if let Err(e) = self.write_json(&state.records) {
            tracing::error!(error = %e, "failed to write transcript.json");
        }
        if let Err(e) = self.write_srt(&state.records) {
            tracing::error!(error = %e, "failed to write transcript.srt");
        }
        state.dirty = false;
        state.last_flush = Instant::now();
    }

    fn write_json(&self, records: &[Record]) -> std::io::Result<()> {
        let document = JsonDocument {
            meeting_start: self.meeting_start.to_rfc3339(),
            entries: records
                .iter()
                .map(|r| JsonEntry {
                    timestamp: r.timestamp.to_rfc3339(),
                    relative_seconds: r.relative_seconds,
                    text: &r.text,
                    translation: &r.translation,
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&document)?;
        std::fs::create_dir_all(&self.out_dir)?;
        std::fs::write(self.out_dir.join("transcript.json"), json)
    }

    fn write_srt(&self, records: &[Record]) -> std::io::Result<()> {
        let mut lines = Vec::with_capacity(records.len() * 4);
        for (i, record) in records.iter().enumerate() {
            let start = record.relative_seconds;
            let end = records
                .get(i + 1)
                .map(|next| next.relative_seconds)
                .unwrap_or(start + LAST_CUE_SECONDS);

            let text = if record.translation.is_empty() { &record.text } else { &record.translation };
            lines.push(record.index.to_string());
            lines.push(format!("{} --> {}", srt_time(start), srt_time(end)));
            lines.push(text.clone());
            lines.push(String::new());
        }
        std::fs::create_dir_all(&self.out_dir)?;
        std::fs::write(self.out_dir.join("transcript.srt"), lines.join("\n"))
    }
}

/// `HH:MM:SS,mmm` with negative inputs clamped to zero.
pub fn srt_time(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let whole = seconds as u64;
    let hours = whole / 3600;
    let minutes = (whole % 3600) / 60;
    let secs = whole % 60;
    let millis = ((seconds - whole as f64) * 1000.0) as u64;
    format!("{hours:02}:{minutes:02}:{secs:02},{millis:03}")
}
