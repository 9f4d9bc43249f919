//! Observer seam for the terminal front.
//!
//! Rendering is out of scope for the pipeline; stages only talk to this
//! trait. The console sink prints meeting-relative timestamps, the silent
//! sink backs tests.

use chrono::{DateTime, Local};

pub trait UiSink: Send + Sync {
    fn on_status(&self, message: &str);
    fn on_transcript(&self, text: &str);
    fn on_translation(&self, text: &str, target_lang: &str);
    fn on_minutes_updated(&self);
    fn on_error(&self, message: &str);
}

/// Plain stdout sink with `[MM:SS]` / `[H:MM:SS]` elapsed prefixes.
pub struct ConsoleUi {
    meeting_start: DateTime<Local>,
}

impl ConsoleUi {
    pub fn new(meeting_start: DateTime<Local>) -> Self {
        Self { meeting_start }
    }

    fn elapsed(&self) -> String {
        let total = (Local::now() - self.meeting_start).num_seconds().max(0);
        let hours = total / 3600;
        let minutes = (total % 3600) / 60;
        let seconds = total % 60;
        if hours > 0 {
            format!("{hours}:{minutes:02}:{seconds:02}")
        } else {
            format!("{minutes:02}:{seconds:02}")
        }
    }
}

impl UiSink for ConsoleUi {
    fn on_status(&self, message: &str) {
        println!("[{}] {message}", self.elapsed());
    }

    fn on_transcript(&self, text: &str) {
        println!("[{}] [SYS] {text}", self.elapsed());
    }

    fn on_translation(&self, text: &str, target_lang: &str) {
        println!("[{}] [SYS->{target_lang}] {text}", self.elapsed());
    }

    fn on_minutes_updated(&self) {
        println!("\n[{}] [MINUTES UPDATED] -> out/rolling_minutes.md\n", self.elapsed());
    }

    fn on_error(&self, message: &str) {
        println!("[{}] [ERROR] {message}", self.elapsed());
    }
}

/// Discards everything.
pub struct NullUi;

impl UiSink for NullUi {
    fn on_status(&self, _message: &str) {}
    fn on_transcript(&self, _text: &str) {}
    fn on_translation(&self, _text: &str, _target_lang: &str) {}
    fn on_minutes_updated(&self) {}
    fn on_error(&self, _message: &str) {}
}
