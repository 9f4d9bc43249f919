//! Append-only transcript and translation logs.
//!
//! Each file has exactly one writer stage, so plain append-on-write is safe.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct AppendLog {
    path: PathBuf,
}

impl AppendLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{line}")
    }
}

pub fn transcript_line(timestamp: &str, text: &str) -> String {
    format!("[{timestamp}] [SYS] {text}")
}

pub fn translation_line(timestamp: &str, target_lang: &str, text: &str) -> String {
    format!("[{timestamp}] [SYS->{target_lang}] {text}")
}
