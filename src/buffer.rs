//! Ring buffer of translated lines feeding the minutes stage.
//!
//! Entries carry a monotonic sequence number that is never reused, so the
//! minutes stage can window on "everything newer than what I summarized"
//! even while old entries are evicted under pressure. Positional indices
//! would silently shift on eviction; sequence numbers are the only stable
//! identity an entry has.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default ring capacity.
pub const BUFFER_CAPACITY: usize = 1200;

#[derive(Debug, Clone)]
pub struct BufferEntry {
    /// Strictly increasing, starts at 1, survives eviction.
    pub seq: u64,
    /// Unix seconds when the translation landed.
    pub unix_time: u64,
    /// Formatted line, `[<ts>] <translation>`.
    pub line: String,
}

/// One snapshot taken by the minutes stage.
#[derive(Debug, Default)]
pub struct BufferSnapshot {
    pub lines: Vec<String>,
    /// Highest seq currently in the buffer, regardless of filters. The
    /// minutes stage advances its cursor to this on success.
    pub max_seq: u64,
}

struct Inner {
    entries: VecDeque<BufferEntry>,
    next_seq: u64,
}

pub struct TranslationBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl TranslationBuffer {
    pub fn new() -> Self {
        Self::with_capacity(BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner { entries: VecDeque::with_capacity(capacity), next_seq: 0 }),
            capacity,
        }
    }

    fn unix_now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Append a line, assigning the next sequence number. Evicts the oldest
    /// entry when full. Returns the assigned seq.
    pub fn push(&self, line: String) -> u64 {
        self.push_at(line, Self::unix_now())
    }

    /// Like [`push`](Self::push) with an explicit timestamp (tests drive the
    /// clock through this).
    pub fn push_at(&self, line: String, unix_time: u64) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        inner.next_seq += 1;
        let seq = inner.next_seq;
        if inner.entries.len() == self.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(BufferEntry { seq, unix_time, line });
        seq
    }

    /// Entries with `seq > last_seen` that fall inside the time window.
    /// `window_seconds <= 0` disables the time filter.
    pub fn snapshot_since(&self, last_seen: u64, window_seconds: i64) -> BufferSnapshot {
        self.snapshot_since_at(last_seen, window_seconds, Self::unix_now())
    }

    pub fn snapshot_since_at(&self, last_seen: u64, window_seconds: i64, now: u64) -> BufferSnapshot {
        let inner = self.inner.lock().unwrap();
        let max_seq = inner.entries.back().map(|e| e.seq).unwrap_or(last_seen);
        let cutoff = if window_seconds > 0 {
            now.saturating_sub(window_seconds as u64)
        } else {
            0
        };
        let lines = inner
            .entries
            .iter()
            .filter(|e| e.seq > last_seen && e.unix_time >= cutoff)
            .map(|e| e.line.clone())
            .collect();
        BufferSnapshot { lines, max_seq }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current value of the sequence counter (last assigned seq).
    pub fn last_seq(&self) -> u64 {
        self.inner.lock().unwrap().next_seq
    }

    /// Drop every entry and rewind the sequence counter to zero.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.next_seq = 0;
    }
}

impl Default for TranslationBuffer {
    fn default() -> Self {
        Self::new()
    }
}
