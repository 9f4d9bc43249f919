//! Health monitoring and recovery policy.
//!
//! Every stage reports successes and failures here; the monitor answers
//! with a verdict that only depends on the current consecutive-error count.
//! The LM-down latch switches the pipeline into transcription-only mode and
//! clears itself on the next LM success.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::capture;
use crate::llm::LmClient;

/// Minimum free space on the output volume before preflight warns.
pub const MIN_FREE_DISK_MB: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureVerdict {
    Retry,
    Backoff,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscribeVerdict {
    Retry,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmVerdict {
    Retry,
    TranscribeOnly,
}

#[derive(Default)]
pub struct HealthMonitor {
    consecutive_capture_errors: AtomicU32,
    consecutive_transcribe_errors: AtomicU32,
    lm_down: AtomicBool,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_capture_success(&self) {
        self.consecutive_capture_errors.store(0, Ordering::Relaxed);
    }

    pub fn on_capture_error(&self) -> CaptureVerdict {
        let count = self.consecutive_capture_errors.fetch_add(1, Ordering::Relaxed) + 1;
        if count <= 2 {
            CaptureVerdict::Retry
        } else if count <= 5 {
            warn!(count, "multiple capture errors, backing off");
            CaptureVerdict::Backoff
        } else {
            error!(count, "too many capture errors, skipping");
            CaptureVerdict::Skip
        }
    }

    pub fn on_transcribe_success(&self) {
        self.consecutive_transcribe_errors.store(0, Ordering::Relaxed);
    }

    pub fn on_transcribe_error(&self) -> TranscribeVerdict {
        let count = self.consecutive_transcribe_errors.fetch_add(1, Ordering::Relaxed) + 1;
        if count <= 3 {
            TranscribeVerdict::Retry
        } else {
            TranscribeVerdict::Skip
        }
    }

    /// An LM call failed. Probes liveness: a dead server latches degraded
    /// mode, a live one means the failure was transient.
    pub async fn on_llm_error(&self, client: &LmClient) -> LlmVerdict {
        if !client.is_alive().await {
            if !self.lm_down.swap(true, Ordering::Relaxed) {
                warn!("LM server is down, switching to transcription-only mode");
            }
            LlmVerdict::TranscribeOnly
        } else {
            LlmVerdict::Retry
        }
    }

    pub fn on_llm_success(&self) {
        if self.lm_down.swap(false, Ordering::Relaxed) {
            info!("LM server is back, resuming translation");
        }
    }

    pub fn is_lm_down(&self) -> bool {
        self.lm_down.load(Ordering::Relaxed)
    }

    /// Pre-latch degraded mode (used when preflight finds the LM down).
    pub fn latch_lm_down(&self) {
        self.lm_down.store(true, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn capture_error_count(&self) -> u32 {
        self.consecutive_capture_errors.load(Ordering::Relaxed)
    }
}

// ── Preflight ──────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("loopback audio device not found (no \"BlackHole\" in device list); cannot capture system audio")]
    NoLoopbackDevice,
    #[error("could not list audio devices: {0}")]
    DeviceListing(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub lm_alive: bool,
    pub free_disk_mb: Option<u64>,
    pub disk_ok: bool,
}

/// Free space in MB on the volume holding `path`, best-effort.
pub fn free_disk_mb(path: &Path) -> Option<u64> {
    let absolute = std::fs::canonicalize(path)
        .or_else(|_| std::env::current_dir().map(|cwd| cwd.join(path)))
        .ok()?;

    let disks = sysinfo::Disks::new_with_refreshed_list();
    disks
        .iter()
        .filter(|disk| absolute.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space() / (1024 * 1024))
}

/// Run the startup checks. A missing loopback device is fatal; a dead LM
/// server pre-latches degraded mode; low disk only warns.
pub async fn run_preflight(
    monitor: &HealthMonitor,
    client: &LmClient,
    out_dir: &Path,
) -> Result<PreflightReport, PreflightError> {
    let devices = capture::list_devices().await?;
    if !devices.contains("BlackHole") {
        return Err(PreflightError::NoLoopbackDevice);
    }
    info!("preflight loopback device: OK");

    let lm_alive = client.is_alive().await;
    if lm_alive {
        info!("preflight LM server: OK");
    } else {
        warn!(url = client.base_url(), "preflight LM server: unreachable, starting in transcription-only mode");
        monitor.latch_lm_down();
    }

    let free_disk = free_disk_mb(out_dir);
    let disk_ok = free_disk.map_or(true, |mb| mb >= MIN_FREE_DISK_MB);
    match free_disk {
        Some(mb) if mb < MIN_FREE_DISK_MB => {
            warn!(free_mb = mb, minimum = MIN_FREE_DISK_MB, "preflight disk space: low");
        }
        Some(mb) => info!(free_mb = mb, "preflight disk space: OK"),
        None => warn!("preflight disk space: could not determine free space"),
    }

    Ok(PreflightReport { lm_alive, free_disk_mb: free_disk, disk_ok })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn capture_policy_escalates_with_consecutive_errors() {
        let monitor = HealthMonitor::new();
        assert_eq!(monitor.on_capture_error(), CaptureVerdict::Retry);
        assert_eq!(monitor.on_capture_error(), CaptureVerdict::Retry);
        assert_eq!(monitor.on_capture_error(), CaptureVerdict::Backoff);
        assert_eq!(monitor.on_capture_error(), CaptureVerdict::Backoff);
        assert_eq!(monitor.on_capture_error(), CaptureVerdict::Backoff);
        assert_eq!(monitor.on_capture_error(), CaptureVerdict::Skip);
        assert_eq!(monitor.on_capture_error(), CaptureVerdict::Skip);
    }

    #[test]
    fn capture_success_resets_the_counter() {
        let monitor = HealthMonitor::new();
        for _ in 0..6 {
            monitor.on_capture_error();
        }
        monitor.on_capture_success();
        assert_eq!(monitor.on_capture_error(), CaptureVerdict::Retry);
    }

    #[test]
    fn transcribe_policy() {
        let monitor = HealthMonitor::new();
        for _ in 0..3 {
            assert_eq!(monitor.on_transcribe_error(), TranscribeVerdict::Retry);
        }
        assert_eq!(monitor.on_transcribe_error(), TranscribeVerdict::Skip);
        monitor.on_transcribe_success();
        assert_eq!(monitor.on_transcribe_error(), TranscribeVerdict::Retry);
    }

    proptest! {
        // The verdict after a success run depends only on the errors that
        // came after the run, no matter how long it was.
        #[test]
        fn verdict_ignores_success_history(successes in 0usize..200, errors in 1u32..10) {
            let monitor = HealthMonitor::new();
            for _ in 0..successes {
                monitor.on_capture_success();
            }
            let mut last = CaptureVerdict::Retry;
            for _ in 0..errors {
                last = monitor.on_capture_error();
            }
            let expected = if errors <= 2 {
                CaptureVerdict::Retry
            } else if errors <= 5 {
                CaptureVerdict::Backoff
            } else {
                CaptureVerdict::Skip
            };
            prop_assert_eq!(last, expected);
        }
    }
}
