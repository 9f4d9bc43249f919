//! Environment diagnostics. Checks everything the live pipeline needs and
//! prints a report without recording anything.

use live_minutes::capture;
use live_minutes::health;
use live_minutes::llm::LmClient;
use live_minutes::Config;

fn ok(msg: &str) {
    println!("[ok]   {msg}");
}

fn warn(msg: &str) {
    println!("[warn] {msg}");
}

fn fail(msg: &str) -> ! {
    println!("[fail] {msg}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    println!("=== live-minutes doctor ===");
    let config = Config::from_env();

    // ffmpeg + device listing
    let devices = match capture::list_devices().await {
        Ok(text) => text,
        Err(e) => fail(&format!("could not run ffmpeg device listing: {e}. Install ffmpeg first.")),
    };
    ok("ffmpeg can list avfoundation devices");

    if devices.contains("BlackHole") {
        ok("loopback device (BlackHole) present");
    } else {
        fail("no BlackHole loopback device found; system audio cannot be captured");
    }

    let idx_marker = format!("[{}]", config.system_audio_idx);
    if devices.contains(&idx_marker) {
        ok(&format!("system audio device index {} present", config.system_audio_idx));
    } else {
        warn(&format!(
            "SYSTEM_AUDIO_IDX={} not found in the device list; update the env var or re-check device order",
            config.system_audio_idx
        ));
    }

    // Disk space
    match health::free_disk_mb(&config.out_dir) {
        Some(mb) if mb >= health::MIN_FREE_DISK_MB => ok(&format!("{mb} MB free on the output volume")),
        Some(mb) => warn(&format!(
            "only {mb} MB free on the output volume (minimum {})",
            health::MIN_FREE_DISK_MB
        )),
        None => warn("could not determine free disk space"),
    }

    // LM server + models
    let lm = LmClient::new(&config.lm_base_url);
    if !lm.is_alive().await {
        warn(&format!(
            "LM server not reachable at {}; the pipeline would start in transcription-only mode",
            config.lm_base_url
        ));
    } else {
        ok(&format!("LM server reachable at {}", config.lm_base_url));
        match lm.list_models().await {
            Ok(models) => {
                ok(&format!("LM server reports {} model(s)", models.len()));
                for (label, wanted) in
                    [("fast", &config.lm_model_fast), ("smart", &config.lm_model_smart)]
                {
                    if models.iter().any(|m| m == wanted) {
                        ok(&format!("{label} model found: {wanted}"));
                    } else {
                        warn(&format!("{label} model not in /models: {wanted}"));
                    }
                }
            }
            Err(e) => warn(&format!("could not list models: {e}")),
        }
    }

    println!("\nAll checks done.");
}
