//! Runtime configuration. All environment variable reads happen here;
//! the rest of the crate only ever sees an immutable [`Config`] snapshot.

use std::env;
use std::path::PathBuf;

/// Which speech-to-text backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttBackend {
    /// Local whisper.cpp example server (`/inference`).
    WhisperServer,
    /// OpenAI-compatible `/audio/transcriptions` endpoint.
    OpenAiCompat,
}

#[derive(Debug, Clone)]
pub struct Config {
    // LM server (OpenAI-compatible, e.g. LM Studio)
    pub lm_base_url: String,
    pub lm_model_fast: String,
    pub lm_model_smart: String,

    // Capture
    pub system_audio_idx: u32,
    pub chunk_seconds: u32,

    // Translation / minutes
    pub target_lang: String,
    pub summary_every_seconds: u64,
    /// Minutes only consider buffer entries younger than this. `<= 0`
    /// disables the time filter.
    pub minutes_window_seconds: i64,

    // Transcription
    pub whisper_model: String,
    pub whisper_backend: SttBackend,
    pub whisper_server_url: String,

    // Feature flags
    pub vad_enabled: bool,
    pub stream_translation: bool,
    pub skip_empty_chunks: bool,
    pub cleanup_wav: bool,

    // Directories
    pub data_dir: PathBuf,
    pub out_dir: PathBuf,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn bool_env(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}

fn parse_backend(value: &str) -> SttBackend {
    match value.to_lowercase().as_str() {
        "openai" | "openai-compat" => SttBackend::OpenAiCompat,
        // "auto" and anything unrecognized fall back to the local server.
        _ => SttBackend::WhisperServer,
    }
}

impl Config {
    /// Build a config snapshot from the environment.
    pub fn from_env() -> Self {
        Self {
            lm_base_url: env_or("LMSTUDIO_BASE_URL", "http://localhost:1234/v1")
                .trim_end_matches('/')
                .to_string(),
            lm_model_fast: env_or("LMSTUDIO_MODEL_FAST", "google/gemma-3-4b"),
            lm_model_smart: env_or("LMSTUDIO_MODEL_SMART", "google/gemma-3-4b"),
            system_audio_idx: env_or("SYSTEM_AUDIO_IDX", "2").parse().unwrap_or(2),
            chunk_seconds: env_or("CHUNK_SECONDS", "10").parse().unwrap_or(10),
            target_lang: env_or("TARGET_LANG", "English"),
            summary_every_seconds: env_or("SUMMARY_EVERY_SECONDS", "300").parse().unwrap_or(300),
            minutes_window_seconds: env_or("MINUTES_WINDOW", "600").parse().unwrap_or(600),
            whisper_model: env_or("WHISPER_MODEL", "small"),
            whisper_backend: parse_backend(&env_or("WHISPER_BACKEND", "auto")),
            whisper_server_url: env_or("WHISPER_SERVER_URL", "http://127.0.0.1:8080")
                .trim_end_matches('/')
                .to_string(),
            vad_enabled: bool_env("VAD_ENABLED", true),
            stream_translation: bool_env("STREAM_TRANSLATION", false),
            skip_empty_chunks: bool_env("SKIP_EMPTY_CHUNKS", true),
            cleanup_wav: bool_env("CLEANUP_WAV", true),
            data_dir: PathBuf::from("data/live"),
            out_dir: PathBuf::from("out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parsing() {
        assert_eq!(parse_backend("auto"), SttBackend::WhisperServer);
        assert_eq!(parse_backend("whisper-server"), SttBackend::WhisperServer);
        assert_eq!(parse_backend("openai"), SttBackend::OpenAiCompat);
        assert_eq!(parse_backend("OpenAI-Compat"), SttBackend::OpenAiCompat);
    }
}
