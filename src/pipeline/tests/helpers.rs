//! Shared fixtures: a scripted STT engine, an event-recording UI sink, an
//! LM mock that echoes translations in uppercase, and small wait/config
//! utilities.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use crate::config::{Config, SttBackend};
use crate::stt::{SttEngine, SttError};
use crate::ui::UiSink;
use crate::vad::wav;

/// STT engine that replays a fixed script of results.
pub struct ScriptedStt {
    script: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
}

impl ScriptedStt {
    pub fn new(results: Vec<Result<&str, &str>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(
                results
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SttEngine for ScriptedStt {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn transcribe(&self, _wav: &Path) -> Result<String, SttError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(msg)) => Err(SttError::Failed(msg)),
            None => Ok(String::new()),
        }
    }
}

/// UI sink that records every event for assertions.
#[derive(Default)]
pub struct RecordingUi {
    pub events: Mutex<Vec<String>>,
}

impl RecordingUi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl UiSink for RecordingUi {
    fn on_status(&self, message: &str) {
        self.events.lock().unwrap().push(format!("status:{message}"));
    }

    fn on_transcript(&self, text: &str) {
        self.events.lock().unwrap().push(format!("transcript:{text}"));
    }

    fn on_translation(&self, text: &str, target_lang: &str) {
        self.events.lock().unwrap().push(format!("translation:{target_lang}:{text}"));
    }

    fn on_minutes_updated(&self) {
        self.events.lock().unwrap().push("minutes".to_string());
    }

    fn on_error(&self, message: &str) {
        self.events.lock().unwrap().push(format!("error:{message}"));
    }
}

/// Config pointed at a temp dir and a mock LM server.
pub fn test_config(root: &Path, lm_base_url: &str) -> Config {
    Config {
        lm_base_url: lm_base_url.trim_end_matches('/').to_string(),
        lm_model_fast: "fast-model".to_string(),
        lm_model_smart: "smart-model".to_string(),
        system_audio_idx: 2,
        chunk_seconds: 10,
        target_lang: "English".to_string(),
        summary_every_seconds: 300,
        minutes_window_seconds: 600,
        whisper_model: "small".to_string(),
        whisper_backend: SttBackend::WhisperServer,
        whisper_server_url: "http://127.0.0.1:8080".to_string(),
        vad_enabled: false,
        stream_translation: false,
        skip_empty_chunks: true,
        cleanup_wav: true,
        data_dir: root.join("data"),
        out_dir: root.join("out"),
    }
}

/// A small real WAV on disk (half a second of tone).
pub fn write_test_wav(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let samples = vec![4000i16; 8000];
    wav::write_mono(&path, &samples).unwrap();
    path
}

/// Responds to chat completions with the user text uppercased, so tests can
/// tell translations apart.
pub struct UppercaseTranslator;

impl Respond for UppercaseTranslator {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let user_text = body["messages"][1]["content"].as_str().unwrap_or_default();
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": user_text.to_uppercase()}}]
        }))
    }
}

/// Mount a healthy `/models` and the uppercase translator.
pub async fn mount_healthy_llm(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(UppercaseTranslator)
        .mount(server)
        .await;
}

/// Poll `condition` until it holds or the deadline passes.
pub async fn wait_for<F: Fn() -> bool>(condition: F, deadline: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    condition()
}

/// Count the POSTs the mock server saw on `/chat/completions`.
pub async fn chat_request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path() == "/chat/completions")
        .count()
}
