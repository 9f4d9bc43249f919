//! End-to-end scenarios: stages wired together against a mocked LM server
//! and a scripted STT engine. No ffmpeg involved; chunks are injected into
//! the capture queue as real WAV files.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::helpers::*;
use crate::buffer::TranslationBuffer;
use crate::config::Config;
use crate::health::HealthMonitor;
use crate::llm::LmClient;
use crate::output::StructuredOutput;
use crate::pipeline::transcribe_stage::TranscribeStage;
use crate::pipeline::translate_stage::TranslateStage;
use crate::pipeline::{AudioChunk, Signals, TranscriptItem, QUEUE_CAPACITY};

struct Harness {
    signals: Arc<Signals>,
    health: Arc<HealthMonitor>,
    buffer: Arc<TranslationBuffer>,
    structured: Arc<StructuredOutput>,
    ui: Arc<RecordingUi>,
    capture_tx: mpsc::Sender<AudioChunk>,
    transcript_tx: mpsc::Sender<TranscriptItem>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl Harness {
    /// Wire transcribe + translate against the given config and STT script.
    fn start(config: &Config, server_url: &str, stt: Arc<ScriptedStt>) -> Self {
        std::fs::create_dir_all(&config.out_dir).unwrap();

        let signals = Arc::new(Signals::new());
        let health = Arc::new(HealthMonitor::new());
        let buffer = Arc::new(TranslationBuffer::new());
        let structured = Arc::new(StructuredOutput::new(&config.out_dir, Local::now()));
        let ui = RecordingUi::new();

        let (capture_tx, capture_rx) = mpsc::channel::<AudioChunk>(QUEUE_CAPACITY);
        let (transcript_tx, transcript_rx) = mpsc::channel::<TranscriptItem>(QUEUE_CAPACITY);

        let transcribe = TranscribeStage::new(
            config,
            Arc::clone(&signals),
            Arc::clone(&health),
            stt,
            ui.clone(),
            capture_rx,
            transcript_tx.clone(),
        );
        let translate = TranslateStage::new(
            config,
            Arc::clone(&signals),
            Arc::clone(&health),
            LmClient::new(server_url),
            ui.clone(),
            Arc::clone(&structured),
            Arc::clone(&buffer),
            transcript_rx,
            transcript_tx.clone(),
        );

        let workers = vec![tokio::spawn(transcribe.run()), tokio::spawn(translate.run())];

        Self { signals, health, buffer, structured, ui, capture_tx, transcript_tx, workers }
    }

    async fn stop(mut self) {
        self.signals.request_stop();
        for handle in self.workers.drain(..) {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
        self.structured.flush_final();
    }
}

fn parse_srt_time(t: &str) -> f64 {
    let (clock, millis) = t.trim().split_once(',').unwrap();
    let parts: Vec<u64> = clock.split(':').map(|p| p.parse().unwrap()).collect();
    (parts[0] * 3600 + parts[1] * 60 + parts[2]) as f64 + millis.parse::<u64>().unwrap() as f64 / 1000.0
}

fn first_cue(srt: &str) -> (u64, f64, f64) {
    let mut lines = srt.lines();
    let index = lines.next().unwrap().trim().parse().unwrap();
    let (start, end) = lines.next().unwrap().split_once(" --> ").unwrap();
    (index, parse_srt_time(start), parse_srt_time(end))
}

#[tokio::test]
async fn happy_path_produces_every_artifact() {
    let server = MockServer::start().await;
    mount_healthy_llm(&server).await;

    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path(), &server.uri());
    let stt = ScriptedStt::new(vec![Ok("hello world")]);
    let harness = Harness::start(&config, &server.uri(), Arc::clone(&stt));

    let wav = write_test_wav(tmp.path(), "chunk.wav");
    harness
        .capture_tx
        .send(AudioChunk { path: wav.clone(), window: None, captured_at: Local::now() })
        .await
        .unwrap();

    let translation_path = config.out_dir.join("translation.txt");
    assert!(wait_for(|| translation_path.exists(), Duration::from_secs(5)).await);
    assert!(wait_for(|| !wav.exists(), Duration::from_secs(2)).await, "cleanup should remove the chunk");
    let ui = harness.ui.clone();
    let buffer = harness.buffer.clone();
    harness.stop().await;

    let transcript = std::fs::read_to_string(config.out_dir.join("transcript.txt")).unwrap();
    let transcript_lines: Vec<&str> = transcript.lines().collect();
    assert_eq!(transcript_lines.len(), 1);
    assert!(transcript_lines[0].contains("[SYS] hello world"));

    let translation = std::fs::read_to_string(&translation_path).unwrap();
    let translation_lines: Vec<&str> = translation.lines().collect();
    assert_eq!(translation_lines.len(), 1);
    assert!(translation_lines[0].contains("[SYS->English] HELLO WORLD"));

    let json: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(config.out_dir.join("transcript.json")).unwrap(),
    )
    .unwrap();
    let entries = json["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["text"], "hello world");
    assert_eq!(entries[0]["translation"], "HELLO WORLD");

    let srt = std::fs::read_to_string(config.out_dir.join("transcript.srt")).unwrap();
    let (index, start, end) = first_cue(&srt);
    assert_eq!(index, 1);
    assert!((end - start - 10.0).abs() < 0.001, "last cue runs for 10s, got {}", end - start);

    assert_eq!(buffer.last_seq(), 1);
    let events = ui.events();
    assert!(events.iter().any(|e| e == "transcript:hello world"));
    assert!(events.iter().any(|e| e == "translation:English:HELLO WORLD"));
}

#[tokio::test]
async fn hallucinated_filler_is_dropped_before_any_sink() {
    let server = MockServer::start().await;
    mount_healthy_llm(&server).await;

    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path(), &server.uri());
    let stt = ScriptedStt::new(vec![Ok("Thank you")]);
    let harness = Harness::start(&config, &server.uri(), Arc::clone(&stt));

    let wav = write_test_wav(tmp.path(), "silence.wav");
    harness
        .capture_tx
        .send(AudioChunk { path: wav, window: None, captured_at: Local::now() })
        .await
        .unwrap();

    assert!(wait_for(|| stt.calls() >= 1, Duration::from_secs(5)).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let ui = harness.ui.clone();
    harness.stop().await;

    assert!(!config.out_dir.join("transcript.txt").exists());
    assert!(!config.out_dir.join("translation.txt").exists());
    assert_eq!(chat_request_count(&server).await, 0);
    assert!(ui.events().iter().all(|e| !e.starts_with("transcript:")));
}

#[tokio::test]
async fn lm_outage_degrades_then_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path(), &server.uri());
    let stt = ScriptedStt::new(vec![Ok("guten morgen"), Ok("wie geht es")]);
    let harness = Harness::start(&config, &server.uri(), Arc::clone(&stt));

    let wav = write_test_wav(tmp.path(), "a.wav");
    harness
        .capture_tx
        .send(AudioChunk { path: wav, window: None, captured_at: Local::now() })
        .await
        .unwrap();

    // Transcription is the log of record; translation goes dark.
    let transcript_path = config.out_dir.join("transcript.txt");
    assert!(wait_for(|| transcript_path.exists(), Duration::from_secs(5)).await);
    let health = Arc::clone(&harness.health);
    assert!(wait_for(|| health.is_lm_down(), Duration::from_secs(5)).await);
    assert!(!config.out_dir.join("translation.txt").exists());

    // Server comes back; the latch clears on the next item.
    server.reset().await;
    mount_healthy_llm(&server).await;

    let wav = write_test_wav(tmp.path(), "b.wav");
    harness
        .capture_tx
        .send(AudioChunk { path: wav, window: None, captured_at: Local::now() })
        .await
        .unwrap();

    let translation_path = config.out_dir.join("translation.txt");
    assert!(wait_for(|| translation_path.exists(), Duration::from_secs(5)).await);
    assert!(!health.is_lm_down());
    harness.stop().await;

    let translation = std::fs::read_to_string(&translation_path).unwrap();
    assert!(translation.contains("WIE GEHT ES"));
    assert!(!translation.contains("GUTEN MORGEN"), "outage item must stay dropped");
}

#[tokio::test]
async fn retry_budget_is_three_requeues_then_drop() {
    let server = MockServer::start().await;
    // Server is alive but completions always fail, so every failure verdicts
    // to retry.
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path(), &server.uri());
    let stt = ScriptedStt::new(vec![]);
    let harness = Harness::start(&config, &server.uri(), stt);

    harness
        .transcript_tx
        .send(TranscriptItem::new("stubborn".to_string(), "2026-08-01 10:00:00".to_string()))
        .await
        .unwrap();

    // Initial attempt plus three requeues.
    assert!(
        wait_for_async(|| chat_request_count(&server), 4, Duration::from_secs(10)).await,
        "expected exactly 4 translation attempts"
    );
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(chat_request_count(&server).await, 4, "item must be dropped after the fourth failure");
    assert!(!config.out_dir.join("translation.txt").exists());
    harness.stop().await;
}

/// Poll an async counter until it reaches `target`.
async fn wait_for_async<F, Fut>(count: F, target: usize, deadline: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = usize>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if count().await >= target {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    count().await >= target
}

#[tokio::test]
async fn translations_keep_arrival_order() {
    let server = MockServer::start().await;
    mount_healthy_llm(&server).await;

    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path(), &server.uri());
    let stt = ScriptedStt::new(vec![]);
    let harness = Harness::start(&config, &server.uri(), stt);

    for text in ["first point", "second point", "third point"] {
        harness
            .transcript_tx
            .send(TranscriptItem::new(text.to_string(), "2026-08-01 10:00:00".to_string()))
            .await
            .unwrap();
    }

    let translation_path = config.out_dir.join("translation.txt");
    assert!(
        wait_for(
            || {
                std::fs::read_to_string(&translation_path)
                    .map(|s| s.lines().count() >= 3)
                    .unwrap_or(false)
            },
            Duration::from_secs(5)
        )
        .await
    );
    harness.stop().await;

    let translation = std::fs::read_to_string(&translation_path).unwrap();
    let lines: Vec<&str> = translation.lines().collect();
    assert!(lines[0].contains("FIRST POINT"));
    assert!(lines[1].contains("SECOND POINT"));
    assert!(lines[2].contains("THIRD POINT"));
}
