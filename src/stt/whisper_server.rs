//! whisper.cpp server backend.
//!
//! Talks to a running `whisper-server` (the whisper.cpp example server) at
//! `POST /inference`. The model is whatever the server was started with;
//! the configured model name is informational only.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;

use super::interface::{read_wav_bytes, SttEngine, SttError};

pub struct WhisperServerEngine {
    client: reqwest::Client,
    base_url: String,
}

impl WhisperServerEngine {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(serde::Deserialize)]
struct InferenceResponse {
    text: String,
}

#[async_trait]
impl SttEngine for WhisperServerEngine {
    fn id(&self) -> &str {
        "whisper-server"
    }

    async fn is_available(&self) -> bool {
        // The server answers its root with the demo UI.
        self.client
            .get(&self.base_url)
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn transcribe(&self, wav: &Path) -> Result<String, SttError> {
        let bytes = read_wav_bytes(wav)?;

        let part = multipart::Part::bytes(bytes)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| SttError::Failed(format!("mime error: {e}")))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("response_format", "json");

        let response = self
            .client
            .post(format!("{}/inference", self.base_url))
            .multipart(form)
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .map_err(|e| SttError::Unavailable(format!("http error: {e}")))?;

        if !response.status().is_success() {
            return Err(SttError::Failed(format!(
                "whisper server returned {}",
                response.status()
            )));
        }

        let body: InferenceResponse = response
            .json()
            .await
            .map_err(|e| SttError::Failed(format!("bad response body: {e}")))?;

        Ok(body.text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fake_wav(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let p = dir.path().join("a.wav");
        let mut bytes = b"RIFF".to_vec();
        bytes.extend(vec![0u8; 60]);
        std::fs::write(&p, bytes).unwrap();
        p
    }

    #[tokio::test]
    async fn transcribes_via_inference_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inference"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "  hello world  "
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let engine = WhisperServerEngine::new(server.uri());
        let text = engine.transcribe(&fake_wav(&dir)).await.unwrap();
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn server_error_is_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inference"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let engine = WhisperServerEngine::new(server.uri());
        assert!(matches!(
            engine.transcribe(&fake_wav(&dir)).await,
            Err(SttError::Failed(_))
        ));
    }
}
