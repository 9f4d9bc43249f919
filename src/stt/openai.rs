//! OpenAI-compatible transcription backend (`POST /audio/transcriptions`).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;

use super::interface::{read_wav_bytes, SttEngine, SttError};

pub struct OpenAiCompatEngine {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenAiCompatEngine {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }
}

#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[async_trait]
impl SttEngine for OpenAiCompatEngine {
    fn id(&self) -> &str {
        "openai-compat"
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/models", self.base_url))
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
            .text("model", self.model.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .multipart(form)
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .map_err(|e| SttError::Unavailable(format!("http error: {e}")))?;

        if !response.status().is_success() {
            return Err(SttError::Failed(format!(
                "transcription endpoint returned {}",
                response.status()
            )));
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| SttError::Failed(format!("bad response body: {e}")))?;

        Ok(body.text.trim().to_string())
    }
}
