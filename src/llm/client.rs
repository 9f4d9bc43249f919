//! Client for the local OpenAI-compatible LM server (LM Studio).
//!
//! Non-streaming and SSE-streaming chat completions plus the `/models`
//! liveness probe the health monitor uses.

use std::pin::Pin;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timeout for the `/models` liveness probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum LmError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("stream error: {0}")]
    Stream(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageBody,
}

#[derive(Deserialize)]
struct ChatMessageBody {
    content: String,
}

#[derive(Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Clone)]
pub struct LmClient {
    client: reqwest::Client,
    base_url: String,
}

impl LmClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `/models`. Anything but a 200 within the probe timeout counts as
    /// down.
    pub async fn is_alive(&self) -> bool {
        match self
            .client
            .get(format!("{}/models", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status() == StatusCode::OK,
            Err(_) => false,
        }
    }

    /// Model ids reported by `/models`, for diagnostics.
    pub async fn list_models(&self) -> Result<Vec<String>, LmError> {
        #[derive(Deserialize)]
        struct ModelsResponse {
            data: Vec<ModelEntry>,
        }
        #[derive(Deserialize)]
        struct ModelEntry {
            id: String,
        }

        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(LmError::Api { status, body });
        }
        let body: ModelsResponse = response
            .json()
            .await
            .map_err(|e| LmError::Malformed(e.to_string()))?;
        Ok(body.data.into_iter().map(|m| m.id).collect())
    }

    /// Single-shot chat completion.
    pub async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        temperature: f32,
        timeout: Duration,
    ) -> Result<String, LmError> {
        let request = ChatRequest { model, messages, temperature, stream: false };
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LmError::Api { status, body });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LmError::Malformed(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LmError::Malformed("response carried no choices".to_string()))
    }

    /// Streaming chat completion. Yields content deltas; the SSE stream ends
    /// at `data: [DONE]`. Malformed keep-alive lines are skipped.
    pub async fn chat_stream(
        &self,
        model: &str,
        messages: &[Message],
        temperature: f32,
        timeout: Duration,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String, LmError>> + Send>>, LmError> {
        let request = ChatRequest { model, messages, temperature, stream: true };
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LmError::Api { status, body });
        }

        let stream = response
            .bytes_stream()
            .eventsource()
            .map(|result| match result {
                Ok(event) => {
                    if event.data == "[DONE]" {
                        return Ok(None);
                    }
                    match serde_json::from_str::<StreamResponse>(&event.data) {
                        Ok(parsed) => Ok(parsed
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.delta.content)),
                        Err(_) => Ok(None),
                    }
                }
                Err(e) => Err(LmError::Stream(e.to_string())),
            })
            .filter_map(|item| async {
                match item {
                    Ok(Some(content)) => Some(Ok(content)),
                    Ok(None) => None,
                    Err(e) => Some(Err(e)),
                }
            });

        Ok(Box::pin(stream))
    }

    /// Streaming chat completion with the deltas concatenated before use.
    pub async fn chat_collected(
        &self,
        model: &str,
        messages: &[Message],
        temperature: f32,
        timeout: Duration,
    ) -> Result<String, LmError> {
        let mut stream = self.chat_stream(model, messages, temperature, timeout).await?;
        let mut full = String::new();
        while let Some(delta) = stream.next().await {
            full.push_str(&delta?);
        }
        Ok(full)
    }
}
