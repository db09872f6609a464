//! HTTP client for the transcription and spell-check endpoints.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use vox_core::config::ApiConfig;
use vox_core::error::{Result, VoxError};
use vox_core::types::{TranscriptionRecord, TranscriptionResponse};

use crate::retry::RetryPolicy;

/// Maximum accepted audio upload size (25 MiB, the endpoint's limit).
pub const MAX_AUDIO_BYTES: u64 = 25 * 1024 * 1024;

const SPELL_CHECK_INSTRUCTION: &str = "You are a professional spell checker and grammar \
    corrector. Your task is to correct any spelling or grammatical errors in the text while \
    preserving the original meaning. Only make necessary corrections and keep the text as close \
    to the original as possible. Only respond with the corrected text, nothing else.";

/// Remote speech-to-text operations, seam for mocking in engine tests.
pub trait SpeechToText: Send + Sync {
    /// Transcribe the audio asset at `path`.
    fn transcribe(&self, path: &Path) -> impl Future<Output = Result<TranscriptionResponse>> + Send;

    /// Return a minimally edited correction of `text`.
    fn spell_check(&self, text: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Client for an OpenAI-compatible transcription API.
///
/// Holds the resolved bearer token and the retry policy; the language and
/// model are fixed at construction time rather than read from ambient state.
pub struct TranscriptionClient {
    http: reqwest::Client,
    config: ApiConfig,
    api_key: String,
    retry: RetryPolicy,
}

impl TranscriptionClient {
    /// Build a client from API configuration.
    ///
    /// An empty configured key falls back to the `VOX_API_KEY` environment
    /// variable. The per-attempt request timeout comes from
    /// `config.timeout_secs`.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VoxError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let api_key = if config.api_key.is_empty() {
            std::env::var("VOX_API_KEY").unwrap_or_default()
        } else {
            config.api_key.clone()
        };

        let retry = RetryPolicy::new(
            config.max_attempts,
            Duration::from_secs(config.backoff_base_secs),
        );

        Ok(Self {
            http,
            config,
            api_key,
            retry,
        })
    }

    /// Validate, upload, and transcribe a recorded asset.
    ///
    /// Fails with `NotFound` if the asset is missing and `FileTooLarge` above
    /// 25 MiB. Transport and non-2xx failures are retried under the shared
    /// policy before a terminal `Transcription` error carrying the upstream
    /// status and message is surfaced. A 2xx response without text is a
    /// failure, not an empty success.
    pub async fn process_recording(&self, path: &Path) -> Result<TranscriptionResponse> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|_| VoxError::NotFound(path.display().to_string()))?;
        if meta.len() > MAX_AUDIO_BYTES {
            return Err(VoxError::FileTooLarge {
                size: meta.len(),
                limit: MAX_AUDIO_BYTES,
            });
        }

        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("recording.m4a")
            .to_string();
        let mime = audio_mime(path);

        tracing::info!(
            path = %path.display(),
            bytes = bytes.len(),
            model = %self.config.model,
            "Uploading recording for transcription"
        );

        let response = self
            .retry
            .run(|attempt| {
                let bytes = bytes.clone();
                let file_name = file_name.clone();
                async move {
                    tracing::debug!(attempt, "Sending transcription request");
                    let part = reqwest::multipart::Part::bytes(bytes)
                        .file_name(file_name)
                        .mime_str(mime)
                        .map_err(|e| VoxError::Transcription(e.to_string()))?;
                    let form = reqwest::multipart::Form::new()
                        .part("file", part)
                        .text("model", self.config.model.clone())
                        .text("language", self.config.language.clone())
                        .text("response_format", "verbose_json")
                        .text("temperature", "0");

                    let response = self
                        .http
                        .post(&self.config.transcription_url)
                        .bearer_auth(&self.api_key)
                        .multipart(form)
                        .send()
                        .await
                        .map_err(|e| VoxError::Transcription(format!("request failed: {}", e)))?;

                    let status = response.status();
                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        return Err(VoxError::Transcription(format!(
                            "API error {}: {}",
                            status, body
                        )));
                    }

                    response
                        .json::<TranscriptionResponse>()
                        .await
                        .map_err(|e| VoxError::Transcription(format!("invalid response: {}", e)))
                }
            })
            .await?;

        if response.text.trim().is_empty() {
            return Err(VoxError::Transcription(
                "transcription response contained no text".to_string(),
            ));
        }

        tracing::info!(text_len = response.text.len(), "Transcription received");
        Ok(response)
    }

    /// Submit text for minimal-edit spelling and grammar correction.
    ///
    /// Returns the original text if the response carries no usable content;
    /// never returns an empty string for non-empty input.
    pub async fn spell_check_text(&self, text: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.config.chat_model,
            "messages": [
                { "role": "system", "content": SPELL_CHECK_INSTRUCTION },
                { "role": "user", "content": text }
            ],
            "temperature": 0.3,
            "max_tokens": 1024
        });

        let chat: ChatResponse = self
            .retry
            .run(|attempt| {
                let body = body.clone();
                async move {
                    tracing::debug!(attempt, "Sending spell check request");
                    let response = self
                        .http
                        .post(&self.config.chat_url)
                        .bearer_auth(&self.api_key)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| VoxError::SpellCheck(format!("request failed: {}", e)))?;

                    let status = response.status();
                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        return Err(VoxError::SpellCheck(format!(
                            "API error {}: {}",
                            status, body
                        )));
                    }

                    response
                        .json::<ChatResponse>()
                        .await
                        .map_err(|e| VoxError::SpellCheck(format!("invalid response: {}", e)))
                }
            })
            .await?;

        let corrected = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty());

        Ok(corrected.unwrap_or_else(|| text.to_string()))
    }
}

impl SpeechToText for TranscriptionClient {
    async fn transcribe(&self, path: &Path) -> Result<TranscriptionResponse> {
        self.process_recording(path).await
    }

    async fn spell_check(&self, text: &str) -> Result<String> {
        self.spell_check_text(text).await
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

fn audio_mime(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        _ => "audio/m4a",
    }
}

/// Case-insensitive substring search over raw and edited text.
///
/// Pure function, no I/O; records are returned in their original order.
pub fn filter_history(records: &[TranscriptionRecord], query: &str) -> Vec<TranscriptionRecord> {
    let query = query.to_lowercase();
    records
        .iter()
        .filter(|record| {
            record.text.to_lowercase().contains(&query)
                || record
                    .edited_text
                    .as_ref()
                    .is_some_and(|edited| edited.to_lowercase().contains(&query))
        })
        .cloned()
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
