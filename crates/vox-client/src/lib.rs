//! Vox Client crate - remote speech-to-text and spell-check calls.
//!
//! Uploads recorded audio as a multipart form to an OpenAI-compatible
//! transcription endpoint, and submits spell-check requests to a
//! chat-completion endpoint. One bounded retry-with-backoff policy is applied
//! uniformly to all network calls.

pub mod client;
pub mod retry;

pub use client::{filter_history, SpeechToText, TranscriptionClient, MAX_AUDIO_BYTES};
pub use retry::RetryPolicy;
