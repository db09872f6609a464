//! Data model for the transcription pipeline.
//!
//! Records and settings are persisted as JSON with camelCase field names,
//! matching the on-disk layout consumed by history viewers. Segment fields
//! keep the snake_case names used by the upstream verbose_json API response.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One segment of a verbose transcription response.
///
/// Read-only diagnostic detail reported by the transcription endpoint;
/// the pipeline stores it but never interprets it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionSegment {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub seek: i64,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tokens: Vec<i64>,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default)]
    pub avg_logprob: f64,
    #[serde(default)]
    pub compression_ratio: f64,
    #[serde(default)]
    pub no_speech_prob: f64,
}

/// Provenance of a transcription call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionMetadata {
    pub model: String,
    pub language: String,
    #[serde(default)]
    pub segments: Vec<TranscriptionSegment>,
}

/// A persisted transcription result plus its audio reference and metadata.
///
/// `audio_uri` lifetime is independent of the record: the underlying file may
/// be deleted without touching the record, and vice versa. `corrected_text`
/// is only meaningful while `is_spell_checked` is true; once set, the flag is
/// never cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionRecord {
    pub id: String,
    pub text: String,
    pub audio_uri: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Reported audio duration in seconds; 0 if unknown.
    pub duration: f64,
    pub metadata: TranscriptionMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_text: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_text: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_spell_checked: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl TranscriptionRecord {
    /// Create a new record with a fresh id and timestamp.
    pub fn new(
        text: String,
        audio_uri: String,
        duration: f64,
        metadata: TranscriptionMetadata,
    ) -> Self {
        Self {
            id: next_record_id(),
            text,
            audio_uri,
            timestamp: Utc::now().timestamp_millis(),
            duration,
            metadata,
            edited_text: None,
            is_edited: false,
            corrected_text: None,
            is_spell_checked: false,
        }
    }

    /// The text a user currently sees: the edit if one exists, otherwise the
    /// raw transcription.
    pub fn display_text(&self) -> &str {
        self.edited_text.as_deref().unwrap_or(&self.text)
    }
}

static LAST_ID: AtomicI64 = AtomicI64::new(0);

/// Generate a unique, monotonic record id from the millisecond clock.
///
/// Two calls within the same millisecond bump past the previously issued id,
/// so ids are strictly increasing within a process.
pub fn next_record_id() -> String {
    let now = Utc::now().timestamp_millis();
    let mut prev = LAST_ID.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(prev + 1);
        match LAST_ID.compare_exchange(prev, candidate, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return candidate.to_string(),
            Err(actual) => prev = actual,
        }
    }
}

/// Successful payload of the transcription endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<TranscriptionSegment>>,
}

/// Process-wide audio preferences, persisted and mutated only through the
/// storage layer's settings API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioSettings {
    /// Delete the audio asset after playback finishes.
    pub auto_delete_after_playback: bool,
    /// Ask for confirmation before any deletion.
    pub confirm_before_delete: bool,
    /// Relocate recordings into the application-owned audio directory.
    pub use_permanent_storage: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            auto_delete_after_playback: false,
            confirm_before_delete: true,
            use_permanent_storage: true,
        }
    }
}

/// Partial settings update; unset fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioSettingsUpdate {
    pub auto_delete_after_playback: Option<bool>,
    pub confirm_before_delete: Option<bool>,
    pub use_permanent_storage: Option<bool>,
}

impl AudioSettings {
    /// Merge a partial update into these settings, returning the result.
    pub fn merged(self, update: AudioSettingsUpdate) -> Self {
        Self {
            auto_delete_after_playback: update
                .auto_delete_after_playback
                .unwrap_or(self.auto_delete_after_playback),
            confirm_before_delete: update
                .confirm_before_delete
                .unwrap_or(self.confirm_before_delete),
            use_permanent_storage: update
                .use_permanent_storage
                .unwrap_or(self.use_permanent_storage),
        }
    }
}

/// In-memory state of the transcription pipeline, owned by the engine.
///
/// `history` is ordered newest-first. `error` is the single user-visible
/// error channel; it is never auto-cleared, only overwritten by transitions
/// that explicitly set it.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionState {
    pub is_recording: bool,
    pub current_text: String,
    pub preview_text: String,
    pub history: Vec<TranscriptionRecord>,
    pub error: Option<String>,
    pub is_processing: bool,
    pub is_floating_button_visible: bool,
    pub audio_settings: AudioSettings,
}

impl Default for TranscriptionState {
    fn default() -> Self {
        Self {
            is_recording: false,
            current_text: String::new(),
            preview_text: String::new(),
            history: Vec::new(),
            error: None,
            is_processing: false,
            is_floating_button_visible: true,
            audio_settings: AudioSettings::default(),
        }
    }
}

/// Confirmation hook standing in for a platform dialog.
///
/// Takes `(title, message)` and returns whether the user approved. `None`
/// hooks in the storage/capture layers mean "always approved".
pub type ConfirmFn = Box<dyn Fn(&str, &str) -> bool + Send + Sync>;

// =============================================================================
// Tests
// =============================================================================
