//! JSON-backed store for history, settings, and audio assets.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use vox_core::error::{Result, VoxError};
use vox_core::types::{
    next_record_id, AudioSettings, AudioSettingsUpdate, ConfirmFn, TranscriptionRecord,
};

const HISTORY_FILE: &str = "history.json";
const SETTINGS_FILE: &str = "audio_settings.json";
const AUDIO_DIR: &str = "audio";

/// Key-value persistence for transcription records and audio settings.
///
/// History writes are full-collection replacements: every mutation rewrites
/// the entire record list under a single key. The store also owns audio file
/// placement (temporary vs. permanent) and deletion, including the
/// confirmation gates. It does not touch the in-memory history collection;
/// membership is the caller's concern.
pub struct TranscriptionStore {
    data_dir: PathBuf,
    settings: Mutex<AudioSettings>,
    confirm: Option<ConfirmFn>,
}

impl TranscriptionStore {
    pub fn new(data_dir: impl Into<PathBuf>, settings: AudioSettings) -> Self {
        Self {
            data_dir: data_dir.into(),
            settings: Mutex::new(settings),
            confirm: None,
        }
    }

    /// Register the confirmation hook used by deletion flows.
    ///
    /// Without a hook, gated deletions proceed as if approved.
    pub fn with_confirm(mut self, confirm: ConfirmFn) -> Self {
        self.confirm = Some(confirm);
        self
    }

    /// The settings currently held by the store.
    pub fn audio_settings(&self) -> AudioSettings {
        *self.settings.lock().expect("settings mutex poisoned")
    }

    fn history_path(&self) -> PathBuf {
        self.data_dir.join(HISTORY_FILE)
    }

    fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }

    /// Directory holding permanently stored recordings.
    pub fn audio_dir(&self) -> PathBuf {
        self.data_dir.join(AUDIO_DIR)
    }

    fn confirmed(&self, title: &str, message: &str) -> bool {
        match &self.confirm {
            Some(hook) => hook(title, message),
            None => true,
        }
    }

    /// Load the full history collection.
    ///
    /// Returns an empty collection if no prior data exists.
    pub async fn load_history(&self) -> Result<Vec<TranscriptionRecord>> {
        let path = self.history_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(VoxError::Storage(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let records: Vec<TranscriptionRecord> = serde_json::from_slice(&bytes)
            .map_err(|e| VoxError::Storage(format!("Failed to parse history: {}", e)))?;
        tracing::debug!(records = records.len(), "History loaded");
        Ok(records)
    }

    /// Replace the persisted history collection.
    pub async fn save_history(&self, records: &[TranscriptionRecord]) -> Result<()> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| VoxError::Storage(format!("Failed to create data dir: {}", e)))?;
        let json = serde_json::to_vec_pretty(records)
            .map_err(|e| VoxError::Storage(format!("Failed to encode history: {}", e)))?;
        tokio::fs::write(self.history_path(), json)
            .await
            .map_err(|e| VoxError::Storage(format!("Failed to write history: {}", e)))?;
        tracing::debug!(records = records.len(), "History saved");
        Ok(())
    }

    /// Load persisted audio settings, if any.
    ///
    /// A corrupt settings document is treated as absent (logged, not an
    /// error). On success the store's held settings are replaced.
    pub async fn load_audio_settings(&self) -> Result<Option<AudioSettings>> {
        let path = self.settings_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(VoxError::Storage(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        match serde_json::from_slice::<AudioSettings>(&bytes) {
            Ok(settings) => {
                *self.settings.lock().expect("settings mutex poisoned") = settings;
                Ok(Some(settings))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable audio settings");
                Ok(None)
            }
        }
    }

    /// Merge a partial update into the held settings and persist the result.
    pub async fn save_audio_settings(&self, update: AudioSettingsUpdate) -> Result<AudioSettings> {
        let merged = self
            .settings
            .lock()
            .expect("settings mutex poisoned")
            .merged(update);

        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| VoxError::Storage(format!("Failed to create data dir: {}", e)))?;
        let json = serde_json::to_vec_pretty(&merged)
            .map_err(|e| VoxError::Storage(format!("Failed to encode settings: {}", e)))?;
        tokio::fs::write(self.settings_path(), json)
            .await
            .map_err(|e| VoxError::Storage(format!("Failed to write settings: {}", e)))?;

        *self.settings.lock().expect("settings mutex poisoned") = merged;
        tracing::info!(?merged, "Audio settings saved");
        Ok(merged)
    }

    /// Relocate a temporary recording into permanent storage.
    ///
    /// When `use_permanent_storage` is off, the input path is returned
    /// unchanged and the file's lifetime stays tied to the OS temp policy.
    pub async fn move_to_storage(&self, temp: &Path) -> Result<PathBuf> {
        if !self.audio_settings().use_permanent_storage {
            return Ok(temp.to_path_buf());
        }

        let dir = self.audio_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| VoxError::Storage(format!("Failed to create audio dir: {}", e)))?;

        let ext = temp
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("m4a");
        let dest = dir.join(format!("recording-{}.{}", next_record_id(), ext));

        match tokio::fs::rename(temp, &dest).await {
            Ok(()) => {}
            Err(_) => {
                // Rename fails across filesystems; fall back to copy + remove.
                tokio::fs::copy(temp, &dest)
                    .await
                    .map_err(|e| VoxError::Storage(format!("Failed to store recording: {}", e)))?;
                if let Err(e) = tokio::fs::remove_file(temp).await {
                    tracing::warn!(path = %temp.display(), error = %e, "Failed to remove temporary recording");
                }
            }
        }

        tracing::info!(path = %dest.display(), "Recording moved to permanent storage");
        Ok(dest)
    }

    /// Delete a record's audio asset, gated by confirmation.
    ///
    /// Returns whether the deletion was approved. Failure to delete the asset
    /// itself is logged and does not block the caller from dropping the
    /// record out of history.
    pub async fn delete_record(&self, record: &TranscriptionRecord) -> Result<bool> {
        if self.audio_settings().confirm_before_delete
            && !self.confirmed(
                "Delete Recording",
                "Are you sure you want to delete this recording?",
            )
        {
            return Ok(false);
        }

        if !record.audio_uri.is_empty() {
            if let Err(e) = tokio::fs::remove_file(&record.audio_uri).await {
                tracing::warn!(
                    path = %record.audio_uri,
                    error = %e,
                    "Failed to delete audio file"
                );
            }
        }
        Ok(true)
    }

    /// Bulk-delete every file in the permanent audio directory.
    ///
    /// Gated by confirmation when `confirm_before_delete` is set. Partial
    /// failures are tolerated: remaining files are still attempted. Returns
    /// whether the cleanup was approved.
    pub async fn cleanup_audio_files(&self) -> Result<bool> {
        let dir = self.audio_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => {
                return Err(VoxError::Storage(format!(
                    "Failed to read audio dir: {}",
                    e
                )))
            }
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| VoxError::Storage(format!("Failed to read audio dir: {}", e)))?
        {
            files.push(entry.path());
        }

        if self.audio_settings().confirm_before_delete
            && !self.confirmed(
                "Delete All Audio Files",
                &format!("Are you sure you want to delete {} audio files?", files.len()),
            )
        {
            return Ok(false);
        }

        for file in files {
            if let Err(e) = tokio::fs::remove_file(&file).await {
                tracing::warn!(path = %file.display(), error = %e, "Failed to delete audio file");
            }
        }
        tracing::info!("Audio directory cleaned up");
        Ok(true)
    }
}

// =============================================================================
// Tests
// =============================================================================
