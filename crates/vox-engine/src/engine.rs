//! The transcription pipeline orchestrator.
//!
//! `TranscriptionEngine` owns the shared pipeline state and coordinates the
//! capture, client, and storage layers through the phase machine. Mutations
//! follow a persist-first rule: the history document is written to disk
//! before the in-memory collection is updated, so a failed write leaves the
//! in-memory state matching what is actually on disk.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vox_audio::{AudioCapture, RecordingBackend};
use vox_client::{filter_history, SpeechToText};
use vox_core::config::VoxConfig;
use vox_core::error::{Result, VoxError};
use vox_core::types::{
    AudioSettings, AudioSettingsUpdate, ConfirmFn, TranscriptionMetadata, TranscriptionRecord,
    TranscriptionResponse, TranscriptionState,
};
use vox_storage::TranscriptionStore;

use crate::phase::{EnginePhase, PhaseMachine};
use crate::sink::{NullSink, TextSink};

/// Orchestrates recording, transcription, and persistence.
///
/// All entry points are callable concurrently; the phase machine rejects
/// overlapping flows rather than queueing them. `state` returns a snapshot of
/// the pipeline state for presentation.
pub struct TranscriptionEngine<B: RecordingBackend, C: SpeechToText> {
    capture: AudioCapture<B>,
    client: C,
    store: TranscriptionStore,
    machine: PhaseMachine,
    state: Arc<Mutex<TranscriptionState>>,
    sink: Box<dyn TextSink>,
    confirm: Option<ConfirmFn>,
    model: String,
    language: String,
}

impl<B: RecordingBackend, C: SpeechToText> TranscriptionEngine<B, C> {
    pub fn new(backend: B, client: C, store: TranscriptionStore, config: &VoxConfig) -> Self {
        let state = Arc::new(Mutex::new(TranscriptionState::default()));

        let preview_state = Arc::clone(&state);
        let capture = AudioCapture::new(
            backend,
            Duration::from_millis(config.capture.preview_interval_ms),
        )
        .with_preview(Box::new(move |text| {
            preview_state.lock().expect("state mutex poisoned").preview_text = text;
        }));

        Self {
            capture,
            client,
            store,
            machine: PhaseMachine::new(),
            state,
            sink: Box::new(NullSink),
            confirm: None,
            model: config.api.model.clone(),
            language: config.api.language.clone(),
        }
    }

    /// Register the destination for finished transcription text.
    pub fn with_sink(mut self, sink: Box<dyn TextSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Register the confirmation hook used by the playback auto-delete flow.
    pub fn with_confirm(mut self, confirm: ConfirmFn) -> Self {
        self.confirm = Some(confirm);
        self
    }

    /// A snapshot of the current pipeline state.
    pub fn state(&self) -> TranscriptionState {
        self.state.lock().expect("state mutex poisoned").clone()
    }

    /// The engine's current lifecycle phase.
    pub fn phase(&self) -> EnginePhase {
        self.machine.current()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut TranscriptionState) -> R) -> R {
        f(&mut self.state.lock().expect("state mutex poisoned"))
    }

    fn set_error(&self, message: impl Into<String>) {
        self.with_state(|s| s.error = Some(message.into()));
    }

    /// Hydrate persisted settings and history into the pipeline state.
    pub async fn init(&self) -> Result<()> {
        if let Some(settings) = self.store.load_audio_settings().await? {
            self.with_state(|s| s.audio_settings = settings);
        }
        match self.store.load_history().await {
            Ok(history) => {
                tracing::info!(records = history.len(), "Pipeline state hydrated");
                self.with_state(|s| s.history = history);
                Ok(())
            }
            Err(e) => {
                self.set_error("Failed to load transcription history");
                Err(e)
            }
        }
    }

    /// Open the microphone and begin a recording session.
    ///
    /// Fails with `AlreadyRecording` if a session is active and with an
    /// `InvalidTransition` while async work is in flight. Failures leave the
    /// engine idle with the error recorded in state.
    pub async fn start_recording(&self) -> Result<()> {
        if let Err(e) = self.machine.transition(EnginePhase::Recording) {
            let e = if self.machine.current() == EnginePhase::Recording {
                VoxError::AlreadyRecording
            } else {
                e
            };
            self.set_error(e.to_string());
            return Err(e);
        }

        self.with_state(|s| s.is_processing = true);
        match self.capture.start_recording().await {
            Ok(()) => {
                self.with_state(|s| {
                    s.is_recording = true;
                    s.is_processing = false;
                });
                Ok(())
            }
            Err(e) => {
                self.machine.reset();
                self.with_state(|s| {
                    s.is_processing = false;
                    s.error = Some(e.to_string());
                });
                Err(e)
            }
        }
    }

    /// Stop the active session, transcribe the captured audio, and commit the
    /// resulting record to history.
    ///
    /// The engine always returns to `Idle` afterwards, whether the pipeline
    /// succeeded or not; failures are recorded in the state error channel.
    pub async fn stop_recording(&self) -> Result<TranscriptionRecord> {
        if self.machine.current() != EnginePhase::Recording {
            self.set_error(VoxError::NoActiveSession.to_string());
            return Err(VoxError::NoActiveSession);
        }
        // The check above can be outrun by a concurrent stop; the transition
        // settles the race, and its failure is reported like any other.
        if let Err(e) = self.machine.transition(EnginePhase::Processing) {
            self.set_error(e.to_string());
            return Err(e);
        }
        self.with_state(|s| {
            s.is_recording = false;
            s.is_processing = true;
        });

        let result = self.finish_recording().await;

        self.with_state(|s| {
            s.is_processing = false;
            s.preview_text.clear();
        });
        self.machine.reset();

        result.map_err(|e| {
            self.set_error(e.to_string());
            e
        })
    }

    async fn finish_recording(&self) -> Result<TranscriptionRecord> {
        let path = self
            .capture
            .stop_recording()
            .await?
            .ok_or_else(|| VoxError::Audio("recording produced no audio".to_string()))?;
        let response = self.client.transcribe(&path).await?;
        let stored = self.store.move_to_storage(&path).await?;
        self.commit_record(response, stored.display().to_string())
            .await
    }

    /// Transcribe an existing audio file without going through the recorder.
    ///
    /// The file stays where it is; the committed record references it in
    /// place.
    pub async fn transcribe_file(&self, path: &Path) -> Result<TranscriptionRecord> {
        if let Err(e) = self.claim_processing() {
            self.set_error(e.to_string());
            return Err(e);
        }
        self.with_state(|s| s.is_processing = true);

        let result = self.ingest_file(path).await;

        self.with_state(|s| s.is_processing = false);
        self.machine.reset();

        result.map_err(|e| {
            self.set_error(e.to_string());
            e
        })
    }

    /// Claim the `Processing` phase from `Idle` only.
    ///
    /// The `Recording -> Processing` edge belongs to `stop_recording`; other
    /// async flows must not preempt an open session.
    fn claim_processing(&self) -> Result<()> {
        let phase = self.machine.current();
        if phase != EnginePhase::Idle {
            return Err(VoxError::InvalidTransition {
                from: phase.to_string(),
                to: EnginePhase::Processing.to_string(),
            });
        }
        self.machine.transition(EnginePhase::Processing)
    }

    async fn ingest_file(&self, path: &Path) -> Result<TranscriptionRecord> {
        let response = self.client.transcribe(path).await?;
        self.commit_record(response, path.display().to_string())
            .await
    }

    /// Build a record from a transcription response, persist the grown
    /// history, then commit it to state and deliver the text.
    async fn commit_record(
        &self,
        response: TranscriptionResponse,
        audio_uri: String,
    ) -> Result<TranscriptionRecord> {
        let record = TranscriptionRecord::new(
            response.text.clone(),
            audio_uri,
            response.duration.unwrap_or(0.0),
            TranscriptionMetadata {
                model: self.model.clone(),
                language: response.language.unwrap_or_else(|| self.language.clone()),
                segments: response.segments.unwrap_or_default(),
            },
        );

        let mut updated = vec![record.clone()];
        updated.extend(self.with_state(|s| s.history.clone()));
        self.store.save_history(&updated).await?;

        self.with_state(|s| {
            s.history = updated;
            s.current_text = record.text.clone();
            s.error = None;
        });
        tracing::info!(id = %record.id, "Transcription committed");

        self.deliver(&record);
        Ok(record)
    }

    /// Hand finished text to the sink, respecting the floating button toggle.
    ///
    /// Delivery failures never fail the pipeline; the record is already
    /// committed.
    fn deliver(&self, record: &TranscriptionRecord) {
        if !self.with_state(|s| s.is_floating_button_visible) {
            tracing::debug!("Delivery suppressed, floating button hidden");
            return;
        }
        match self.sink.insert(record.display_text()) {
            Ok(true) => tracing::debug!("Transcription text inserted"),
            Ok(false) => tracing::info!("Transcription text delivered via fallback"),
            Err(e) => tracing::warn!(error = %e, "Failed to deliver transcription text"),
        }
    }

    /// Run the spell-check correction flow for a history record.
    ///
    /// The correction overwrites any previous one; `is_spell_checked` is
    /// never cleared once set.
    pub async fn spell_check_transcription(&self, id: &str) -> Result<TranscriptionRecord> {
        let record = self.with_state(|s| s.history.iter().find(|r| r.id == id).cloned());
        let Some(record) = record else {
            self.set_error("Transcription not found");
            return Err(VoxError::NotFound(id.to_string()));
        };

        if let Err(e) = self.claim_processing() {
            self.set_error(e.to_string());
            return Err(e);
        }
        self.with_state(|s| s.is_processing = true);

        let result = self.run_spell_check(record).await;

        self.with_state(|s| s.is_processing = false);
        self.machine.reset();

        result.map_err(|e| {
            self.set_error("Failed to spell check transcription");
            e
        })
    }

    async fn run_spell_check(
        &self,
        mut record: TranscriptionRecord,
    ) -> Result<TranscriptionRecord> {
        let corrected = self.client.spell_check(record.display_text()).await?;
        record.corrected_text = Some(corrected);
        record.is_spell_checked = true;
        self.persist_update(record).await
    }

    /// Apply a user edit to a record's text.
    ///
    /// Unknown ids are ignored; the edit never touches the raw transcription.
    pub async fn edit_transcription(&self, id: &str, text: &str) -> Result<()> {
        let record = self.with_state(|s| s.history.iter().find(|r| r.id == id).cloned());
        let Some(mut record) = record else {
            tracing::debug!(id, "Edit ignored, no such record");
            return Ok(());
        };
        record.edited_text = Some(text.to_string());
        record.is_edited = true;
        self.persist_update(record).await?;
        Ok(())
    }

    /// Persist a replacement for an existing record, then commit it to state.
    async fn persist_update(&self, updated: TranscriptionRecord) -> Result<TranscriptionRecord> {
        let history = self.with_state(|s| {
            let mut history = s.history.clone();
            if let Some(slot) = history.iter_mut().find(|r| r.id == updated.id) {
                *slot = updated.clone();
            }
            history
        });
        self.store.save_history(&history).await?;
        self.with_state(|s| s.history = history);
        Ok(updated)
    }

    /// Delete a record and its audio asset, honoring the confirmation gate.
    ///
    /// A declined confirmation keeps the record; an unknown id is a silent
    /// no-op.
    pub async fn delete_transcription(&self, id: &str) -> Result<()> {
        let record = self.with_state(|s| s.history.iter().find(|r| r.id == id).cloned());
        let Some(record) = record else {
            tracing::debug!(id, "Delete ignored, no such record");
            return Ok(());
        };

        if !self.store.delete_record(&record).await? {
            tracing::debug!(id, "Deletion declined");
            return Ok(());
        }

        let remaining: Vec<TranscriptionRecord> =
            self.with_state(|s| s.history.iter().filter(|r| r.id != id).cloned().collect());
        self.store.save_history(&remaining).await?;
        self.with_state(|s| s.history = remaining);
        tracing::info!(id, "Transcription deleted");
        Ok(())
    }

    /// Drop the entire history and clean up stored audio.
    pub async fn clear_all_transcriptions(&self) -> Result<()> {
        if let Err(e) = self.store.save_history(&[]).await {
            self.set_error("Failed to clear transcription history");
            return Err(e);
        }
        self.with_state(|s| {
            s.history.clear();
            s.current_text.clear();
        });

        match self.store.cleanup_audio_files().await {
            Ok(true) => {}
            Ok(false) => tracing::debug!("Audio cleanup declined"),
            Err(e) => {
                self.set_error("Failed to clean up audio files");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Play a record's audio asset, running the auto-delete flow afterwards.
    ///
    /// A missing asset is logged and skipped; the record itself is still
    /// valid without its audio.
    pub async fn play_record(&self, uri: &str) -> Result<()> {
        let settings = self.with_state(|s| s.audio_settings);
        match self
            .capture
            .play_record(Path::new(uri), &settings, self.confirm.as_ref())
            .await
        {
            Ok(()) => Ok(()),
            Err(VoxError::NotFound(path)) => {
                tracing::warn!(path = %path, "Audio asset missing, skipping playback");
                Ok(())
            }
            Err(e) => {
                self.set_error("Failed to play recording");
                Err(e)
            }
        }
    }

    /// Case-insensitive search over the in-memory history.
    pub fn search_history(&self, query: &str) -> Vec<TranscriptionRecord> {
        self.with_state(|s| filter_history(&s.history, query))
    }

    /// Flip the floating button visibility, returning the new value.
    pub fn toggle_floating_button(&self) -> bool {
        self.with_state(|s| {
            s.is_floating_button_visible = !s.is_floating_button_visible;
            s.is_floating_button_visible
        })
    }

    /// Merge a partial settings update, persist it, and commit it to state.
    pub async fn update_audio_settings(&self, update: AudioSettingsUpdate) -> Result<AudioSettings> {
        let merged = self.store.save_audio_settings(update).await?;
        self.with_state(|s| s.audio_settings = merged);
        Ok(merged)
    }

    /// Hand a record's text to the platform share facility.
    pub fn share_transcription(&self, id: &str) -> Result<()> {
        let record = self.with_state(|s| s.history.iter().find(|r| r.id == id).cloned());
        let Some(record) = record else {
            return Err(VoxError::NotFound(id.to_string()));
        };
        self.sink.share(record.display_text())
    }

    /// Send arbitrary text to the active input target.
    ///
    /// Returns whether the text was inserted directly.
    pub fn send_to_app(&self, text: &str) -> Result<bool> {
        self.sink.insert(text)
    }

    /// Tear down any active capture session.
    pub async fn cleanup(&self) {
        self.capture.cleanup().await;
        self.machine.reset();
        self.with_state(|s| {
            s.is_recording = false;
            s.is_processing = false;
            s.preview_text.clear();
        });
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    use vox_audio::MockBackend;
    use vox_core::types::TranscriptionSegment;

    use super::*;
    use crate::sink::MockSink;

    /// Scripted speech-to-text client with no network.
    #[derive(Clone, Default)]
    struct StubClient {
        text: String,
        duration: Option<f64>,
        fail_transcribe: bool,
        corrected: Option<String>,
        fail_spell_check: bool,
        transcribe_calls: Arc<AtomicU32>,
    }

    impl StubClient {
        fn returning(text: &str) -> Self {
            Self {
                text: text.to_string(),
                ..Self::default()
            }
        }
    }

    impl SpeechToText for StubClient {
        async fn transcribe(&self, _path: &Path) -> Result<TranscriptionResponse> {
            self.transcribe_calls.fetch_add(1, Ordering::Relaxed);
            if self.fail_transcribe {
                return Err(VoxError::Transcription("upstream unavailable".to_string()));
            }
            Ok(TranscriptionResponse {
                text: self.text.clone(),
                language: Some("en".to_string()),
                duration: self.duration,
                segments: Some(vec![TranscriptionSegment {
                    text: self.text.clone(),
                    ..TranscriptionSegment::default()
                }]),
            })
        }

        async fn spell_check(&self, text: &str) -> Result<String> {
            if self.fail_spell_check {
                return Err(VoxError::SpellCheck("upstream unavailable".to_string()));
            }
            Ok(self
                .corrected
                .clone()
                .unwrap_or_else(|| format!("{} (corrected)", text)))
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        sink: Arc<MockSink>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                sink: Arc::new(MockSink::new()),
            }
        }

        fn data_dir(&self) -> PathBuf {
            self.dir.path().join("data")
        }

        /// A recorder-backed engine whose backend produces `name` with the
        /// given bytes.
        fn engine(
            &self,
            client: StubClient,
            name: &str,
        ) -> TranscriptionEngine<MockBackend, StubClient> {
            let asset = self.dir.path().join(name);
            std::fs::write(&asset, b"audio bytes").unwrap();
            self.engine_with_backend(client, MockBackend::new().with_output(asset))
        }

        fn engine_with_backend(
            &self,
            client: StubClient,
            backend: MockBackend,
        ) -> TranscriptionEngine<MockBackend, StubClient> {
            let settings = AudioSettings {
                confirm_before_delete: false,
                ..AudioSettings::default()
            };
            let store = TranscriptionStore::new(self.data_dir(), settings);
            let sink = Arc::clone(&self.sink);
            TranscriptionEngine::new(backend, client, store, &VoxConfig::default())
                .with_sink(Box::new(SharedSink(sink)))
        }
    }

    /// Forwards to an `Arc<MockSink>` so tests keep a handle for assertions.
    struct SharedSink(Arc<MockSink>);

    impl TextSink for SharedSink {
        fn insert(&self, text: &str) -> Result<bool> {
            self.0.insert(text)
        }

        fn share(&self, text: &str) -> Result<()> {
            self.0.share(text)
        }
    }

    #[tokio::test]
    async fn test_record_transcribe_commit_end_to_end() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("hello world"), "rec.m4a");

        engine.start_recording().await.unwrap();
        let state = engine.state();
        assert!(state.is_recording);
        assert!(!state.is_processing);
        assert_eq!(state.preview_text, "Tap again to stop recording");
        assert_eq!(engine.phase(), EnginePhase::Recording);

        let record = engine.stop_recording().await.unwrap();
        assert_eq!(record.text, "hello world");
        assert_eq!(record.metadata.language, "en");

        let state = engine.state();
        assert!(!state.is_recording);
        assert!(!state.is_processing);
        assert!(state.preview_text.is_empty());
        assert!(state.error.is_none());
        assert_eq!(state.current_text, "hello world");
        assert_eq!(state.history.len(), 1);
        assert_eq!(engine.phase(), EnginePhase::Idle);

        // The asset was moved into permanent storage.
        let uri = PathBuf::from(&state.history[0].audio_uri);
        assert!(uri.starts_with(fx.data_dir().join("audio")));
        assert!(uri.exists());

        // The history document was persisted and the text delivered.
        assert!(fx.data_dir().join("history.json").exists());
        assert_eq!(fx.sink.inserted(), vec!["hello world"]);
    }

    #[tokio::test]
    async fn test_start_while_recording_is_already_recording() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("x"), "rec.m4a");

        engine.start_recording().await.unwrap();
        let result = engine.start_recording().await;
        assert!(matches!(result, Err(VoxError::AlreadyRecording)));

        let state = engine.state();
        assert!(state.is_recording);
        assert_eq!(
            state.error.as_deref(),
            Some("A recording session is already active")
        );
        // The original session still stops cleanly.
        engine.stop_recording().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_session() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("x"), "rec.m4a");

        let result = engine.stop_recording().await;
        assert!(matches!(result, Err(VoxError::NoActiveSession)));
        assert_eq!(
            engine.state().error.as_deref(),
            Some("No active recording session")
        );
        assert_eq!(engine.phase(), EnginePhase::Idle);
    }

    #[tokio::test]
    async fn test_permission_denied_leaves_engine_idle() {
        let fx = Fixture::new();
        let engine = fx.engine_with_backend(
            StubClient::returning("x"),
            MockBackend::new().deny_permission(),
        );

        let result = engine.start_recording().await;
        assert!(matches!(result, Err(VoxError::PermissionDenied)));

        let state = engine.state();
        assert!(!state.is_recording);
        assert!(!state.is_processing);
        assert_eq!(state.error.as_deref(), Some("Microphone permission denied"));
        assert_eq!(engine.phase(), EnginePhase::Idle);
    }

    #[tokio::test]
    async fn test_transcription_failure_recovers_to_idle() {
        let fx = Fixture::new();
        let client = StubClient {
            fail_transcribe: true,
            ..StubClient::returning("x")
        };
        let calls = Arc::clone(&client.transcribe_calls);
        let engine = fx.engine(client, "rec.m4a");

        engine.start_recording().await.unwrap();
        let result = engine.stop_recording().await;
        assert!(matches!(result, Err(VoxError::Transcription(_))));
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        let state = engine.state();
        assert!(!state.is_recording);
        assert!(!state.is_processing);
        assert!(state.history.is_empty());
        assert!(state.error.as_deref().unwrap().contains("upstream"));
        assert_eq!(engine.phase(), EnginePhase::Idle);

        // The engine is usable again after the failure.
        engine.start_recording().await.unwrap();
        assert!(engine.state().is_recording);
    }

    #[tokio::test]
    async fn test_no_asset_from_backend_is_an_error() {
        let fx = Fixture::new();
        let engine = fx.engine_with_backend(StubClient::returning("x"), MockBackend::new());

        engine.start_recording().await.unwrap();
        let result = engine.stop_recording().await;
        assert!(matches!(result, Err(VoxError::Audio(_))));
        assert!(engine.state().history.is_empty());
        assert_eq!(engine.phase(), EnginePhase::Idle);
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_memory_and_disk_consistent() {
        let fx = Fixture::new();
        // A file where the data directory should be makes every history
        // write fail.
        std::fs::write(fx.data_dir(), b"blocker").unwrap();
        let engine = fx.engine(StubClient::returning("hello"), "rec.m4a");

        engine.start_recording().await.unwrap();
        let result = engine.stop_recording().await;
        assert!(result.is_err());

        let state = engine.state();
        assert!(state.history.is_empty());
        assert!(state.current_text.is_empty());
        assert!(state.error.is_some());
        // Nothing was delivered for an uncommitted record.
        assert!(fx.sink.inserted().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_suppressed_when_button_hidden() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("quiet"), "rec.m4a");
        assert!(!engine.toggle_floating_button());

        engine.start_recording().await.unwrap();
        engine.stop_recording().await.unwrap();

        assert_eq!(engine.state().history.len(), 1);
        assert!(fx.sink.inserted().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_fallback_still_commits() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("hello"), "rec.m4a");
        fx.sink.set_fallback();

        engine.start_recording().await.unwrap();
        engine.stop_recording().await.unwrap();

        assert_eq!(engine.state().history.len(), 1);
        assert_eq!(fx.sink.inserted(), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_transcribe_file_in_place() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("from a file"), "rec.m4a");
        let audio = fx.dir.path().join("imported.wav");
        std::fs::write(&audio, b"bytes").unwrap();

        let record = engine.transcribe_file(&audio).await.unwrap();
        assert_eq!(record.text, "from a file");
        // Imported files are referenced where they are, not moved.
        assert_eq!(record.audio_uri, audio.display().to_string());
        assert!(audio.exists());
        assert_eq!(engine.state().history.len(), 1);
        assert_eq!(engine.phase(), EnginePhase::Idle);
    }

    #[tokio::test]
    async fn test_transcribe_file_rejected_while_recording() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("x"), "rec.m4a");
        engine.start_recording().await.unwrap();

        let audio = fx.dir.path().join("imported.wav");
        std::fs::write(&audio, b"bytes").unwrap();

        // A file import cannot preempt an open recording session.
        let result = engine.transcribe_file(&audio).await;
        assert!(matches!(result, Err(VoxError::InvalidTransition { .. })));
        assert_eq!(engine.phase(), EnginePhase::Recording);
        assert!(engine.state().is_recording);

        // After the session ends the import goes through.
        engine.stop_recording().await.unwrap();
        engine.transcribe_file(&audio).await.unwrap();
        assert_eq!(engine.state().history.len(), 2);
    }

    #[tokio::test]
    async fn test_spell_check_sets_correction() {
        let fx = Fixture::new();
        let client = StubClient {
            corrected: Some("Hello, world.".to_string()),
            ..StubClient::returning("helo wrld")
        };
        let engine = fx.engine(client, "rec.m4a");

        engine.start_recording().await.unwrap();
        let record = engine.stop_recording().await.unwrap();

        let updated = engine.spell_check_transcription(&record.id).await.unwrap();
        assert_eq!(updated.corrected_text.as_deref(), Some("Hello, world."));
        assert!(updated.is_spell_checked);

        let state = engine.state();
        assert_eq!(
            state.history[0].corrected_text.as_deref(),
            Some("Hello, world.")
        );
        assert_eq!(engine.phase(), EnginePhase::Idle);
    }

    #[tokio::test]
    async fn test_spell_check_overwrites_previous_correction() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("helo"), "rec.m4a");
        engine.start_recording().await.unwrap();
        let record = engine.stop_recording().await.unwrap();

        engine.spell_check_transcription(&record.id).await.unwrap();
        let again = engine.spell_check_transcription(&record.id).await.unwrap();
        assert_eq!(again.corrected_text.as_deref(), Some("helo (corrected)"));
        assert!(again.is_spell_checked);
    }

    #[tokio::test]
    async fn test_spell_check_unknown_id() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("x"), "rec.m4a");

        let result = engine.spell_check_transcription("999").await;
        assert!(matches!(result, Err(VoxError::NotFound(_))));
        assert_eq!(
            engine.state().error.as_deref(),
            Some("Transcription not found")
        );
        assert_eq!(engine.phase(), EnginePhase::Idle);
    }

    #[tokio::test]
    async fn test_spell_check_failure_sets_error() {
        let fx = Fixture::new();
        let client = StubClient {
            fail_spell_check: true,
            ..StubClient::returning("helo")
        };
        let engine = fx.engine(client, "rec.m4a");
        engine.start_recording().await.unwrap();
        let record = engine.stop_recording().await.unwrap();

        let result = engine.spell_check_transcription(&record.id).await;
        assert!(matches!(result, Err(VoxError::SpellCheck(_))));
        assert_eq!(
            engine.state().error.as_deref(),
            Some("Failed to spell check transcription")
        );
        assert!(!engine.state().history[0].is_spell_checked);
        assert_eq!(engine.phase(), EnginePhase::Idle);
    }

    #[tokio::test]
    async fn test_spell_check_uses_edited_text() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("raw words"), "rec.m4a");
        engine.start_recording().await.unwrap();
        let record = engine.stop_recording().await.unwrap();

        engine
            .edit_transcription(&record.id, "edited words")
            .await
            .unwrap();
        let updated = engine.spell_check_transcription(&record.id).await.unwrap();
        assert_eq!(
            updated.corrected_text.as_deref(),
            Some("edited words (corrected)")
        );
    }

    #[tokio::test]
    async fn test_edit_transcription_persists() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("helo wrld"), "rec.m4a");
        engine.start_recording().await.unwrap();
        let record = engine.stop_recording().await.unwrap();

        engine
            .edit_transcription(&record.id, "hello world")
            .await
            .unwrap();

        let state = engine.state();
        assert_eq!(state.history[0].edited_text.as_deref(), Some("hello world"));
        assert!(state.history[0].is_edited);
        assert_eq!(state.history[0].display_text(), "hello world");
        // The raw transcription is untouched.
        assert_eq!(state.history[0].text, "helo wrld");

        let json = std::fs::read_to_string(fx.data_dir().join("history.json")).unwrap();
        assert!(json.contains("\"editedText\": \"hello world\""));
    }

    #[tokio::test]
    async fn test_edit_unknown_id_is_noop() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("x"), "rec.m4a");
        engine.edit_transcription("999", "whatever").await.unwrap();
        assert!(engine.state().history.is_empty());
    }

    #[tokio::test]
    async fn test_delete_transcription_removes_record_and_asset() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("x"), "rec.m4a");
        engine.start_recording().await.unwrap();
        let record = engine.stop_recording().await.unwrap();
        let asset = PathBuf::from(&record.audio_uri);
        assert!(asset.exists());

        engine.delete_transcription(&record.id).await.unwrap();
        assert!(engine.state().history.is_empty());
        assert!(!asset.exists());

        let json = std::fs::read_to_string(fx.data_dir().join("history.json")).unwrap();
        assert_eq!(json.trim(), "[]");
    }

    #[tokio::test]
    async fn test_delete_declined_keeps_record() {
        let fx = Fixture::new();
        let asset = fx.dir.path().join("rec.m4a");
        std::fs::write(&asset, b"audio").unwrap();
        let store = TranscriptionStore::new(fx.data_dir(), AudioSettings::default())
            .with_confirm(Box::new(|_, _| false));
        let engine = TranscriptionEngine::new(
            MockBackend::new().with_output(asset),
            StubClient::returning("x"),
            store,
            &VoxConfig::default(),
        );

        engine.start_recording().await.unwrap();
        let record = engine.stop_recording().await.unwrap();

        engine.delete_transcription(&record.id).await.unwrap();
        assert_eq!(engine.state().history.len(), 1);
        assert!(PathBuf::from(&record.audio_uri).exists());
    }

    #[tokio::test]
    async fn test_delete_unknown_id_is_noop() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("x"), "rec.m4a");
        engine.delete_transcription("999").await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_all_transcriptions() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("one"), "rec1.m4a");
        engine.start_recording().await.unwrap();
        engine.stop_recording().await.unwrap();
        let audio_dir = fx.data_dir().join("audio");
        assert_eq!(std::fs::read_dir(&audio_dir).unwrap().count(), 1);

        engine.clear_all_transcriptions().await.unwrap();

        let state = engine.state();
        assert!(state.history.is_empty());
        assert!(state.current_text.is_empty());
        assert_eq!(std::fs::read_dir(&audio_dir).unwrap().count(), 0);
        let json = std::fs::read_to_string(fx.data_dir().join("history.json")).unwrap();
        assert_eq!(json.trim(), "[]");
    }

    #[tokio::test]
    async fn test_clear_all_audio_cleanup_failure_sets_error() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("x"), "rec.m4a");
        std::fs::create_dir_all(fx.data_dir()).unwrap();
        // A plain file where the audio directory belongs makes cleanup fail.
        std::fs::write(fx.data_dir().join("audio"), b"blocker").unwrap();

        let result = engine.clear_all_transcriptions().await;
        assert!(matches!(result, Err(VoxError::Storage(_))));
        assert_eq!(
            engine.state().error.as_deref(),
            Some("Failed to clean up audio files")
        );
    }

    #[tokio::test]
    async fn test_concurrent_stops_single_winner() {
        let fx = Fixture::new();
        let engine = Arc::new(fx.engine(StubClient::returning("hello"), "rec.m4a"));
        engine.start_recording().await.unwrap();

        let first = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.stop_recording().await }
        });
        let second = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.stop_recording().await }
        });
        let results = [first.await.unwrap(), second.await.unwrap()];

        // Exactly one stop claims the session; the other fails cleanly.
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

        let state = engine.state();
        assert_eq!(state.history.len(), 1);
        assert!(!state.is_recording);
        assert!(!state.is_processing);
        assert_eq!(engine.phase(), EnginePhase::Idle);
    }

    #[tokio::test]
    async fn test_init_hydrates_history_and_settings() {
        let fx = Fixture::new();
        {
            let seed = fx.engine(StubClient::returning("persisted"), "rec.m4a");
            seed.start_recording().await.unwrap();
            seed.stop_recording().await.unwrap();
            seed.update_audio_settings(AudioSettingsUpdate {
                auto_delete_after_playback: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        }

        let engine = fx.engine(StubClient::returning("x"), "rec2.m4a");
        engine.init().await.unwrap();

        let state = engine.state();
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history[0].text, "persisted");
        assert!(state.audio_settings.auto_delete_after_playback);
    }

    #[tokio::test]
    async fn test_init_with_corrupt_history_sets_error() {
        let fx = Fixture::new();
        std::fs::create_dir_all(fx.data_dir()).unwrap();
        std::fs::write(fx.data_dir().join("history.json"), b"not json").unwrap();
        let engine = fx.engine(StubClient::returning("x"), "rec.m4a");

        let result = engine.init().await;
        assert!(matches!(result, Err(VoxError::Storage(_))));
        assert_eq!(
            engine.state().error.as_deref(),
            Some("Failed to load transcription history")
        );
    }

    #[tokio::test]
    async fn test_play_record_missing_asset_is_tolerated() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("x"), "rec.m4a");
        engine
            .play_record("/nonexistent/audio.m4a")
            .await
            .unwrap();
        assert!(engine.state().error.is_none());
    }

    #[tokio::test]
    async fn test_search_history() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("the quick brown fox"), "rec.m4a");
        engine.start_recording().await.unwrap();
        engine.stop_recording().await.unwrap();

        assert_eq!(engine.search_history("QUICK").len(), 1);
        assert!(engine.search_history("zebra").is_empty());
    }

    #[tokio::test]
    async fn test_update_audio_settings_commits_to_state() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("x"), "rec.m4a");

        let merged = engine
            .update_audio_settings(AudioSettingsUpdate {
                use_permanent_storage: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!merged.use_permanent_storage);
        assert!(!engine.state().audio_settings.use_permanent_storage);
    }

    #[tokio::test]
    async fn test_share_transcription() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("share me"), "rec.m4a");
        engine.start_recording().await.unwrap();
        let record = engine.stop_recording().await.unwrap();

        engine.share_transcription(&record.id).unwrap();
        assert_eq!(fx.sink.shared(), vec!["share me"]);

        let result = engine.share_transcription("999");
        assert!(matches!(result, Err(VoxError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_send_to_app() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("x"), "rec.m4a");
        assert!(engine.send_to_app("typed text").unwrap());
        assert_eq!(fx.sink.inserted(), vec!["typed text"]);
    }

    #[tokio::test]
    async fn test_cleanup_resets_engine() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("x"), "rec.m4a");
        engine.start_recording().await.unwrap();

        engine.cleanup().await;
        let state = engine.state();
        assert!(!state.is_recording);
        assert!(!state.is_processing);
        assert_eq!(engine.phase(), EnginePhase::Idle);

        // A fresh session can start after cleanup.
        engine.start_recording().await.unwrap();
        assert!(engine.state().is_recording);
    }

    #[tokio::test]
    async fn test_history_is_newest_first() {
        let fx = Fixture::new();
        let engine = fx.engine(StubClient::returning("first"), "rec.m4a");
        engine.start_recording().await.unwrap();
        engine.stop_recording().await.unwrap();

        let audio = fx.dir.path().join("second.wav");
        std::fs::write(&audio, b"bytes").unwrap();
        engine.transcribe_file(&audio).await.unwrap();

        let history = engine.state().history;
        assert_eq!(history.len(), 2);
        // Both came from the same stub text; order is by insertion, newest
        // record at the front.
        assert!(history[0].timestamp >= history[1].timestamp);
        assert!(history[0].id > history[1].id);
    }
}
