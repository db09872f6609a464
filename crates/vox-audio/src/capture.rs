//! Recording session management and playback.
//!
//! `AudioCapture` enforces the single-session invariant, drives the periodic
//! elapsed-time preview, and runs the playback auto-delete flow. The preview
//! ticker is a background task that must be cancelled on stop or cleanup; a
//! leaked ticker is a resource leak.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use vox_core::error::{Result, VoxError};
use vox_core::types::{AudioSettings, ConfirmFn};

use crate::backend::RecordingBackend;

/// Callback receiving preview text updates while recording.
pub type PreviewFn = Box<dyn Fn(String) + Send + Sync>;

/// Render elapsed recording time as preview text.
pub fn format_elapsed(seconds: u64) -> String {
    format!("Recording: {}:{:02}", seconds / 60, seconds % 60)
}

struct CaptureSession {
    id: Uuid,
    started: DateTime<Utc>,
    ticker: Option<JoinHandle<()>>,
}

/// Owns the microphone recording lifecycle.
///
/// At most one session is active at a time: `start_recording` while a session
/// is open fails with `AlreadyRecording` rather than silently stacking
/// sessions. Callers must run `cleanup` on teardown so the preview ticker is
/// cancelled.
pub struct AudioCapture<B: RecordingBackend> {
    backend: B,
    preview_interval: Duration,
    on_preview: Option<Arc<PreviewFn>>,
    session: tokio::sync::Mutex<Option<CaptureSession>>,
}

impl<B: RecordingBackend> AudioCapture<B> {
    pub fn new(backend: B, preview_interval: Duration) -> Self {
        Self {
            backend,
            preview_interval,
            on_preview: None,
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// Register a callback for preview text updates.
    pub fn with_preview(mut self, on_preview: PreviewFn) -> Self {
        self.on_preview = Some(Arc::new(on_preview));
        self
    }

    /// Whether a recording session is currently active.
    pub async fn is_active(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Acquire the microphone and open a recording session.
    ///
    /// Fails with `PermissionDenied` if the platform refuses microphone
    /// access, or `AlreadyRecording` if a session is already open. On success
    /// a background ticker emits elapsed-time preview text at the configured
    /// interval until the session ends.
    pub async fn start_recording(&self) -> Result<()> {
        let mut guard = self.session.lock().await;
        if guard.is_some() {
            return Err(VoxError::AlreadyRecording);
        }

        if !self.backend.request_permission().await {
            return Err(VoxError::PermissionDenied);
        }

        self.backend.begin().await?;

        if let Some(ref cb) = self.on_preview {
            cb("Tap again to stop recording".to_string());
        }

        let session = CaptureSession {
            id: Uuid::new_v4(),
            started: Utc::now(),
            ticker: self.on_preview.as_ref().map(|cb| {
                spawn_preview_ticker(Arc::clone(cb), self.preview_interval)
            }),
        };
        tracing::info!(session_id = %session.id, "Recording session started");
        *guard = Some(session);
        Ok(())
    }

    /// Finalize the session and release the device.
    ///
    /// Returns the recorded asset's path, or `None` if no session was active
    /// or the session produced no usable asset. Backend failures during
    /// finalization are reported as `None` as well; the caller decides how to
    /// surface that.
    pub async fn stop_recording(&self) -> Result<Option<PathBuf>> {
        let mut guard = self.session.lock().await;
        let Some(session) = guard.take() else {
            tracing::debug!("stop_recording called with no active session");
            return Ok(None);
        };

        if let Some(ticker) = session.ticker {
            ticker.abort();
        }

        let elapsed = (Utc::now() - session.started).num_milliseconds() as f64 / 1000.0;
        match self.backend.end().await {
            Ok(Some(path)) => {
                tracing::info!(
                    session_id = %session.id,
                    elapsed_secs = elapsed,
                    path = %path.display(),
                    "Recording session finalized"
                );
                Ok(Some(path))
            }
            Ok(None) => {
                tracing::warn!(session_id = %session.id, "Recording session produced no asset");
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "Failed to finalize recording session");
                Ok(None)
            }
        }
    }

    /// Play a recorded asset, then run the auto-delete flow if configured.
    ///
    /// Fails with `NotFound` if the asset does not exist. When
    /// `auto_delete_after_playback` is set, deletion is gated behind the
    /// confirmation hook if `confirm_before_delete` is set; deletion failures
    /// are logged and swallowed since they do not affect the correctness of
    /// the transcription record.
    pub async fn play_record(
        &self,
        path: &Path,
        settings: &AudioSettings,
        confirm: Option<&ConfirmFn>,
    ) -> Result<()> {
        if !path.exists() {
            return Err(VoxError::NotFound(path.display().to_string()));
        }

        self.backend.play(path).await?;

        if settings.auto_delete_after_playback {
            let approved = if settings.confirm_before_delete {
                confirm
                    .map(|f| f("Delete Audio", "Do you want to delete this audio recording?"))
                    .unwrap_or(true)
            } else {
                true
            };
            if approved {
                if let Err(e) = tokio::fs::remove_file(path).await {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to delete audio file after playback"
                    );
                }
            }
        }

        Ok(())
    }

    /// Tear down any active session and cancel its preview ticker.
    pub async fn cleanup(&self) {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.take() {
            if let Some(ticker) = session.ticker {
                ticker.abort();
            }
            tracing::debug!(session_id = %session.id, "Capture session cleaned up");
        }
    }
}

/// Emit elapsed-time preview text at a fixed interval.
///
/// Elapsed time is derived from the tick count so the preview stays
/// consistent with the interval clock.
fn spawn_preview_ticker(cb: Arc<PreviewFn>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick fires immediately; skip it so updates start one
        // period after recording began.
        interval.tick().await;
        let mut ticks: u64 = 0;
        loop {
            interval.tick().await;
            ticks += 1;
            let seconds = ticks * period.as_millis() as u64 / 1000;
            cb(format_elapsed(seconds));
        }
    })
}

// =============================================================================
// Tests
// =============================================================================
