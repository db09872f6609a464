//! Recording device abstraction.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use vox_core::error::{Result, VoxError};

/// Driver for the underlying recording device.
///
/// Implementations own the platform recording session: permission prompts,
/// opening the device at the configured quality, finalizing the captured
/// asset, and playing assets back. `play` resolves when playback completes
/// naturally.
pub trait RecordingBackend: Send + Sync {
    /// Ask the platform for microphone permission.
    fn request_permission(&self) -> impl Future<Output = bool> + Send;

    /// Open a recording session on the device.
    fn begin(&self) -> impl Future<Output = Result<()>> + Send;

    /// Finalize the session and release the device.
    ///
    /// Returns the path of the recorded asset, or `None` if the session
    /// produced no usable asset.
    fn end(&self) -> impl Future<Output = Result<Option<PathBuf>>> + Send;

    /// Play the asset at `path`, resolving at natural completion.
    fn play(&self, path: &Path) -> impl Future<Output = Result<()>> + Send;
}

/// Mock recording backend for testing.
///
/// Simulates a recording device without real hardware. The asset returned by
/// `end` is configured up front; played paths are retained for assertions.
#[derive(Debug, Clone)]
pub struct MockBackend {
    permission_granted: Arc<AtomicBool>,
    active: Arc<AtomicBool>,
    fail_begin: Arc<AtomicBool>,
    output: Arc<Mutex<Option<PathBuf>>>,
    played: Arc<Mutex<Vec<PathBuf>>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            permission_granted: Arc::new(AtomicBool::new(true)),
            active: Arc::new(AtomicBool::new(false)),
            fail_begin: Arc::new(AtomicBool::new(false)),
            output: Arc::new(Mutex::new(None)),
            played: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure the asset path that `end` will report.
    pub fn with_output(self, path: PathBuf) -> Self {
        *self.output.lock().expect("output mutex poisoned") = Some(path);
        self
    }

    /// Make `request_permission` report a refusal.
    pub fn deny_permission(self) -> Self {
        self.permission_granted.store(false, Ordering::Relaxed);
        self
    }

    /// Make `begin` fail with a device error.
    pub fn fail_on_begin(self) -> Self {
        self.fail_begin.store(true, Ordering::Relaxed);
        self
    }

    /// Whether a session is currently open.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Paths handed to `play` so far.
    pub fn played(&self) -> Vec<PathBuf> {
        self.played.lock().expect("played mutex poisoned").clone()
    }
}

impl RecordingBackend for MockBackend {
    async fn request_permission(&self) -> bool {
        self.permission_granted.load(Ordering::Relaxed)
    }

    async fn begin(&self) -> Result<()> {
        if self.fail_begin.load(Ordering::Relaxed) {
            return Err(VoxError::Audio("recording device unavailable".to_string()));
        }
        self.active.store(true, Ordering::Relaxed);
        tracing::info!("Mock recording session opened");
        Ok(())
    }

    async fn end(&self) -> Result<Option<PathBuf>> {
        self.active.store(false, Ordering::Relaxed);
        Ok(self.output.lock().expect("output mutex poisoned").clone())
    }

    async fn play(&self, path: &Path) -> Result<()> {
        self.played
            .lock()
            .expect("played mutex poisoned")
            .push(path.to_path_buf());
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
