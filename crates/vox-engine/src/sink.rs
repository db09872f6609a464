//! Destinations for finished transcription text.
//!
//! The engine hands completed text to a `TextSink`; what "insert" means is
//! platform-specific (an accessibility text field, a focused window, a
//! clipboard). The trait is object-safe so the engine can hold a boxed sink
//! chosen at composition time.

use std::sync::Mutex;

use vox_core::error::Result;

/// Receives transcription text on behalf of the surrounding platform.
pub trait TextSink: Send + Sync {
    /// Deliver text to the active input target.
    ///
    /// Returns `Ok(true)` if the text was inserted directly, `Ok(false)` if
    /// the sink fell back to a secondary channel such as the clipboard.
    fn insert(&self, text: &str) -> Result<bool>;

    /// Hand text to the platform share facility.
    fn share(&self, text: &str) -> Result<()>;
}

/// Sink that discards everything; used when no delivery target exists.
#[derive(Debug, Default)]
pub struct NullSink;

impl TextSink for NullSink {
    fn insert(&self, _text: &str) -> Result<bool> {
        Ok(false)
    }

    fn share(&self, _text: &str) -> Result<()> {
        Ok(())
    }
}

/// Recording sink for tests.
#[derive(Debug, Default)]
pub struct MockSink {
    inserted: Mutex<Vec<String>>,
    shared: Mutex<Vec<String>>,
    /// When false, `insert` reports the clipboard fallback.
    direct: Mutex<bool>,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            inserted: Mutex::new(Vec::new()),
            shared: Mutex::new(Vec::new()),
            direct: Mutex::new(true),
        }
    }

    /// Make subsequent inserts report the fallback path.
    pub fn set_fallback(&self) {
        *self.direct.lock().expect("sink mutex poisoned") = false;
    }

    pub fn inserted(&self) -> Vec<String> {
        self.inserted.lock().expect("sink mutex poisoned").clone()
    }

    pub fn shared(&self) -> Vec<String> {
        self.shared.lock().expect("sink mutex poisoned").clone()
    }
}

impl TextSink for MockSink {
    fn insert(&self, text: &str) -> Result<bool> {
        self.inserted
            .lock()
            .expect("sink mutex poisoned")
            .push(text.to_string());
        Ok(*self.direct.lock().expect("sink mutex poisoned"))
    }

    fn share(&self, text: &str) -> Result<()> {
        self.shared
            .lock()
            .expect("sink mutex poisoned")
            .push(text.to_string());
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
