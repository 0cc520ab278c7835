//! One-shot screen capture broker. The frame grab and OCR run in the
//! webview; the backend hands out request ids, parks each caller on a
//! oneshot reply, and enforces the deadline so no caller waits forever.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

const PREVIEW_MAX_CHARS: usize = 100;
const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenCapture {
    pub text: String,
    pub captured_at: DateTime<Utc>,
    pub preview: String,
}

impl ScreenCapture {
    fn from_text(text: String) -> Self {
        let preview = if text.chars().count() > PREVIEW_MAX_CHARS {
            text.chars().take(PREVIEW_MAX_CHARS).collect()
        } else {
            text.clone()
        };
        Self {
            text,
            captured_at: Utc::now(),
            preview,
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no text detected on screen")]
    NoTextDetected,
    #[error("screen capture failed: {0}")]
    CaptureFailed(String),
}

/// Reply from the capture provider: recognized text, or a provider-side
/// failure message.
pub type CaptureReply = Result<String, String>;

pub struct ScreenCaptureBroker {
    pending: Mutex<HashMap<u64, oneshot::Sender<CaptureReply>>>,
    next_id: AtomicU64,
    deadline: Duration,
    /// Exactly one current capture exists at a time; each success
    /// overwrites it wholesale.
    current: Mutex<Option<ScreenCapture>>,
}

impl ScreenCaptureBroker {
    pub fn new() -> Self {
        Self::with_deadline(DEFAULT_DEADLINE)
    }

    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            deadline,
            current: Mutex::new(None),
        }
    }

    /// Register a new capture request. The caller emits the request id
    /// to the provider, then awaits `wait` with the returned receiver.
    pub fn begin(&self) -> (u64, oneshot::Receiver<CaptureReply>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);
        (id, rx)
    }

    /// Provider reply for a previously issued request id. Returns false
    /// for unknown ids, e.g. a reply arriving after the deadline.
    pub fn deliver(&self, id: u64, reply: CaptureReply) -> bool {
        match self.pending.lock().unwrap().remove(&id) {
            Some(tx) => tx.send(reply).is_ok(),
            None => {
                warn!("Capture reply for unknown request {id}; dropped");
                false
            }
        }
    }

    pub async fn wait(
        &self,
        id: u64,
        rx: oneshot::Receiver<CaptureReply>,
    ) -> Result<ScreenCapture, CaptureError> {
        let reply = match tokio::time::timeout(self.deadline, rx).await {
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                return Err(CaptureError::CaptureFailed(
                    "timed out waiting for the capture provider".into(),
                ));
            }
            Ok(Err(_)) => {
                return Err(CaptureError::CaptureFailed(
                    "capture provider disconnected".into(),
                ))
            }
            Ok(Ok(reply)) => reply,
        };

        match reply {
            Err(message) => Err(CaptureError::CaptureFailed(message)),
            Ok(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Err(CaptureError::NoTextDetected);
                }
                let capture = ScreenCapture::from_text(trimmed.to_string());
                *self.current.lock().unwrap() = Some(capture.clone());
                Ok(capture)
            }
        }
    }

    pub fn current(&self) -> Option<ScreenCapture> {
        self.current.lock().unwrap().clone()
    }

    pub fn clear_current(&self) {
        self.current.lock().unwrap().take();
    }
}

impl Default for ScreenCaptureBroker {
    fn default() -> Self {
        Self::new()
    }
}
