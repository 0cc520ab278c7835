//! Speech capture shim. Recognition itself runs in the webview against
//! the platform speech API; the backend owns the one piece of real state
//! the adapter needs: whether a provider "ended" event should trigger a
//! restart or was the tail of a deliberate stop.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use tauri::{AppHandle, Emitter};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    db::{Database, Session, SessionStatus, StoredSegment},
    transcript::{TranscriptSegment, TranscriptStore},
};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ListeningState {
    #[default]
    Stopped,
    Listening,
    /// The provider ended on its own and a restart has been requested
    /// but not yet confirmed.
    Restarting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Restart,
    Ignore,
}

/// Transitions are driven only by the explicit start/stop requests and
/// the provider's ended/error events. A provider end while listening
/// restarts; an end after an explicit stop never does.
#[derive(Debug, Default)]
pub struct ListeningMachine {
    state: ListeningState,
}

impl ListeningMachine {
    pub fn state(&self) -> ListeningState {
        self.state
    }

    /// Returns whether the request actually started a new run; starting
    /// while already listening or restarting is a no-op.
    pub fn start(&mut self) -> bool {
        match self.state {
            ListeningState::Stopped => {
                self.state = ListeningState::Listening;
                true
            }
            ListeningState::Listening | ListeningState::Restarting => false,
        }
    }

    pub fn stop(&mut self) {
        self.state = ListeningState::Stopped;
    }

    /// Confirmation that the provider came back up after a restart.
    pub fn provider_started(&mut self) {
        if self.state == ListeningState::Restarting {
            self.state = ListeningState::Listening;
        }
    }

    pub fn provider_ended(&mut self) -> RestartDecision {
        match self.state {
            ListeningState::Listening | ListeningState::Restarting => {
                self.state = ListeningState::Restarting;
                RestartDecision::Restart
            }
            ListeningState::Stopped => RestartDecision::Ignore,
        }
    }

    pub fn provider_error(&mut self, recoverable: bool) -> RestartDecision {
        if self.state == ListeningState::Stopped {
            return RestartDecision::Ignore;
        }
        if recoverable {
            self.state = ListeningState::Restarting;
            RestartDecision::Restart
        } else {
            self.state = ListeningState::Stopped;
            RestartDecision::Ignore
        }
    }
}

/// Web Speech error codes that mean the microphone is usable and the
/// provider just gave up on this utterance.
fn is_recoverable_error(code: &str) -> bool {
    !matches!(code, "not-allowed" | "service-not-allowed" | "audio-capture")
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct ListeningStateChangedEvent {
    state: ListeningState,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct SegmentAddedEvent {
    segment: TranscriptSegment,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct InterimResultEvent {
    text: String,
}

#[derive(Clone)]
pub struct SpeechController {
    machine: Arc<Mutex<ListeningMachine>>,
    /// Session the current transcript belongs to; set on the first start
    /// (or adopted from recovery) and cleared on stop.
    session_id: Arc<Mutex<Option<String>>>,
    store: Arc<TranscriptStore>,
    db: Database,
    app_handle: AppHandle,
}

impl SpeechController {
    pub fn new(app_handle: AppHandle, db: Database, store: Arc<TranscriptStore>) -> Self {
        Self {
            machine: Arc::new(Mutex::new(ListeningMachine::default())),
            session_id: Arc::new(Mutex::new(None)),
            store,
            db,
            app_handle,
        }
    }

    /// Resume a session left open by a crash; called once at startup
    /// before any listening begins.
    pub async fn adopt_session(&self, session_id: String) {
        *self.session_id.lock().await = Some(session_id);
    }

    pub async fn current_session(&self) -> Option<String> {
        self.session_id.lock().await.clone()
    }

    pub async fn state(&self) -> ListeningState {
        self.machine.lock().await.state()
    }

    pub async fn start_listening(&self) -> Result<ListeningState> {
        let state = {
            let mut machine = self.machine.lock().await;
            if !machine.start() {
                // Already running; idempotent.
                return Ok(machine.state());
            }
            machine.state()
        };

        self.ensure_session().await?;
        info!("Listening started");
        self.emit_state(state);
        Ok(state)
    }

    pub async fn stop_listening(&self) -> Result<ListeningState> {
        self.machine.lock().await.stop();

        if let Some(session_id) = self.session_id.lock().await.take() {
            self.db.close_session(&session_id, Utc::now()).await?;
        }

        info!("Listening stopped");
        self.emit_state(ListeningState::Stopped);
        Ok(ListeningState::Stopped)
    }

    pub async fn provider_started(&self) {
        let state = {
            let mut machine = self.machine.lock().await;
            machine.provider_started();
            machine.state()
        };
        self.emit_state(state);
    }

    pub async fn provider_ended(&self) {
        let (decision, state) = {
            let mut machine = self.machine.lock().await;
            let decision = machine.provider_ended();
            (decision, machine.state())
        };

        if decision == RestartDecision::Restart {
            info!("Speech provider ended mid-run; requesting restart");
            self.request_restart();
        }
        self.emit_state(state);
    }

    pub async fn provider_error(&self, code: String) {
        let recoverable = is_recoverable_error(&code);
        let (decision, state) = {
            let mut machine = self.machine.lock().await;
            let decision = machine.provider_error(recoverable);
            (decision, machine.state())
        };

        match decision {
            RestartDecision::Restart => {
                info!("Recoverable speech provider error '{code}'; restarting");
                self.request_restart();
            }
            RestartDecision::Ignore => {
                if state == ListeningState::Stopped && !recoverable {
                    warn!("Fatal speech provider error '{code}'; listening stopped");
                }
            }
        }
        self.emit_state(state);
    }

    /// One recognition event from the provider. Interim results are
    /// forwarded to the UI and never stored; only final results enter
    /// the transcript log.
    pub async fn speech_result(&self, text: String, is_final: bool) -> Result<()> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        if !is_final {
            let _ = self.app_handle.emit(
                "transcript-interim",
                InterimResultEvent {
                    text: trimmed.to_string(),
                },
            );
            return Ok(());
        }

        let captured_at = Utc::now();
        let index = self.store.append(trimmed.to_string(), captured_at);

        let segment = TranscriptSegment {
            index,
            captured_at,
            text: trimmed.to_string(),
        };
        let _ = self
            .app_handle
            .emit("transcript-segment-added", SegmentAddedEvent { segment });

        // Persistence is best-effort recovery data; a write failure must
        // not drop the in-memory segment or stop listening.
        if let Some(session_id) = self.current_session().await {
            let stored = StoredSegment {
                session_id,
                seq: index as i64,
                captured_at,
                text: trimmed.to_string(),
            };
            if let Err(err) = self.db.insert_segment(&stored).await {
                warn!("Failed to persist transcript segment {index}: {err:#}");
            }
        }

        Ok(())
    }

    async fn ensure_session(&self) -> Result<()> {
        let mut guard = self.session_id.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            title: None,
            status: SessionStatus::Open,
            started_at: now,
            ended_at: None,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_session(&session).await?;
        info!("Opened session {}", session.id);
        *guard = Some(session.id);
        Ok(())
    }

    fn emit_state(&self, state: ListeningState) {
        let _ = self
            .app_handle
            .emit("listening-state-changed", ListeningStateChangedEvent { state });
    }

    fn request_restart(&self) {
        let _ = self.app_handle.emit("speech-restart-requested", ());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_only_fires_from_stopped() {
        let mut machine = ListeningMachine::default();
        assert!(machine.start());
        assert_eq!(machine.state(), ListeningState::Listening);

        // Starting again while running changes nothing.
        assert!(!machine.start());
        assert_eq!(machine.state(), ListeningState::Listening);
    }

    #[test]
    fn provider_end_while_listening_restarts() {
        let mut machine = ListeningMachine::default();
        machine.start();

        assert_eq!(machine.provider_ended(), RestartDecision::Restart);
        assert_eq!(machine.state(), ListeningState::Restarting);

        machine.provider_started();
        assert_eq!(machine.state(), ListeningState::Listening);
    }

    #[test]
    fn provider_end_after_explicit_stop_is_ignored() {
        let mut machine = ListeningMachine::default();
        machine.start();
        machine.stop();

        // The provider's trailing "ended" event arrives after the stop.
        assert_eq!(machine.provider_ended(), RestartDecision::Ignore);
        assert_eq!(machine.state(), ListeningState::Stopped);
    }

    #[test]
    fn recoverable_error_restarts_fatal_error_stops() {
        let mut machine = ListeningMachine::default();
        machine.start();
        assert_eq!(machine.provider_error(true), RestartDecision::Restart);
        assert_eq!(machine.state(), ListeningState::Restarting);

        assert_eq!(machine.provider_error(false), RestartDecision::Ignore);
        assert_eq!(machine.state(), ListeningState::Stopped);
    }

    #[test]
    fn error_while_stopped_is_ignored() {
        let mut machine = ListeningMachine::default();
        assert_eq!(machine.provider_error(true), RestartDecision::Ignore);
        assert_eq!(machine.state(), ListeningState::Stopped);
    }

    #[test]
    fn permission_errors_are_not_recoverable() {
        assert!(!is_recoverable_error("not-allowed"));
        assert!(!is_recoverable_error("audio-capture"));
        assert!(is_recoverable_error("no-speech"));
        assert!(is_recoverable_error("network"));
    }
}
