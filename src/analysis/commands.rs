use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use tauri::{AppHandle, Emitter, State};

use crate::{
    capture::{CaptureError, ScreenCaptureBroker},
    context::ContextPayload,
    transcript::TranscriptAnalyses,
    AppState,
};

use super::{AnalysisError, AnalysisFailure, AnalysisResult, Mode};

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct AnalysisCompletedEvent {
    result: AnalysisResult,
}

fn assemble(
    state: &AppState,
    screen_text: Option<String>,
    instruction: Option<String>,
) -> Result<ContextPayload, AnalysisFailure> {
    let transcript = if state.store.is_empty() {
        None
    } else {
        Some(state.store.joined_text())
    };

    ContextPayload::assemble(screen_text, transcript, instruction)
        .map_err(|_| AnalysisFailure::from(AnalysisError::NoContext))
}

async fn run_assembled(
    state: &AppState,
    app_handle: &AppHandle,
    mode: Mode,
    payload: ContextPayload,
) -> Result<AnalysisResult, AnalysisFailure> {
    let result = state
        .engine
        .run(mode, &payload)
        .await
        .map_err(AnalysisFailure::from)?;

    // First successful analysis names the session, using the assembler's
    // precedence label. Naming is cosmetic; failures only warn.
    if let Some(session_id) = state.speech.current_session().await {
        if let Some(label) = payload.session_label() {
            match state
                .db
                .set_session_title_if_empty(&session_id, &label, Utc::now())
                .await
            {
                Ok(true) => info!("Titled session {session_id}: {label}"),
                Ok(false) => {}
                Err(err) => warn!("Failed to title session {session_id}: {err:#}"),
            }
        }
    }

    let _ = app_handle.emit(
        "analysis-completed",
        AnalysisCompletedEvent {
            result: result.clone(),
        },
    );
    Ok(result)
}

/// Analyze whatever is already on hand: the current capture, the full
/// transcript, and an optional typed instruction.
#[tauri::command]
pub async fn run_analysis(
    state: State<'_, AppState>,
    app_handle: AppHandle,
    mode: Mode,
    instruction: Option<String>,
) -> Result<AnalysisResult, AnalysisFailure> {
    let screen = state.screen.current().map(|capture| capture.text);
    let payload = assemble(state.inner(), screen, instruction)?;
    run_assembled(state.inner(), &app_handle, mode, payload).await
}

/// The hotkey path: grab a fresh capture first, then analyze. A capture
/// miss degrades to the remaining sources rather than failing the whole
/// request; only an all-empty payload is an error.
#[tauri::command]
pub async fn capture_and_analyze(
    state: State<'_, AppState>,
    app_handle: AppHandle,
    mode: Mode,
    instruction: Option<String>,
) -> Result<AnalysisResult, AnalysisFailure> {
    let screen = fresh_capture(&state.screen, &app_handle).await;
    let payload = assemble(state.inner(), screen, instruction)?;
    run_assembled(state.inner(), &app_handle, mode, payload).await
}

async fn fresh_capture(
    broker: &ScreenCaptureBroker,
    app_handle: &AppHandle,
) -> Option<String> {
    let (request_id, rx) = broker.begin();

    #[derive(Serialize, Clone)]
    #[serde(rename_all = "camelCase")]
    struct ScreenCaptureRequestedEvent {
        request_id: u64,
    }

    if let Err(err) = app_handle.emit(
        "screen-capture-requested",
        ScreenCaptureRequestedEvent { request_id },
    ) {
        warn!("Failed to request screen capture: {err}");
        return None;
    }

    match broker.wait(request_id, rx).await {
        Ok(capture) => Some(capture.text),
        Err(CaptureError::NoTextDetected) => {
            info!("Screen capture found no text; continuing without it");
            None
        }
        Err(CaptureError::CaptureFailed(message)) => {
            warn!("Screen capture failed: {message}");
            None
        }
    }
}

/// Per-segment tagging pass over the current transcript.
#[tauri::command]
pub async fn analyze_transcript(
    state: State<'_, AppState>,
) -> Result<TranscriptAnalyses, AnalysisFailure> {
    let snapshot = state.store.snapshot();
    let overlay = state
        .engine
        .analyze_segments(&snapshot)
        .await
        .map_err(AnalysisFailure::from)?;

    // The log was cleared while the request was in flight; the overlay's
    // indices no longer mean anything.
    if overlay.is_stale(state.store.generation()) {
        return Err(AnalysisFailure::from(AnalysisError::Cancelled));
    }

    Ok(overlay)
}
