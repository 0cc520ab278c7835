use serde::Serialize;
use tauri::{AppHandle, Emitter, State};

use crate::{db::Session, AppState};

use super::TranscriptSnapshot;

const SESSION_LIST_LIMIT: u32 = 50;

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct TranscriptClearedEvent {
    generation: u64,
}

#[tauri::command]
pub async fn get_transcript(state: State<'_, AppState>) -> Result<TranscriptSnapshot, String> {
    Ok(state.store.snapshot())
}

/// Empties the log atomically. Any analysis overlay issued against the
/// old generation becomes stale and is discarded by the UI.
#[tauri::command]
pub async fn clear_transcript(
    state: State<'_, AppState>,
    app_handle: AppHandle,
) -> Result<(), String> {
    let generation = state.store.clear();

    if let Some(session_id) = state.speech.current_session().await {
        state
            .db
            .delete_segments_for_session(&session_id)
            .await
            .map_err(|e| e.to_string())?;
    }

    let _ = app_handle.emit("transcript-cleared", TranscriptClearedEvent { generation });
    Ok(())
}

#[tauri::command]
pub async fn list_sessions(state: State<'_, AppState>) -> Result<Vec<Session>, String> {
    state
        .db
        .list_recent_sessions(SESSION_LIST_LIMIT)
        .await
        .map_err(|e| e.to_string())
}

/// Reopen a past session: its persisted transcript replaces the current
/// log and new segments append into it. Refused while listening.
#[tauri::command]
pub async fn resume_session(
    state: State<'_, AppState>,
    session_id: String,
) -> Result<TranscriptSnapshot, String> {
    if state.speech.state().await != crate::capture::ListeningState::Stopped {
        return Err("stop listening before resuming a session".into());
    }

    let segments = state
        .db
        .get_segments_for_session(&session_id)
        .await
        .map_err(|e| e.to_string())?;
    if !state
        .db
        .reopen_session(&session_id, chrono::Utc::now())
        .await
        .map_err(|e| e.to_string())?
    {
        return Err("no such session".into());
    }

    // clear() bumps the generation, so overlays computed against the
    // previous log are discarded.
    state.store.clear();
    state.store.restore(
        segments
            .into_iter()
            .map(|row| (row.captured_at, row.text))
            .collect(),
    );
    state.speech.adopt_session(session_id).await;

    Ok(state.store.snapshot())
}

#[tauri::command]
pub async fn get_session_transcript(
    state: State<'_, AppState>,
    session_id: String,
) -> Result<Vec<crate::db::StoredSegment>, String> {
    state
        .db
        .get_segments_for_session(&session_id)
        .await
        .map_err(|e| e.to_string())
}
