use serde::Serialize;
use tauri::{AppHandle, Emitter, State};

use crate::AppState;

use super::{
    screen::ScreenCapture,
    speech::ListeningState,
};

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct ScreenCaptureRequestedEvent {
    request_id: u64,
}

#[tauri::command]
pub async fn start_listening(state: State<'_, AppState>) -> Result<ListeningState, String> {
    state
        .speech
        .start_listening()
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn stop_listening(state: State<'_, AppState>) -> Result<ListeningState, String> {
    state
        .speech
        .stop_listening()
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn get_listening_state(state: State<'_, AppState>) -> Result<ListeningState, String> {
    Ok(state.speech.state().await)
}

#[tauri::command]
pub async fn speech_result(
    state: State<'_, AppState>,
    text: String,
    is_final: bool,
) -> Result<(), String> {
    state
        .speech
        .speech_result(text, is_final)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn speech_provider_started(state: State<'_, AppState>) -> Result<(), String> {
    state.speech.provider_started().await;
    Ok(())
}

#[tauri::command]
pub async fn speech_provider_ended(state: State<'_, AppState>) -> Result<(), String> {
    state.speech.provider_ended().await;
    Ok(())
}

#[tauri::command]
pub async fn speech_provider_error(
    state: State<'_, AppState>,
    code: String,
) -> Result<(), String> {
    state.speech.provider_error(code).await;
    Ok(())
}

/// Capture-now: asks the provider for a frame+OCR pass and waits for the
/// delivered text or the deadline.
#[tauri::command]
pub async fn capture_screen(
    state: State<'_, AppState>,
    app_handle: AppHandle,
) -> Result<ScreenCapture, String> {
    let (request_id, rx) = state.screen.begin();
    app_handle
        .emit(
            "screen-capture-requested",
            ScreenCaptureRequestedEvent { request_id },
        )
        .map_err(|e| e.to_string())?;

    state
        .screen
        .wait(request_id, rx)
        .await
        .map_err(|e| e.to_string())
}

/// Provider side of the broker: the webview posts OCR output (or its
/// failure) back for a request id it received.
#[tauri::command]
pub async fn deliver_screen_capture(
    state: State<'_, AppState>,
    request_id: u64,
    text: Option<String>,
    error: Option<String>,
) -> Result<(), String> {
    let reply = match error {
        Some(message) => Err(message),
        None => Ok(text.unwrap_or_default()),
    };
    state.screen.deliver(request_id, reply);
    Ok(())
}

#[tauri::command]
pub async fn get_current_capture(
    state: State<'_, AppState>,
) -> Result<Option<ScreenCapture>, String> {
    Ok(state.screen.current())
}
