use tauri::{AppHandle, Emitter, State};

use crate::{settings::ModelSettings, AppState};

#[tauri::command]
pub fn get_model_settings(state: State<'_, AppState>) -> Result<ModelSettings, String> {
    Ok(state.settings.model())
}

#[tauri::command]
pub fn update_model_settings(
    settings: ModelSettings,
    state: State<'_, AppState>,
    app_handle: AppHandle,
) -> Result<(), String> {
    state
        .settings
        .update_model(settings.clone())
        .map_err(|e| e.to_string())?;

    // A changed credential deserves a fresh chance.
    state.engine.reset_auth();

    app_handle
        .emit("model-settings-updated", &settings)
        .map_err(|e| e.to_string())?;

    Ok(())
}
