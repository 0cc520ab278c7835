mod analysis;
mod capture;
mod context;
mod credits;
mod db;
mod llm;
mod settings;
mod settings_commands;
mod transcript;

use std::sync::Arc;

use analysis::{
    commands::{analyze_transcript, capture_and_analyze, run_analysis},
    AnalysisEngine,
};
use capture::{
    commands::{
        capture_screen, deliver_screen_capture, get_current_capture, get_listening_state,
        speech_provider_ended, speech_provider_error, speech_provider_started, speech_result,
        start_listening, stop_listening,
    },
    ScreenCaptureBroker, SpeechController,
};
use credits::UnmeteredGate;
use db::Database;
use llm::HttpModelClient;
use log::info;
use settings::SettingsStore;
use settings_commands::{get_model_settings, update_model_settings};
use tauri::Manager;
use transcript::{
    commands::{
        clear_transcript, get_session_transcript, get_transcript, list_sessions, resume_session,
    },
    TranscriptStore,
};

pub(crate) struct AppState {
    pub(crate) db: Database,
    pub(crate) settings: Arc<SettingsStore>,
    pub(crate) store: Arc<TranscriptStore>,
    pub(crate) engine: Arc<AnalysisEngine>,
    pub(crate) speech: SpeechController,
    pub(crate) screen: Arc<ScreenCaptureBroker>,
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Lectern starting up...");

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let result = (|| -> anyhow::Result<()> {
                let app_data_dir = app
                    .path()
                    .app_data_dir()
                    .map_err(|err| anyhow::anyhow!(err))?;
                std::fs::create_dir_all(&app_data_dir)?;

                let db_path = app_data_dir.join("lectern.sqlite3");
                let database = Database::new(db_path)?;

                let settings_path = app_data_dir.join("settings.json");
                let settings = Arc::new(SettingsStore::new(settings_path)?);

                let store = Arc::new(TranscriptStore::new());
                let speech =
                    SpeechController::new(app.handle().clone(), database.clone(), store.clone());

                // Reload the transcript of a session left open by a
                // crash so listening can resume where it stopped.
                {
                    let db = database.clone();
                    let store = store.clone();
                    let speech = speech.clone();
                    tauri::async_runtime::block_on(async move {
                        if let Some(session) = db.get_open_session().await? {
                            let segments = db.get_segments_for_session(&session.id).await?;
                            info!(
                                "Recovered open session {} with {} segments",
                                session.id,
                                segments.len()
                            );
                            store.restore(
                                segments
                                    .into_iter()
                                    .map(|row| (row.captured_at, row.text))
                                    .collect(),
                            );
                            speech.adopt_session(session.id).await;
                        }
                        Ok::<(), anyhow::Error>(())
                    })?;
                }

                let model = Arc::new(HttpModelClient::new(settings.clone()));
                let quota = Arc::new(UnmeteredGate);
                let engine = Arc::new(AnalysisEngine::new(model, quota, settings.clone()));

                app.manage(AppState {
                    db: database,
                    settings,
                    store,
                    engine,
                    speech,
                    screen: Arc::new(ScreenCaptureBroker::new()),
                });

                Ok(())
            })();

            result.map_err(|err| err.into())
        })
        .invoke_handler(tauri::generate_handler![
            start_listening,
            stop_listening,
            get_listening_state,
            speech_result,
            speech_provider_started,
            speech_provider_ended,
            speech_provider_error,
            capture_screen,
            deliver_screen_capture,
            get_current_capture,
            get_transcript,
            clear_transcript,
            list_sessions,
            resume_session,
            get_session_transcript,
            run_analysis,
            capture_and_analyze,
            analyze_transcript,
            get_model_settings,
            update_model_settings,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
