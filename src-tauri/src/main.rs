use std::path::PathBuf;

use directories::ProjectDirs;
use prism_core::agents::HttpConfig;
use prism_core::api::v1::{self, ApiState};
use prism_core::db::init_db;
use prism_core::dispatch::DispatchConfig;
use tauri::{Emitter, Manager};

const DISPATCH_EVENT: &str = "dispatch://state";

fn workspace_dir() -> PathBuf {
    if let Some(proj) = ProjectDirs::from("com", "Prism", "Prism") {
        proj.data_dir().to_path_buf()
    } else {
        std::env::temp_dir().join("Prism")
    }
}

fn main() {
    tauri::Builder::default()
        .setup(|app| {
            let db = init_db(workspace_dir()).expect("failed to init db");
            let state = ApiState::new(db, &HttpConfig::default(), DispatchConfig::default())
                .expect("failed to initialise providers");

            let mut updates = state.engine.subscribe();
            let handle = app.handle().clone();
            tauri::async_runtime::spawn(async move {
                while updates.changed().await.is_ok() {
                    let snapshot = updates.borrow_and_update().clone();
                    if let Err(err) = handle.emit(DISPATCH_EVENT, &snapshot) {
                        log::warn!(target: "prism::shell", "failed to forward dispatch state: {err}");
                    }
                }
            });

            app.manage(state);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            v1::ping,
            v1::list_providers,
            v1::get_settings,
            v1::save_api_key,
            v1::clear_api_key,
            v1::clear_api_keys,
            v1::select_model,
            v1::reset_model_selections,
            v1::set_temperature,
            v1::set_enabled_providers,
            v1::generate_responses,
            v1::dispatch_state,
            v1::list_dispatch_events
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
