//! Version 1 of the Tauri IPC API.
//!
//! Commands are thin wrappers that validate input, run storage work on the
//! blocking pool, and return JSON-friendly payloads to the UI. Dispatch
//! progress is not returned here; the shell forwards every published
//! [`DispatchState`] to the window as it changes.

use std::sync::Arc;

use serde::Serialize;
use tauri::{async_runtime::spawn_blocking, State};
use time::OffsetDateTime;

use crate::agents::{
    build_client, HttpConfig, ProviderDescriptor, ProviderRegistry, SettingsSnapshot,
    SettingsStore,
};
use crate::credentials::{CredentialStore, LegacyCredentialStore};
use crate::db::DbPool;
use crate::dispatch::{DispatchConfig, DispatchEngine, DispatchState};
use crate::errors::PrismError;
use crate::storage::{LocalStorage, SqliteStorage};

/// Shared state injected into each Tauri command handler.
#[derive(Clone)]
pub struct ApiState {
    pub db: DbPool,
    pub engine: Arc<DispatchEngine>,
}

impl ApiState {
    /// Wires storage, credentials, settings and the four bundled providers
    /// over `db`, moving any legacy credentials to the current store.
    pub fn new(db: DbPool, http: &HttpConfig, dispatch: DispatchConfig) -> Result<Self, PrismError> {
        let storage: Arc<dyn LocalStorage> = Arc::new(SqliteStorage::new(db.clone()));
        let registry = ProviderRegistry::with_default_providers(build_client(http)?)?;
        let settings = SettingsStore::new(storage.clone(), registry.descriptors());
        let credentials = CredentialStore::new(storage.clone());

        let legacy = LegacyCredentialStore::new(storage);
        credentials.migrate_legacy(&legacy, registry.ids())?;

        let engine = DispatchEngine::new(
            Arc::new(registry),
            Arc::new(credentials),
            Arc::new(settings),
            dispatch,
        )
        .with_event_log(db.clone());
        Ok(Self {
            db,
            engine: Arc::new(engine),
        })
    }
}

async fn blocking<T, F>(work: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PrismError> + Send + 'static,
{
    spawn_blocking(work)
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())
}

/// Simple health-check endpoint for UI components.
#[tauri::command]
pub fn ping() -> serde_json::Value {
    serde_json::json!({
        "ok": true,
        "ts": OffsetDateTime::now_utc().unix_timestamp(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderView {
    #[serde(flatten)]
    pub descriptor: ProviderDescriptor,
    pub has_key: bool,
}

#[tauri::command]
pub async fn list_providers(state: State<'_, ApiState>) -> Result<Vec<ProviderView>, String> {
    let engine = state.engine.clone();
    blocking(move || {
        let credentials = engine.credentials();
        engine
            .registry()
            .descriptors()
            .into_iter()
            .map(|descriptor| -> Result<ProviderView, PrismError> {
                let has_key = credentials.has_key(descriptor.id())?;
                Ok(ProviderView {
                    descriptor,
                    has_key,
                })
            })
            .collect()
    })
    .await
}

#[tauri::command]
pub async fn get_settings(state: State<'_, ApiState>) -> Result<SettingsSnapshot, String> {
    let settings = state.engine.settings().clone();
    blocking(move || settings.snapshot()).await
}

/// Store a provider key. An empty key clears the stored one.
#[tauri::command]
pub async fn save_api_key(
    state: State<'_, ApiState>,
    provider_id: String,
    api_key: String,
) -> Result<(), String> {
    state
        .engine
        .registry()
        .require(&provider_id)
        .map_err(|e| e.to_string())?;
    let credentials = state.engine.credentials().clone();
    blocking(move || {
        if api_key.trim().is_empty() {
            credentials.clear_key(&provider_id)
        } else {
            credentials.save_key(&provider_id, &api_key)
        }
    })
    .await
}

#[tauri::command]
pub async fn clear_api_key(state: State<'_, ApiState>, provider_id: String) -> Result<(), String> {
    state
        .engine
        .registry()
        .require(&provider_id)
        .map_err(|e| e.to_string())?;
    let credentials = state.engine.credentials().clone();
    blocking(move || credentials.clear_key(&provider_id)).await
}

#[tauri::command]
pub async fn clear_api_keys(state: State<'_, ApiState>) -> Result<(), String> {
    let credentials = state.engine.credentials().clone();
    blocking(move || credentials.clear_all()).await
}

#[tauri::command]
pub async fn select_model(
    state: State<'_, ApiState>,
    provider_id: String,
    model_id: String,
) -> Result<SettingsSnapshot, String> {
    let settings = state.engine.settings().clone();
    blocking(move || {
        settings.select_model(&provider_id, &model_id)?;
        settings.snapshot()
    })
    .await
}

#[tauri::command]
pub async fn reset_model_selections(state: State<'_, ApiState>) -> Result<SettingsSnapshot, String> {
    let settings = state.engine.settings().clone();
    blocking(move || {
        settings.reset_model_selections()?;
        settings.snapshot()
    })
    .await
}

#[tauri::command]
pub async fn set_temperature(
    state: State<'_, ApiState>,
    provider_id: String,
    temperature: f32,
) -> Result<SettingsSnapshot, String> {
    let settings = state.engine.settings().clone();
    blocking(move || {
        settings.set_temperature(&provider_id, temperature)?;
        settings.snapshot()
    })
    .await
}

#[tauri::command]
pub async fn set_enabled_providers(
    state: State<'_, ApiState>,
    provider_ids: Vec<String>,
) -> Result<Vec<String>, String> {
    let settings = state.engine.settings().clone();
    blocking(move || settings.set_enabled_providers(provider_ids)).await
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStarted {
    pub round: u64,
    pub providers: Vec<String>,
}

/// Start a round. Without an explicit list the saved selection is used.
#[tauri::command]
pub async fn generate_responses(
    state: State<'_, ApiState>,
    prompt: String,
    provider_ids: Option<Vec<String>>,
) -> Result<DispatchStarted, String> {
    let provider_ids = match provider_ids {
        Some(ids) => ids,
        None => {
            let settings = state.engine.settings().clone();
            blocking(move || settings.snapshot()).await?.enabled_providers
        }
    };
    let ticket = state
        .engine
        .generate_responses(&prompt, provider_ids)
        .await
        .map_err(|e| e.to_string())?;
    Ok(DispatchStarted {
        round: ticket.round(),
        providers: ticket.providers().to_vec(),
    })
}

#[tauri::command]
pub fn dispatch_state(state: State<ApiState>) -> DispatchState {
    state.engine.state()
}

#[derive(Debug, Serialize)]
pub struct DispatchEvent {
    pub id: String,
    pub ts: i64,
    pub level: String,
    pub code: Option<String>,
    pub message: String,
    pub explain: Option<String>,
    pub data: Option<serde_json::Value>,
}

/// Most recent dispatch audit events, newest first.
#[tauri::command]
pub fn list_dispatch_events(
    state: State<ApiState>,
    limit: Option<usize>,
) -> Result<Vec<DispatchEvent>, String> {
    let conn = state.db.get().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(
            "SELECT id, ts, level, code, message, explain, data FROM event_log WHERE module = 'dispatch' ORDER BY ts DESC LIMIT ?1",
        )
        .map_err(|e| e.to_string())?;
    let limit = limit.map(|l| l as i64).unwrap_or(-1);
    let rows = stmt
        .query_map([limit], map_dispatch_event)
        .map_err(|e| e.to_string())?;
    let mut events = Vec::new();
    for row in rows {
        events.push(row.map_err(|e| e.to_string())?);
    }
    Ok(events)
}

fn map_dispatch_event(
    row: &r2d2_sqlite::rusqlite::Row,
) -> r2d2_sqlite::rusqlite::Result<DispatchEvent> {
    let data_str: Option<String> = row.get(6)?;
    let data = data_str.and_then(|raw| serde_json::from_str(&raw).ok());
    Ok(DispatchEvent {
        id: row.get(0)?,
        ts: row.get(1)?,
        level: row.get(2)?,
        code: row.get(3)?,
        message: row.get(4)?,
        explain: row.get(5)?,
        data,
    })
}
