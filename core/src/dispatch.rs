//! Concurrent fan-out of one prompt to every enabled provider.
//!
//! A round marks each enabled provider as loading, then polls all provider
//! calls together inside one spawned task. Each call settles on its own: its
//! result lands in [`DispatchState`] and is published on the watch channel
//! as soon as it arrives, however its siblings fare. Starting a new round
//! aborts the previous one, and writes tagged with an older round number
//! are dropped.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};

use crate::agents::catalog::DEFAULT_TEMPERATURE;
use crate::agents::{
    resolve_request, CompletionProvider, CompletionRequest, CompletionResult, ProviderRegistry,
    RegisteredProvider, SettingsStore,
};
use crate::credentials::CredentialStore;
use crate::db::DbPool;
use crate::errors::PrismError;
use crate::logging::spawn_event;

pub const NO_CREDENTIALS_MESSAGE: &str =
    "No API keys configured. Add your API keys in the settings to get started.";

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Upper bound for a single provider call.
    pub call_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderState {
    pub loading: bool,
    pub result: Option<CompletionResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchState {
    pub round: u64,
    pub providers: BTreeMap<String, ProviderState>,
}

impl DispatchState {
    pub fn get(&self, provider_id: &str) -> Option<&ProviderState> {
        self.providers.get(provider_id)
    }

    pub fn is_loading(&self) -> bool {
        self.providers.values().any(|p| p.loading)
    }

    pub fn settled(&self) -> Vec<&str> {
        self.providers
            .iter()
            .filter(|(_, p)| !p.loading)
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

/// Handle on a started round.
#[derive(Debug)]
pub struct DispatchTicket {
    round: u64,
    providers: Vec<String>,
    handle: JoinHandle<()>,
}

impl DispatchTicket {
    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    /// Resolves once every provider in the round has settled, or the round
    /// was superseded.
    pub async fn wait(self) {
        if let Err(err) = self.handle.await {
            if !err.is_cancelled() {
                log::error!(target: "prism::dispatch", "round {} task failed: {err}", self.round);
            }
        }
    }
}

enum Plan {
    Call {
        adapter: Arc<dyn CompletionProvider>,
        api_key: String,
        request: CompletionRequest,
    },
    Unavailable(String),
}

struct ProviderCall {
    provider_id: String,
    name: String,
    plan: Plan,
}

/// The round currently owning the state, tagged with the submission that
/// started it.
#[derive(Default)]
struct InFlight {
    submission: u64,
    abort: Option<AbortHandle>,
}

pub struct DispatchEngine {
    registry: Arc<ProviderRegistry>,
    credentials: Arc<CredentialStore>,
    settings: Arc<SettingsStore>,
    config: DispatchConfig,
    updates: Arc<watch::Sender<DispatchState>>,
    submissions: AtomicU64,
    in_flight: Mutex<InFlight>,
    event_log: Option<DbPool>,
}

impl DispatchEngine {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        credentials: Arc<CredentialStore>,
        settings: Arc<SettingsStore>,
        config: DispatchConfig,
    ) -> Self {
        let (updates, _) = watch::channel(DispatchState::default());
        Self {
            registry,
            credentials,
            settings,
            config,
            updates: Arc::new(updates),
            submissions: AtomicU64::new(0),
            in_flight: Mutex::new(InFlight::default()),
            event_log: None,
        }
    }

    /// Record settled calls and rejected rounds in `event_log`.
    pub fn with_event_log(mut self, pool: DbPool) -> Self {
        self.event_log = Some(pool);
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn subscribe(&self) -> watch::Receiver<DispatchState> {
        self.updates.subscribe()
    }

    pub fn state(&self) -> DispatchState {
        self.updates.borrow().clone()
    }

    /// Starts a round for `enabled` and returns without waiting for any
    /// provider. Fails before any network traffic when the prompt is blank,
    /// nothing known is enabled, or no enabled provider has a usable key.
    ///
    /// Submission order decides which round wins: a call that finishes its
    /// preflight after a later call has already started is refused with
    /// [`PrismError::Superseded`].
    pub async fn generate_responses<I, S>(
        &self,
        prompt: &str,
        enabled: I,
    ) -> Result<DispatchTicket, PrismError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if prompt.trim().is_empty() {
            return Err(PrismError::EmptyPrompt);
        }
        let submission = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;

        let mut targets: Vec<RegisteredProvider> = Vec::new();
        for id in enabled {
            let id = id.as_ref();
            let Some(entry) = self.registry.get(id) else {
                log::warn!(target: "prism::dispatch", "ignoring unknown provider {id}");
                continue;
            };
            if !targets.iter().any(|t| t.descriptor.id() == id) {
                targets.push(entry.clone());
            }
        }
        if targets.is_empty() {
            return Err(self.reject("No providers are enabled. Select at least one provider."));
        }

        let ids: Vec<String> = targets.iter().map(|t| t.descriptor.id().to_string()).collect();
        let credentials = self.credentials.clone();
        let settings = self.settings.clone();
        let (snapshot, mut keys) = tokio::task::spawn_blocking(move || {
            let snapshot = settings.snapshot()?;
            let mut keys = BTreeMap::new();
            for id in ids {
                let key = credentials.load_key(&id)?;
                keys.insert(id, key);
            }
            Ok::<_, PrismError>((snapshot, keys))
        })
        .await
        .map_err(|err| PrismError::Storage(err.to_string()))??;

        if keys.values().all(Option::is_none) {
            return Err(self.reject(NO_CREDENTIALS_MESSAGE));
        }

        let mut calls = Vec::with_capacity(targets.len());
        for entry in targets {
            let descriptor = &entry.descriptor;
            let name = descriptor.name().to_string();
            let plan = match keys.remove(descriptor.id()).flatten() {
                Some(api_key) => Plan::Call {
                    request: resolve_request(descriptor, prompt, &snapshot)?,
                    adapter: entry.adapter.clone(),
                    api_key,
                },
                None => Plan::Unavailable(format!(
                    "{name} API key is not set. Please add your API key in the settings."
                )),
            };
            calls.push(ProviderCall {
                provider_id: descriptor.id().to_string(),
                name,
                plan,
            });
        }
        let providers: Vec<String> = calls.iter().map(|c| c.provider_id.clone()).collect();

        let mut in_flight = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if in_flight.submission > submission {
            log::info!(
                target: "prism::dispatch",
                "submission {submission} dropped, {} already started",
                in_flight.submission
            );
            return Err(PrismError::Superseded);
        }
        if let Some(previous) = in_flight.abort.take() {
            previous.abort();
        }
        let mut round = 0;
        self.updates.send_modify(|state| {
            state.round += 1;
            round = state.round;
            state.providers = providers
                .iter()
                .map(|id| {
                    let loading = ProviderState {
                        loading: true,
                        result: None,
                    };
                    (id.clone(), loading)
                })
                .collect();
        });
        log::info!(
            target: "prism::dispatch",
            "round {round} dispatched to {}",
            providers.join(", ")
        );

        let handle = tokio::spawn(run_round(
            round,
            calls,
            self.updates.clone(),
            self.config.call_timeout,
            self.event_log.clone(),
        ));
        *in_flight = InFlight {
            submission,
            abort: Some(handle.abort_handle()),
        };

        Ok(DispatchTicket {
            round,
            providers,
            handle,
        })
    }

    fn reject(&self, message: &str) -> PrismError {
        log::warn!(target: "prism::dispatch", "dispatch rejected: {message}");
        if let Some(pool) = &self.event_log {
            spawn_event(
                pool,
                "warn",
                "DSP-0100",
                "dispatch",
                "Dispatch rejected before any provider call",
                Some("Enable a provider and add its API key in the settings."),
                json!({ "reason": message }),
            );
        }
        PrismError::Configuration(message.to_string())
    }
}

impl Drop for DispatchEngine {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.in_flight.lock() {
            if let Some(handle) = guard.abort.take() {
                handle.abort();
            }
        }
    }
}

async fn run_round(
    round: u64,
    calls: Vec<ProviderCall>,
    updates: Arc<watch::Sender<DispatchState>>,
    call_timeout: Duration,
    event_log: Option<DbPool>,
) {
    let pending = calls
        .into_iter()
        .map(|call| settle(round, call, &updates, call_timeout, event_log.as_ref()));
    join_all(pending).await;
    log::debug!(target: "prism::dispatch", "round {round} settled");
}

async fn settle(
    round: u64,
    call: ProviderCall,
    updates: &watch::Sender<DispatchState>,
    call_timeout: Duration,
    event_log: Option<&DbPool>,
) {
    let started = Instant::now();
    let ProviderCall {
        provider_id,
        name,
        plan,
    } = call;
    let (model, result) = match plan {
        Plan::Unavailable(message) => (None, CompletionResult::failure(message)),
        Plan::Call {
            adapter,
            api_key,
            request,
        } => {
            let result = invoke(&name, adapter.as_ref(), &api_key, &request, call_timeout).await;
            (Some(request.model), result)
        }
    };
    let result = result.with_response_time(started.elapsed());

    match &result.error {
        Some(error) => log::warn!(target: "prism::dispatch", "{provider_id} failed: {error}"),
        None => log::info!(
            target: "prism::dispatch",
            "{provider_id} answered in {:.0}ms",
            result.response_time
        ),
    }
    if let Some(pool) = event_log {
        record_settlement(pool, round, &provider_id, model.as_deref(), &result);
    }

    let applied = updates.send_if_modified(|state| {
        if state.round != round {
            return false;
        }
        match state.providers.get_mut(&provider_id) {
            Some(entry) => {
                entry.loading = false;
                entry.result = Some(result);
                true
            }
            None => false,
        }
    });
    if !applied {
        log::debug!(target: "prism::dispatch", "dropped stale result for {provider_id} from round {round}");
    }
}

async fn invoke(
    name: &str,
    adapter: &dyn CompletionProvider,
    api_key: &str,
    request: &CompletionRequest,
    call_timeout: Duration,
) -> CompletionResult {
    let temperature = request.temperature.unwrap_or(DEFAULT_TEMPERATURE);
    if let Err(err) = adapter.initialize(api_key, temperature) {
        return CompletionResult::failure(err.to_string());
    }
    let call = AssertUnwindSafe(adapter.generate_completion(request)).catch_unwind();
    match tokio::time::timeout(call_timeout, call).await {
        Ok(Ok(Ok(result))) => result,
        Ok(Ok(Err(err))) => {
            log::error!(target: "prism::dispatch", "{name} adapter refused the call: {err}");
            CompletionResult::failure(err.to_string())
        }
        Ok(Err(_)) => {
            log::error!(target: "prism::dispatch", "{name} adapter panicked");
            CompletionResult::failure(format!("{name} failed unexpectedly. Please try again."))
        }
        Err(_) => CompletionResult::failure(format!(
            "{name} request timed out after {}",
            describe_limit(call_timeout)
        )),
    }
}

fn describe_limit(limit: Duration) -> String {
    if limit.as_secs() > 0 && limit.subsec_millis() == 0 {
        format!("{}s", limit.as_secs())
    } else {
        format!("{}ms", limit.as_millis())
    }
}

fn record_settlement(
    pool: &DbPool,
    round: u64,
    provider_id: &str,
    model: Option<&str>,
    result: &CompletionResult,
) {
    match &result.error {
        Some(error) => spawn_event(
            pool,
            "warn",
            "DSP-0201",
            "dispatch",
            "Provider call failed",
            Some("The error is shown in the provider's response panel."),
            json!({
                "round": round,
                "provider": provider_id,
                "model": model,
                "error": error,
                "elapsed_ms": result.response_time,
            }),
        ),
        None => spawn_event(
            pool,
            "info",
            "DSP-0200",
            "dispatch",
            "Provider call settled",
            None,
            json!({
                "round": round,
                "provider": provider_id,
                "model": model,
                "elapsed_ms": result.response_time,
                "preview": result.text.chars().take(200).collect::<String>(),
            }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_helpers() {
        let mut state = DispatchState::default();
        assert!(!state.is_loading());
        state.providers.insert(
            "a".into(),
            ProviderState {
                loading: true,
                result: None,
            },
        );
        state.providers.insert(
            "b".into(),
            ProviderState {
                loading: false,
                result: Some(CompletionResult::success("ok", "m")),
            },
        );
        assert!(state.is_loading());
        assert_eq!(state.settled(), ["b"]);
        assert!(state.get("c").is_none());
    }

    #[test]
    fn limits_are_described_readably() {
        assert_eq!(describe_limit(Duration::from_secs(60)), "60s");
        assert_eq!(describe_limit(Duration::from_millis(50)), "50ms");
        assert_eq!(describe_limit(Duration::from_millis(1500)), "1500ms");
    }

    #[test]
    fn state_serialises_for_the_frontend() {
        let mut state = DispatchState {
            round: 3,
            ..DispatchState::default()
        };
        state.providers.insert(
            "openai".into(),
            ProviderState {
                loading: false,
                result: Some(CompletionResult::failure("nope")),
            },
        );
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["round"], 3);
        assert_eq!(value["providers"]["openai"]["loading"], false);
        assert_eq!(value["providers"]["openai"]["result"]["error"], "nope");
        assert!(value["providers"]["openai"]["result"]["responseTime"].is_number());
    }
}
