#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_trait::async_trait;
use prism_core::agents::{
    CompletionProvider, CompletionRequest, CompletionResult, ModelVariant, ProviderDescriptor,
    ProviderRegistry, SettingsStore, TokenUsage,
};
use prism_core::credentials::CredentialStore;
use prism_core::dispatch::{DispatchConfig, DispatchEngine};
use prism_core::errors::PrismError;
use prism_core::storage::{LocalStorage, MemoryStorage};

#[derive(Debug, Clone)]
pub enum Behaviour {
    Reply { text: &'static str, delay: Duration },
    Fail { message: &'static str },
    Hang,
    Panic,
}

pub struct FakeProvider {
    id: String,
    behaviour: Behaviour,
    calls: AtomicUsize,
    session: Mutex<Option<(String, f32)>>,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl FakeProvider {
    pub fn new(id: &str, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            behaviour,
            calls: AtomicUsize::new(0),
            session: Mutex::new(None),
            last_request: Mutex::new(None),
        })
    }

    pub fn reply(id: &str, text: &'static str, delay_ms: u64) -> Arc<Self> {
        Self::new(
            id,
            Behaviour::Reply {
                text,
                delay: Duration::from_millis(delay_ms),
            },
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn session(&self) -> Option<(String, f32)> {
        self.session.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for FakeProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn initialize(&self, api_key: &str, temperature: f32) -> Result<(), PrismError> {
        *self.session.lock().unwrap() = Some((api_key.to_string(), temperature));
        Ok(())
    }

    async fn generate_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResult, PrismError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.session().is_none() {
            return Err(PrismError::NotInitialized {
                provider: self.id.clone(),
            });
        }
        *self.last_request.lock().unwrap() = Some(request.clone());
        match &self.behaviour {
            Behaviour::Reply { text, delay } => {
                tokio::time::sleep(*delay).await;
                Ok(CompletionResult::success(*text, &request.model)
                    .with_estimated_usage(TokenUsage::estimate(&request.prompt, text)))
            }
            Behaviour::Fail { message } => Ok(CompletionResult::failure(*message)),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(CompletionResult::failure("woke up"))
            }
            Behaviour::Panic => panic!("adapter exploded"),
        }
    }
}

pub fn display_name(id: &str) -> String {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn descriptor_for(id: &str) -> ProviderDescriptor {
    ProviderDescriptor::new(
        id,
        display_name(id),
        vec![
            ModelVariant::new(format!("{id}-large"), "Large").with_budget(Some(2048), Some(0.4)),
            ModelVariant::new(format!("{id}-small"), "Small"),
        ],
    )
    .unwrap()
}

/// Wraps [`MemoryStorage`] and stalls the first read of one key.
pub struct SlowFirstRead {
    inner: MemoryStorage,
    key: &'static str,
    delay: Duration,
    stalled: AtomicBool,
}

impl SlowFirstRead {
    pub fn new(key: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStorage::new(),
            key,
            delay,
            stalled: AtomicBool::new(false),
        })
    }
}

impl LocalStorage for SlowFirstRead {
    fn get_item(&self, key: &str) -> Result<Option<String>, PrismError> {
        if key == self.key && !self.stalled.swap(true, Ordering::SeqCst) {
            thread::sleep(self.delay);
        }
        self.inner.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PrismError> {
        self.inner.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), PrismError> {
        self.inner.remove_item(key)
    }

    fn keys(&self) -> Result<Vec<String>, PrismError> {
        self.inner.keys()
    }
}

pub struct Harness {
    pub engine: DispatchEngine,
    pub storage: Arc<dyn LocalStorage>,
    pub credentials: Arc<CredentialStore>,
    pub settings: Arc<SettingsStore>,
}

pub fn harness(fakes: &[Arc<FakeProvider>], config: DispatchConfig) -> Harness {
    harness_with_storage(fakes, Arc::new(MemoryStorage::new()), config)
}

pub fn harness_with_storage(
    fakes: &[Arc<FakeProvider>],
    storage: Arc<dyn LocalStorage>,
    config: DispatchConfig,
) -> Harness {
    let mut registry = ProviderRegistry::new();
    for fake in fakes {
        let adapter: Arc<dyn CompletionProvider> = fake.clone();
        registry
            .register(descriptor_for(fake.provider_id()), adapter)
            .unwrap();
    }
    build(registry, storage, config)
}

pub fn harness_with_registry(registry: ProviderRegistry, config: DispatchConfig) -> Harness {
    build(registry, Arc::new(MemoryStorage::new()), config)
}

fn build(registry: ProviderRegistry, storage: Arc<dyn LocalStorage>, config: DispatchConfig) -> Harness {
    let credentials = Arc::new(CredentialStore::new(storage.clone()));
    let settings = Arc::new(SettingsStore::new(storage.clone(), registry.descriptors()));
    let engine = DispatchEngine::new(
        Arc::new(registry),
        credentials.clone(),
        settings.clone(),
        config,
    );
    Harness {
        engine,
        storage,
        credentials,
        settings,
    }
}

/// Serves exactly one HTTP response and hands back the raw request text.
pub fn respond_once(status: u16, reason: &str, body: &str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let request = read_request(&mut stream);
        stream.write_all(response.as_bytes()).unwrap();
        stream.flush().unwrap();
        request
    });
    (format!("http://{addr}"), handle)
}

fn read_request(stream: &mut impl Read) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn local_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}
