//! Core library for comparing answers from several LLM providers side by side.
//!
//! - [`crypto`] holds AES-256-GCM sealing and the device fingerprint salt.
//! - [`storage`] is the key/value store that settings and credentials live in.
//! - [`credentials`] keeps provider API keys encrypted at rest.
//! - [`agents`] describes providers, resolves settings and talks to vendors.
//! - [`dispatch`] fans a prompt out to every enabled provider concurrently.
//! - [`db`] and [`logging`] set up SQLite and the structured event log.
//! - `api` exposes the IPC surface the Tauri UI invokes (feature `tauri-ipc`).

pub mod agents;
#[cfg(feature = "tauri-ipc")]
pub mod api;
pub mod credentials;
pub mod crypto;
pub mod db;
pub mod dispatch;
pub mod errors;
pub mod logging;
pub mod storage;

pub use errors::PrismError;
