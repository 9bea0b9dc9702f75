//! Client-side protection for stored credentials.
//!
//! [`cipher`] holds the AES-256-GCM primitive and the persisted device key;
//! [`fingerprint`] derives the non-secret device salt used by the legacy
//! credential path.

pub mod cipher;
pub mod fingerprint;

pub use cipher::{decrypt, encrypt, EncryptionKey, KeyManager};
pub use fingerprint::{compute_device_salt, compute_salt, DeviceSignals};
