//! IPC surface exposed to the Tauri frontend.
//!
//! Versioned modules (currently `v1`) group related commands so the
//! interface stays stable while the internals move.

pub mod v1;
