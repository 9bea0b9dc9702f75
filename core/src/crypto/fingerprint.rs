//! Device fingerprint salt.
//!
//! The salt is stable for one device/locale combination and needs no stored
//! state. It is not a secret.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const SEPARATOR: &str = "|";

/// Environment characteristics that make up the fingerprint. Any signal
/// may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSignals {
    pub user_agent: Option<String>,
    pub platform: Option<String>,
    pub language: Option<String>,
    pub hardware_concurrency: Option<usize>,
    pub time_zone: Option<String>,
}

impl DeviceSignals {
    /// Gather signals from the current process environment.
    pub fn detect() -> Self {
        Self {
            user_agent: Some(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            )),
            platform: Some(format!(
                "{}-{}",
                std::env::consts::OS,
                std::env::consts::ARCH
            )),
            language: ["LC_ALL", "LC_MESSAGES", "LANG"]
                .iter()
                .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty())),
            hardware_concurrency: std::thread::available_parallelism()
                .ok()
                .map(|n| n.get()),
            time_zone: std::env::var("TZ").ok(),
        }
    }

    fn parts(&self) -> Vec<String> {
        [
            self.user_agent.clone(),
            self.platform.clone(),
            self.language.clone(),
            self.hardware_concurrency.map(|n| n.to_string()),
            self.time_zone.clone(),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect()
    }
}

/// SHA-256 of the available signals joined with `|`, as lowercase hex.
pub fn compute_salt(signals: &DeviceSignals) -> String {
    let joined = signals.parts().join(SEPARATOR);
    format!("{:x}", Sha256::digest(joined.as_bytes()))
}

pub fn compute_device_salt() -> String {
    compute_salt(&DeviceSignals::detect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeviceSignals {
        DeviceSignals {
            user_agent: Some("Mozilla/5.0".into()),
            platform: Some("Linux x86_64".into()),
            language: Some("en-US".into()),
            hardware_concurrency: Some(8),
            time_zone: Some("Europe/Berlin".into()),
        }
    }

    #[test]
    fn salt_is_deterministic() {
        assert_eq!(compute_salt(&sample()), compute_salt(&sample()));
        assert_eq!(compute_device_salt(), compute_device_salt());
    }

    #[test]
    fn salt_is_hex_sha256_of_joined_signals() {
        let expected = format!(
            "{:x}",
            Sha256::digest(b"Mozilla/5.0|Linux x86_64|en-US|8|Europe/Berlin")
        );
        assert_eq!(compute_salt(&sample()), expected);
        assert_eq!(expected.len(), 64);
    }

    #[test]
    fn missing_signals_are_skipped() {
        let mut signals = sample();
        signals.platform = None;
        signals.language = Some(String::new());
        let expected = format!("{:x}", Sha256::digest(b"Mozilla/5.0|8|Europe/Berlin"));
        assert_eq!(compute_salt(&signals), expected);
    }

    #[test]
    fn different_devices_differ() {
        let mut other = sample();
        other.hardware_concurrency = Some(4);
        assert_ne!(compute_salt(&sample()), compute_salt(&other));
    }
}
