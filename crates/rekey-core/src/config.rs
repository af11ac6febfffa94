use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::types::AlgorithmSpec;

/// Top-level configuration (loaded from rekey.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RekeyConfig {
    pub keyring: KeyringConfig,
    pub log: LogConfig,
}

/// Keyring construction parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyringConfig {
    /// aes-128-cbc, aes-192-cbc or aes-256-cbc (default: aes-128-cbc)
    pub algorithm: AlgorithmSpec,
    /// Salt appended to every message before digesting (may be empty)
    pub digest_salt: String,
    /// JSON file holding an `{"id": "base64 secret"}` map
    pub keys_file: Option<PathBuf>,
    /// Inline key map; entries here win over `keys_file`
    pub keys: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}
