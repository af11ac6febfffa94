use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::KeyringError;

/// Caller-assigned key identifier. The largest id in a store is the current key.
pub type KeyId = u32;

/// Describes one member of the AES-CBC + HMAC-SHA256 family.
///
/// Only the three constants below exist; every variant shares the same
/// envelope layout and differs solely in AES key length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlgorithmSpec {
    key_size: usize,
    name: &'static str,
    authenticated_aead: bool,
}

pub const AES128CBC: AlgorithmSpec = AlgorithmSpec {
    key_size: 16,
    name: "AES-128-CBC",
    authenticated_aead: false,
};

pub const AES192CBC: AlgorithmSpec = AlgorithmSpec {
    key_size: 24,
    name: "AES-192-CBC",
    authenticated_aead: false,
};

pub const AES256CBC: AlgorithmSpec = AlgorithmSpec {
    key_size: 32,
    name: "AES-256-CBC",
    authenticated_aead: false,
};

impl AlgorithmSpec {
    pub const ALL: [AlgorithmSpec; 3] = [AES128CBC, AES192CBC, AES256CBC];

    /// AES key length in bytes (16, 24 or 32).
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Decoded length of a secret for this algorithm: signing half + encryption half.
    pub fn secret_size(&self) -> usize {
        self.key_size * 2
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Reserved for AEAD layouts. The CBC+HMAC envelope is used regardless.
    pub fn authenticated_aead(&self) -> bool {
        self.authenticated_aead
    }
}

impl Default for AlgorithmSpec {
    fn default() -> Self {
        AES128CBC
    }
}

impl fmt::Display for AlgorithmSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl FromStr for AlgorithmSpec {
    type Err = KeyringError;

    /// Accepts `AES-128-CBC`, `aes-128-cbc`, `AES128CBC` and the like.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_uppercase();

        match normalized.as_str() {
            "AES128CBC" => Ok(AES128CBC),
            "AES192CBC" => Ok(AES192CBC),
            "AES256CBC" => Ok(AES256CBC),
            _ => Err(KeyringError::UnknownAlgorithm(s.to_string())),
        }
    }
}

impl Serialize for AlgorithmSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name.to_ascii_lowercase())
    }
}

impl<'de> Deserialize<'de> for AlgorithmSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}
