//! rekey-core: shared types for the rekey versioned keyring
//!
//! Holds the algorithm descriptors, the error taxonomy every crate returns,
//! and the TOML configuration schema used by the CLI.

pub mod config;
pub mod error;
pub mod types;

pub use error::{KeyringError, KeyringResult};
pub use types::{AlgorithmSpec, KeyId, AES128CBC, AES192CBC, AES256CBC};
