//! rekey: versioned keyring CLI
//!
//! Commands:
//!   encrypt <message>                 - encrypt with the current key, print JSON
//!   decrypt <envelope> --key-id <id>  - decrypt an envelope with a specific key
//!   reencrypt <envelope> --key-id <id> - move an envelope onto the current key
//!   digest <message>                  - print the salted lookup digest
//!   generate                          - print a fresh secret for the algorithm
//!   keys                              - list loaded key ids
//!   config show                       - display the active configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::ExposeSecret;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rekey_core::config::{KeyringConfig, RekeyConfig};
use rekey_crypto::{generate_secret, parse_keys, AlgorithmSpec, KeyId, Keyring};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "rekey",
    version,
    about = "Versioned symmetric keyring",
    long_about = "rekey: encrypt, decrypt and digest short secrets with a rotating set of AES-CBC keys"
)]
struct Cli {
    /// Path to rekey.toml configuration file
    #[arg(long, short = 'c', env = "REKEY_CONFIG", default_value = "/etc/rekey/config.toml")]
    config: PathBuf,

    /// JSON key-map file (overrides config keys_file)
    #[arg(long, short = 'k')]
    keys: Option<PathBuf>,

    /// JSON key map given inline; merged over file and config keys
    #[arg(long, env = "REKEY_KEYS", hide_env_values = true)]
    keys_json: Option<String>,

    /// Algorithm (aes-128-cbc, aes-192-cbc, aes-256-cbc)
    #[arg(long, short = 'a')]
    algorithm: Option<AlgorithmSpec>,

    /// Digest salt (overrides config digest_salt)
    #[arg(long, env = "REKEY_DIGEST_SALT", hide_env_values = true)]
    salt: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "REKEY_LOG")]
    log: Option<String>,

    /// Log format (json, text)
    #[arg(long, env = "REKEY_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a message with the current key
    Encrypt {
        /// Plaintext message
        message: String,
    },

    /// Decrypt an envelope
    Decrypt {
        /// Base64 envelope
        envelope: String,
        /// Id of the key that produced the envelope
        #[arg(long)]
        key_id: KeyId,
    },

    /// Decrypt with an old key and encrypt again with the current key
    Reencrypt {
        /// Base64 envelope
        envelope: String,
        /// Id of the key that produced the envelope
        #[arg(long)]
        key_id: KeyId,
    },

    /// Print the salted SHA1 lookup digest of a message
    Digest {
        /// Plaintext message
        message: String,
    },

    /// Generate a new random secret for the configured algorithm
    Generate,

    /// List the loaded key ids and the current key
    Keys,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (defaults + config file), secrets masked
    Show,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (mut config, config_found) = load_config(&cli.config)?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = match &cli.log_format {
        Some(format) => format.clone(),
        None => LogFormat::from_str(&config.log.format, true).unwrap_or(LogFormat::Text),
    };
    init_logging(&level, &format);

    if !config_found {
        tracing::debug!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    if let Some(algorithm) = cli.algorithm {
        config.keyring.algorithm = algorithm;
    }
    if let Some(salt) = &cli.salt {
        config.keyring.digest_salt = salt.clone();
    }

    match cli.command {
        Commands::Generate => cmd_generate(config.keyring.algorithm),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config, config_found),
        command => {
            let keyring = build_keyring(&config.keyring, cli.keys.as_deref(), cli.keys_json.as_deref())?;
            match command {
                Commands::Encrypt { message } => cmd_encrypt(&keyring, &message),
                Commands::Decrypt { envelope, key_id } => cmd_decrypt(&keyring, &envelope, key_id),
                Commands::Reencrypt { envelope, key_id } => {
                    cmd_reencrypt(&keyring, &envelope, key_id)
                }
                Commands::Digest { message } => {
                    println!("{}", keyring.digest(&message));
                    Ok(())
                }
                Commands::Keys => cmd_keys(&keyring),
                Commands::Generate | Commands::Config { .. } => Ok(()),
            }
        }
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output; logs go to stderr
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Config and key loading ─────────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<(RekeyConfig, bool)> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((RekeyConfig::default(), false))
    }
}

/// Collect the key map. Later sources win on the same id:
/// keys file (flag, else config) < config inline keys < inline JSON.
fn resolve_key_map(
    config: &KeyringConfig,
    keys_file: Option<&Path>,
    keys_json: Option<&str>,
) -> Result<BTreeMap<String, String>> {
    let mut keys = BTreeMap::new();

    let file = keys_file
        .map(Path::to_path_buf)
        .or_else(|| config.keys_file.as_deref().map(expand_tilde));
    if let Some(path) = file {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading key map: {}", path.display()))?;
        let from_file =
            parse_keys(&content).with_context(|| format!("parsing key map: {}", path.display()))?;
        keys.extend(from_file);
    }

    keys.extend(config.keys.clone());

    if let Some(json) = keys_json {
        keys.extend(parse_keys(json).context("parsing inline key map")?);
    }

    Ok(keys)
}

fn build_keyring(
    config: &KeyringConfig,
    keys_file: Option<&Path>,
    keys_json: Option<&str>,
) -> Result<Keyring> {
    let keys = resolve_key_map(config, keys_file, keys_json)?;
    Keyring::new(&keys, config.digest_salt.clone(), config.algorithm).context(
        "loading keyring\n\
         Provide keys with --keys <file.json>, REKEY_KEYS='{\"1\": \"<base64>\"}',\n\
         or keyring.keys_file in the config file.",
    )
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn cmd_encrypt(keyring: &Keyring, message: &str) -> Result<()> {
    let encrypted = keyring.encrypt(message).context("encrypting message")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&encrypted).context("serializing result")?
    );
    Ok(())
}

fn cmd_decrypt(keyring: &Keyring, envelope: &str, key_id: KeyId) -> Result<()> {
    let plaintext = keyring
        .decrypt(envelope, key_id)
        .with_context(|| format!("decrypting with key id {key_id}"))?;
    println!("{plaintext}");
    Ok(())
}

fn cmd_reencrypt(keyring: &Keyring, envelope: &str, key_id: KeyId) -> Result<()> {
    let encrypted = keyring
        .reencrypt(envelope, key_id)
        .with_context(|| format!("re-encrypting envelope from key id {key_id}"))?;
    tracing::info!(
        from = key_id,
        to = encrypted.key_id,
        "envelope moved to current key"
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&encrypted).context("serializing result")?
    );
    Ok(())
}

fn cmd_generate(algorithm: AlgorithmSpec) -> Result<()> {
    let secret = generate_secret(algorithm).context("generating secret")?;
    println!("{}", secret.expose_secret());
    Ok(())
}

fn cmd_keys(keyring: &Keyring) -> Result<()> {
    let store = keyring.keys();
    println!("algorithm: {}", keyring.algorithm());
    for id in store.ids() {
        let marker = if Some(id) == store.current_id() {
            " (current)"
        } else {
            ""
        };
        println!("  {id}{marker}");
    }
    Ok(())
}

fn cmd_config_show(config: &RekeyConfig, config_path: &Path, found: bool) -> Result<()> {
    if found {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();

    let mut masked = config.clone();
    for secret in masked.keyring.keys.values_mut() {
        *secret = "********".into();
    }
    let rendered = toml::to_string_pretty(&masked).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rekey_crypto::{AES128CBC, AES256CBC};

    const SECRET_1: &str = "uDiMcWVNTuz//naQ88sOcN+E40CyBRGzGTT7OkoBS6M=";
    const SECRET_2: &str = "VN8UXRVMNbIh9FWEFVde0q7GUA1SGOie1+FgAKlNYHc=";

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_decrypt_args() {
        let cli = Cli::try_parse_from([
            "rekey",
            "--algorithm",
            "aes-256-cbc",
            "decrypt",
            "abc=",
            "--key-id",
            "3",
        ])
        .unwrap();

        assert_eq!(cli.algorithm, Some(AES256CBC));
        match cli.command {
            Commands::Decrypt { envelope, key_id } => {
                assert_eq!(envelope, "abc=");
                assert_eq!(key_id, 3);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_load_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, found) = load_config(&dir.path().join("absent.toml")).unwrap();
        assert!(!found);
        assert_eq!(config.keyring.algorithm, AES128CBC);
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rekey.toml");
        std::fs::write(
            &path,
            "[keyring]\nalgorithm = \"aes-256-cbc\"\ndigest_salt = \"a\"\n",
        )
        .unwrap();

        let (config, found) = load_config(&path).unwrap();
        assert!(found);
        assert_eq!(config.keyring.algorithm, AES256CBC);
        assert_eq!(config.keyring.digest_salt, "a");
    }

    #[test]
    fn test_load_invalid_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rekey.toml");
        std::fs::write(&path, "[keyring\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_key_map_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let keys_path = dir.path().join("keys.json");
        std::fs::write(
            &keys_path,
            format!(r#"{{"1": "{SECRET_1}", "2": "{SECRET_1}"}}"#),
        )
        .unwrap();

        let mut config = KeyringConfig::default();
        config.keys.insert("2".into(), SECRET_2.into());

        let inline = format!(r#"{{"3": "{SECRET_2}"}}"#);
        let keys = resolve_key_map(&config, Some(&keys_path), Some(&inline)).unwrap();

        assert_eq!(keys.len(), 3);
        assert_eq!(keys["1"], SECRET_1);
        assert_eq!(keys["2"], SECRET_2);
        assert_eq!(keys["3"], SECRET_2);
    }

    #[test]
    fn test_build_keyring_from_config_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let keys_path = dir.path().join("keys.json");
        std::fs::write(&keys_path, format!(r#"{{"7": "{SECRET_1}"}}"#)).unwrap();

        let config = KeyringConfig {
            keys_file: Some(keys_path),
            ..KeyringConfig::default()
        };
        let keyring = build_keyring(&config, None, None).unwrap();

        let encrypted = keyring.encrypt("42").unwrap();
        assert_eq!(encrypted.key_id, 7);
        assert_eq!(encrypted.digest, "92cfceb39d57d914ed8b14d0e37643de0797ae56");
    }

    #[test]
    fn test_build_keyring_without_keys_fails() {
        let err = build_keyring(&KeyringConfig::default(), None, None).unwrap_err();
        assert!(format!("{err:#}").contains("at least 1 key"));
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(
            expand_tilde(Path::new("/etc/rekey/keys.json")),
            PathBuf::from("/etc/rekey/keys.json")
        );
        let expanded = expand_tilde(Path::new("~/keys.json"));
        assert!(expanded.ends_with("keys.json"));
        assert!(!expanded.to_string_lossy().starts_with('~'));
    }
}
