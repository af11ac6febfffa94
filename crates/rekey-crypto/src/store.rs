//! Key store: every known key by id, with "current" = largest id
//!
//! The store is shared between readers (`get`, `current`) and the rotation
//! writer (`add`). A `parking_lot::RwLock` serializes them, and readers get
//! `Arc<Key>` snapshots so a rotation never invalidates a key that an
//! in-flight encrypt or decrypt is still using.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rekey_core::{AlgorithmSpec, KeyId, KeyringError, KeyringResult};

use crate::keys::{derive_key, Key};

pub struct KeyStore {
    algorithm: AlgorithmSpec,
    keys: RwLock<BTreeMap<KeyId, Arc<Key>>>,
}

impl KeyStore {
    /// An empty store for `algorithm`. `current()` fails until a key is added.
    pub fn new(algorithm: AlgorithmSpec) -> Self {
        Self {
            algorithm,
            keys: RwLock::new(BTreeMap::new()),
        }
    }

    /// Build a store from textual ids and base64 secrets, stopping at the
    /// first id or secret that fails to parse.
    pub fn from_secrets<I, K, V>(secrets: I, algorithm: AlgorithmSpec) -> KeyringResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let store = Self::new(algorithm);
        for (id, secret) in secrets {
            let id = parse_key_id(id.as_ref())?;
            store.add(id, secret.as_ref())?;
        }
        Ok(store)
    }

    pub fn algorithm(&self) -> AlgorithmSpec {
        self.algorithm
    }

    /// Derive a key from `encoded` and insert it at `id`, replacing any key
    /// already stored there. Nothing is inserted if derivation fails.
    pub fn add(&self, id: KeyId, encoded: &str) -> KeyringResult<()> {
        let key = derive_key(id, encoded, self.algorithm.key_size())?;
        let replaced = self.keys.write().insert(id, Arc::new(key)).is_some();

        tracing::debug!(
            key_id = id,
            key_size = self.algorithm.key_size(),
            replaced,
            "key added"
        );
        Ok(())
    }

    /// Insert `encoded` under one past the current largest id (0 when empty)
    /// and return the id it was given.
    ///
    /// Id selection and insertion happen under one write lock, so two
    /// concurrent calls never pick the same id.
    pub fn add_next(&self, encoded: &str) -> KeyringResult<KeyId> {
        let mut keys = self.keys.write();
        let id = match keys.keys().next_back() {
            Some(max) => max.checked_add(1).ok_or_else(|| {
                KeyringError::InvalidKeyId(format!("{max} + 1 overflows"))
            })?,
            None => 0,
        };

        let key = derive_key(id, encoded, self.algorithm.key_size())?;
        keys.insert(id, Arc::new(key));
        drop(keys);

        tracing::debug!(key_id = id, "key rotated in");
        Ok(id)
    }

    pub fn get(&self, id: KeyId) -> KeyringResult<Arc<Key>> {
        self.keys
            .read()
            .get(&id)
            .cloned()
            .ok_or(KeyringError::KeyNotFound { id })
    }

    /// The key with the largest id, looked up afresh on every call.
    pub fn current(&self) -> KeyringResult<Arc<Key>> {
        self.keys
            .read()
            .values()
            .next_back()
            .cloned()
            .ok_or(KeyringError::EmptyKeyStore)
    }

    pub fn current_id(&self) -> Option<KeyId> {
        self.keys.read().keys().next_back().copied()
    }

    /// All ids in ascending order.
    pub fn ids(&self) -> Vec<KeyId> {
        self.keys.read().keys().copied().collect()
    }

    pub fn contains(&self, id: KeyId) -> bool {
        self.keys.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("algorithm", &self.algorithm.name())
            .field("ids", &self.ids())
            .finish()
    }
}

/// Parse a key-map identifier. Ids are non-negative integers; surrounding
/// whitespace is tolerated.
pub fn parse_key_id(raw: &str) -> KeyringResult<KeyId> {
    raw.trim()
        .parse::<KeyId>()
        .map_err(|_| KeyringError::InvalidKeyId(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rekey_core::AES128CBC;

    const SECRET_0: &str = "uDiMcWVNTuz//naQ88sOcN+E40CyBRGzGTT7OkoBS6M=";
    const SECRET_1: &str = "VN8UXRVMNbIh9FWEFVde0q7GUA1SGOie1+FgAKlNYHc=";

    #[test]
    fn test_empty_store_has_no_current() {
        let store = KeyStore::new(AES128CBC);
        assert!(store.is_empty());
        assert!(matches!(store.current(), Err(KeyringError::EmptyKeyStore)));
        assert_eq!(store.current_id(), None);
    }

    #[test]
    fn test_current_is_max_id_not_insertion_order() {
        let store = KeyStore::new(AES128CBC);
        store.add(5, SECRET_0).unwrap();
        store.add(2, SECRET_1).unwrap();

        assert_eq!(store.current().unwrap().id(), 5);
        assert_eq!(store.ids(), vec![2, 5]);
    }

    #[test]
    fn test_current_follows_rotation() {
        let store = KeyStore::new(AES128CBC);
        store.add(0, SECRET_0).unwrap();
        assert_eq!(store.current().unwrap().id(), 0);

        store.add(1, SECRET_1).unwrap();
        assert_eq!(store.current().unwrap().id(), 1);
        assert!(store.contains(0), "old keys stay resolvable");
    }

    #[test]
    fn test_get_missing() {
        let store = KeyStore::new(AES128CBC);
        store.add(0, SECRET_0).unwrap();
        assert!(matches!(
            store.get(9),
            Err(KeyringError::KeyNotFound { id: 9 })
        ));
    }

    #[test]
    fn test_add_overwrites_same_id() {
        let store = KeyStore::new(AES128CBC);
        store.add(3, SECRET_0).unwrap();
        let before = store.get(3).unwrap();

        store.add(3, SECRET_1).unwrap();
        let after = store.get(3).unwrap();

        assert_eq!(store.len(), 1);
        assert_ne!(before.signing_key(), after.signing_key());
    }

    #[test]
    fn test_failed_add_leaves_store_untouched() {
        let store = KeyStore::new(AES128CBC);
        store.add(0, SECRET_0).unwrap();

        let err = store.add(1, "ud3UH9tBzHKTaQ==").unwrap_err();
        assert!(matches!(
            err,
            KeyringError::KeyFormat {
                expected: 32,
                actual: 10
            }
        ));
        assert_eq!(store.ids(), vec![0]);
    }

    #[test]
    fn test_add_next_assigns_increasing_ids() {
        let store = KeyStore::new(AES128CBC);
        assert_eq!(store.add_next(SECRET_0).unwrap(), 0);
        assert_eq!(store.add_next(SECRET_1).unwrap(), 1);

        store.add(10, SECRET_0).unwrap();
        assert_eq!(store.add_next(SECRET_1).unwrap(), 11);
    }

    #[test]
    fn test_from_secrets() {
        let store =
            KeyStore::from_secrets([("1", SECRET_0), (" 2 ", SECRET_1)], AES128CBC).unwrap();
        assert_eq!(store.ids(), vec![1, 2]);
        assert_eq!(store.algorithm(), AES128CBC);
    }

    #[test]
    fn test_from_secrets_rejects_bad_id() {
        let err = KeyStore::from_secrets([("latest", SECRET_0)], AES128CBC).unwrap_err();
        assert!(matches!(err, KeyringError::InvalidKeyId(id) if id == "latest"));

        let err = KeyStore::from_secrets([("-1", SECRET_0)], AES128CBC).unwrap_err();
        assert!(matches!(err, KeyringError::InvalidKeyId(_)));
    }

    #[test]
    fn test_snapshot_survives_overwrite() {
        let store = KeyStore::new(AES128CBC);
        store.add(0, SECRET_0).unwrap();
        let snapshot = store.current().unwrap();

        store.add(0, SECRET_1).unwrap();
        assert_eq!(snapshot.id(), 0);
        assert_eq!(snapshot.signing_key().len(), 16);
    }

    #[test]
    fn test_concurrent_add_next_unique_ids() {
        let store = Arc::new(KeyStore::new(AES128CBC));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.add_next(SECRET_0).unwrap())
            })
            .collect();

        let mut ids: Vec<KeyId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..8).collect::<Vec<_>>());
    }
}
