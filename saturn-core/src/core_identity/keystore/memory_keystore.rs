//! In-memory keystore for testing

use super::{validate_key_name, Keystore, KeystoreError, IDENTITY_KEY_NAME};
use crate::core_identity::envelope;
use crate::core_identity::keypair::KeyPair;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use zeroize::Zeroizing;

/// Helper to convert poison errors into KeystoreError
fn handle_poison<T>(_err: PoisonError<T>) -> KeystoreError {
    KeystoreError::Other("Lock poisoned: a thread panicked while holding the lock".to_string())
}

/// In-memory keystore (non-persistent, for tests).
///
/// Holds marshalled envelopes, so a stored key goes through the same
/// decode path as one read from disk.
#[derive(Clone)]
pub struct MemoryKeystore {
    keys: Arc<RwLock<HashMap<String, Zeroizing<Vec<u8>>>>>,
}

impl MemoryKeystore {
    /// Create a new memory keystore
    pub fn new() -> Self {
        MemoryKeystore {
            keys: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryKeystore {
    fn default() -> Self {
        Self::new()
    }
}

fn check_name(name: &str) -> Result<(), KeystoreError> {
    if name == IDENTITY_KEY_NAME {
        return Ok(());
    }
    validate_key_name(name)
}

impl Keystore for MemoryKeystore {
    fn load_key(&self, name: &str) -> Result<KeyPair, KeystoreError> {
        check_name(name)?;
        let keys = self.keys.read().map_err(handle_poison)?;
        let bytes = keys
            .get(name)
            .ok_or_else(|| KeystoreError::NotFound(format!("{} not found", name)))?;
        Ok(envelope::unmarshal_private_key(bytes)?)
    }

    fn put_key(&self, name: &str, kp: &KeyPair) -> Result<(), KeystoreError> {
        check_name(name)?;
        let bytes = envelope::marshal_private_key(kp)?;
        self.keys
            .write()
            .map_err(handle_poison)?
            .insert(name.to_string(), bytes);
        Ok(())
    }

    fn has_key(&self, name: &str) -> Result<bool, KeystoreError> {
        check_name(name)?;
        Ok(self.keys.read().map_err(handle_poison)?.contains_key(name))
    }

    fn list_keys(&self) -> Result<Vec<String>, KeystoreError> {
        let mut names: Vec<String> = self
            .keys
            .read()
            .map_err(handle_poison)?
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    fn rotate_password(&mut self, _new_password: Option<&str>) -> Result<(), KeystoreError> {
        // Nothing is encrypted in memory
        Ok(())
    }
}
