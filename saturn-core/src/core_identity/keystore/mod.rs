//! Keystore module
//!
//! Abstract keystore API for storing and loading private keys: the node's
//! identity key plus any number of named keys. Keys are stored as their
//! marshalled envelope (see [`crate::core_identity::envelope`]).

use crate::core_identity::error::KeyError;
use crate::core_identity::keypair::KeyPair;
use thiserror::Error;

pub mod file_keystore;
pub mod memory_keystore;

pub use file_keystore::FileKeystore;
pub use memory_keystore::MemoryKeystore;

/// Name reserved for the identity key
pub const IDENTITY_KEY_NAME: &str = "self";

/// Keystore errors
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Invalid key name: {0}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Stored key is invalid: {0}")]
    Key(#[from] KeyError),

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Other error: {0}")]
    Other(String),
}

/// Abstract keystore trait
pub trait Keystore: Send + Sync {
    /// Load the identity keypair
    fn load_identity_key(&self) -> Result<KeyPair, KeystoreError> {
        self.load_key(IDENTITY_KEY_NAME)
    }

    /// Save the identity keypair
    fn save_identity_key(&self, kp: &KeyPair) -> Result<(), KeystoreError> {
        self.put_key(IDENTITY_KEY_NAME, kp)
    }

    /// Whether an identity keypair is stored
    fn has_identity_key(&self) -> Result<bool, KeystoreError> {
        self.has_key(IDENTITY_KEY_NAME)
    }

    /// Load a named keypair
    fn load_key(&self, name: &str) -> Result<KeyPair, KeystoreError>;

    /// Save a named keypair. Use [`validate_key_name`] for user input.
    fn put_key(&self, name: &str, kp: &KeyPair) -> Result<(), KeystoreError>;

    /// Whether a named keypair is stored
    fn has_key(&self, name: &str) -> Result<bool, KeystoreError>;

    /// List stored key names, identity included
    fn list_keys(&self) -> Result<Vec<String>, KeystoreError>;

    /// Re-encrypt every stored key under a new password
    fn rotate_password(&mut self, new_password: Option<&str>) -> Result<(), KeystoreError>;
}

/// Check a user-supplied key name.
///
/// Names are non-empty, at most 64 characters of `[A-Za-z0-9._-]`, do not
/// start with a dot, and may not be the reserved identity name.
pub fn validate_key_name(name: &str) -> Result<(), KeystoreError> {
    if name.is_empty() || name.len() > 64 {
        return Err(KeystoreError::InvalidName(format!(
            "{:?} must be 1 to 64 characters",
            name
        )));
    }
    if name == IDENTITY_KEY_NAME {
        return Err(KeystoreError::InvalidName(format!("{:?} is reserved", name)));
    }
    if name.starts_with('.')
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(KeystoreError::InvalidName(format!(
            "{:?} contains invalid characters",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key_name() {
        assert!(validate_key_name("publish-key_2.v1").is_ok());
        assert!(validate_key_name("").is_err());
        assert!(validate_key_name("self").is_err());
        assert!(validate_key_name(".hidden").is_err());
        assert!(validate_key_name("../escape").is_err());
        assert!(validate_key_name("with space").is_err());
        assert!(validate_key_name(&"k".repeat(65)).is_err());
    }
}
