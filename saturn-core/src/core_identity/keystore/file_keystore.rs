//! File-based keystore with encryption at rest
//!
//! One file per key, `<name>.key`, the identity key being `self.key`.
//!
//! Encrypted File Format:
//! ```text
//! [Magic: 8 bytes "SATKS001"]
//! [Version: 1 byte]
//! [Salt: 16 bytes]
//! [Nonce: 12 bytes]
//! [Ciphertext + AEAD tag: variable]
//! ```
//!
//! Without a password the file is `[Magic "SATK_RAW"][Version][envelope]`.

use super::{validate_key_name, Keystore, KeystoreError, IDENTITY_KEY_NAME};
use crate::core_identity::envelope;
use crate::core_identity::keypair::KeyPair;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Argon2, Params};
use rand::RngCore;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Magic header for encrypted keystore files
const MAGIC_HEADER: &[u8; 8] = b"SATKS001";

/// Magic header for unencrypted keystore files
const RAW_HEADER: &[u8; 8] = b"SATK_RAW";

/// Current keystore format version
const FORMAT_VERSION: u8 = 1;

/// Salt length for Argon2 KDF (16 bytes = 128 bits)
const SALT_LEN: usize = 16;

/// Nonce length for AES-GCM (12 bytes = 96 bits)
const NONCE_LEN: usize = 12;

/// Header size: magic(8) + version(1) + salt(16) + nonce(12) = 37 bytes
const HEADER_SIZE: usize = 8 + 1 + SALT_LEN + NONCE_LEN;

const KEY_EXTENSION: &str = "key";

/// File-based encrypted keystore
pub struct FileKeystore {
    /// Directory where keys are stored
    base_path: PathBuf,
    /// Encryption password
    password: Option<Zeroizing<String>>,
}

impl FileKeystore {
    /// Create a new file keystore at the given path
    pub fn new(base_path: PathBuf, password: Option<&str>) -> Result<Self, KeystoreError> {
        fs::create_dir_all(&base_path)?;

        if password.is_none() {
            warn!(path = %base_path.display(), "keystore opened without a password, keys are stored unencrypted");
        }

        Ok(FileKeystore {
            base_path,
            password: password.map(|s| Zeroizing::new(s.to_string())),
        })
    }

    /// Whether keys written by this keystore are encrypted
    pub fn is_encrypted(&self) -> bool {
        self.password.is_some()
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn key_path(&self, name: &str) -> Result<PathBuf, KeystoreError> {
        if name != IDENTITY_KEY_NAME {
            validate_key_name(name)?;
        }
        Ok(self.base_path.join(format!("{}.{}", name, KEY_EXTENSION)))
    }

    /// Encrypt data with AEAD (AES-256-GCM)
    ///
    /// Returns: [magic][version][salt][nonce][ciphertext+tag]
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, KeystoreError> {
        if let Some(password) = &self.password {
            let mut salt = [0u8; SALT_LEN];
            rand::thread_rng().fill_bytes(&mut salt);

            let key = derive_key_from_password(password, &salt)?;

            let mut nonce_bytes = [0u8; NONCE_LEN];
            rand::thread_rng().fill_bytes(&mut nonce_bytes);
            let nonce = Nonce::from_slice(&nonce_bytes);

            let cipher = Aes256Gcm::new_from_slice(&key[..])
                .map_err(|e| KeystoreError::Encryption(format!("Invalid key: {}", e)))?;

            let ciphertext = cipher
                .encrypt(nonce, data)
                .map_err(|e| KeystoreError::Encryption(format!("Encryption failed: {}", e)))?;

            let mut result = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
            result.extend_from_slice(MAGIC_HEADER);
            result.push(FORMAT_VERSION);
            result.extend_from_slice(&salt);
            result.extend_from_slice(&nonce_bytes);
            result.extend_from_slice(&ciphertext);

            Ok(result)
        } else {
            let mut result = Vec::with_capacity(9 + data.len());
            result.extend_from_slice(RAW_HEADER);
            result.push(FORMAT_VERSION);
            result.extend_from_slice(data);
            Ok(result)
        }
    }

    /// Decrypt data with AEAD (AES-256-GCM)
    ///
    /// Expects: [magic][version][salt][nonce][ciphertext+tag]
    fn decrypt(&self, data: &[u8]) -> Result<Zeroizing<Vec<u8>>, KeystoreError> {
        if data.len() < 9 {
            return Err(KeystoreError::Decryption("File too short".to_string()));
        }

        if &data[0..8] == RAW_HEADER {
            if self.password.is_some() {
                return Err(KeystoreError::Decryption(
                    "Encrypted keystore expected, found unencrypted".to_string(),
                ));
            }
            check_version(data[8])?;
            return Ok(Zeroizing::new(data[9..].to_vec()));
        }

        if &data[0..8] != MAGIC_HEADER {
            return Err(KeystoreError::Decryption("Invalid magic header".to_string()));
        }

        check_version(data[8])?;

        // 16 is the AEAD tag size
        if data.len() < HEADER_SIZE + 16 {
            return Err(KeystoreError::Decryption("Truncated file".to_string()));
        }

        let password = self.password.as_ref().ok_or_else(|| {
            KeystoreError::Decryption("Password required to decrypt".to_string())
        })?;

        let salt = &data[9..9 + SALT_LEN];
        let nonce = Nonce::from_slice(&data[9 + SALT_LEN..HEADER_SIZE]);
        let ciphertext = &data[HEADER_SIZE..];

        let key = derive_key_from_password(password, salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| KeystoreError::Decryption(format!("Invalid key: {}", e)))?;

        // AEAD tag mismatch = wrong password or corrupted file
        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| KeystoreError::InvalidPassword)?;

        Ok(Zeroizing::new(plaintext))
    }
}

impl Keystore for FileKeystore {
    fn load_key(&self, name: &str) -> Result<KeyPair, KeystoreError> {
        let path = self.key_path(name)?;
        if !path.exists() {
            return Err(KeystoreError::NotFound(format!("{} not found", name)));
        }

        let encrypted = fs::read(&path)?;
        let decrypted = self.decrypt(&encrypted)?;
        let kp = envelope::unmarshal_private_key(&decrypted)?;
        debug!(name, "loaded key from keystore");
        Ok(kp)
    }

    fn put_key(&self, name: &str, kp: &KeyPair) -> Result<(), KeystoreError> {
        let path = self.key_path(name)?;
        let serialized = envelope::marshal_private_key(kp)?;
        let encrypted = self.encrypt(&serialized)?;
        write_atomic(&path, &encrypted)?;
        debug!(name, encrypted = self.is_encrypted(), "stored key in keystore");
        Ok(())
    }

    fn has_key(&self, name: &str) -> Result<bool, KeystoreError> {
        Ok(self.key_path(name)?.exists())
    }

    fn list_keys(&self) -> Result<Vec<String>, KeystoreError> {
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(KEY_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    fn rotate_password(&mut self, new_password: Option<&str>) -> Result<(), KeystoreError> {
        // Decrypt everything first so a bad current password changes nothing
        let mut keys = Vec::new();
        for name in self.list_keys()? {
            let kp = self.load_key(&name)?;
            keys.push((name, kp));
        }

        let rotated = FileKeystore {
            base_path: self.base_path.clone(),
            password: new_password.map(|s| Zeroizing::new(s.to_string())),
        };

        // Stage every re-encrypted key before replacing any of them
        let mut staged = Vec::with_capacity(keys.len());
        for (name, kp) in &keys {
            let path = self.key_path(name)?;
            let temp_path = staging_path(&path);
            let written = envelope::marshal_private_key(kp)
                .map_err(KeystoreError::from)
                .and_then(|serialized| rotated.encrypt(&serialized))
                .and_then(|encrypted| write_owner_only(&temp_path, &encrypted).map_err(Into::into));
            if let Err(e) = written {
                let _ = fs::remove_file(&temp_path);
                discard_staged(&staged);
                return Err(e);
            }
            staged.push((temp_path, path));
        }

        for (temp_path, path) in &staged {
            fs::rename(temp_path, path)?;
        }
        self.password = rotated.password;

        info!(
            keys = keys.len(),
            encrypted = self.is_encrypted(),
            "keystore password rotated"
        );
        Ok(())
    }
}

fn discard_staged(staged: &[(PathBuf, PathBuf)]) {
    for (temp_path, _) in staged {
        if let Err(e) = fs::remove_file(temp_path) {
            warn!(path = %temp_path.display(), error = %e, "failed to remove staged key");
        }
    }
}

fn staging_path(path: &Path) -> PathBuf {
    path.with_extension("tmp")
}

/// Create `path` readable by the owner only (on unix) and write `data` to it.
///
/// A leftover file at `path` is removed first so its mode is not inherited.
fn write_owner_only(path: &Path, data: &[u8]) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

/// Replace `path` with `data` via a temp file and rename, owner-only on unix.
///
/// Readers never see a partial file, and the contents are never readable by
/// other users, not even briefly.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let temp_path = staging_path(path);
    if let Err(e) = write_owner_only(&temp_path, data) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    fs::rename(&temp_path, path)
}

fn check_version(version: u8) -> Result<(), KeystoreError> {
    if version != FORMAT_VERSION {
        return Err(KeystoreError::Decryption(format!(
            "Unsupported version: {}",
            version
        )));
    }
    Ok(())
}

/// Derive 256-bit encryption key from password using Argon2id
fn derive_key_from_password(password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, KeystoreError> {
    let params = Params::new(
        19 * 1024, // 19 MiB memory cost
        2,         // 2 iterations
        1,         // 1 thread
        Some(32),  // 32-byte output (256 bits for AES-256)
    )
    .map_err(|e| KeystoreError::Encryption(format!("Invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|e| KeystoreError::Encryption(format!("Key derivation failed: {}", e)))?;

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{rsa_1024, test_rng_with_seed};
    use tempfile::TempDir;

    fn ed25519_key(seed: u64) -> KeyPair {
        KeyPair::generate_ed25519(&mut test_rng_with_seed(seed)).unwrap()
    }

    fn saved_identity(password: Option<&str>) -> (TempDir, FileKeystore, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let keystore = FileKeystore::new(temp_dir.path().to_path_buf(), password).unwrap();
        keystore.save_identity_key(&ed25519_key(1)).unwrap();
        let path = keystore.key_path(IDENTITY_KEY_NAME).unwrap();
        (temp_dir, keystore, path)
    }

    #[test]
    fn test_create_and_load_identity_key() {
        let temp_dir = TempDir::new().unwrap();
        let keystore =
            FileKeystore::new(temp_dir.path().to_path_buf(), Some("password123")).unwrap();

        let kp = rsa_1024();
        keystore.save_identity_key(&kp).unwrap();

        let loaded = keystore.load_identity_key().unwrap();
        assert_eq!(loaded, *kp);
        assert!(keystore.has_identity_key().unwrap());
    }

    #[test]
    fn test_named_keys() {
        let temp_dir = TempDir::new().unwrap();
        let keystore = FileKeystore::new(temp_dir.path().to_path_buf(), None).unwrap();

        keystore.save_identity_key(&ed25519_key(1)).unwrap();
        keystore.put_key("publish", &ed25519_key(2)).unwrap();
        keystore.put_key("backup", &ed25519_key(3)).unwrap();

        let names = keystore.list_keys().unwrap();
        assert_eq!(names, vec!["backup", "publish", "self"]);
        assert_eq!(keystore.load_key("publish").unwrap(), ed25519_key(2));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let keystore = FileKeystore::new(temp_dir.path().to_path_buf(), None).unwrap();

        let result = keystore.put_key("../outside", &ed25519_key(1));
        assert!(matches!(result, Err(KeystoreError::InvalidName(_))));
    }

    #[test]
    fn test_not_found_error() {
        let temp_dir = TempDir::new().unwrap();
        let keystore = FileKeystore::new(temp_dir.path().to_path_buf(), None).unwrap();

        let result = keystore.load_identity_key();
        assert!(matches!(result, Err(KeystoreError::NotFound(_))));
        assert!(!keystore.has_identity_key().unwrap());
    }

    #[test]
    fn test_corrupted_aead_tag() {
        let (_dir, keystore, path) = saved_identity(Some("password123"));

        let mut encrypted = fs::read(&path).unwrap();
        let len = encrypted.len();
        encrypted[len - 1] ^= 0xFF;
        fs::write(&path, &encrypted).unwrap();

        match keystore.load_identity_key() {
            Err(KeystoreError::InvalidPassword) => {}
            _ => panic!("Expected InvalidPassword error for corrupted AEAD tag"),
        }
    }

    #[test]
    fn test_corrupted_ciphertext() {
        let (_dir, keystore, path) = saved_identity(Some("password123"));

        let mut encrypted = fs::read(&path).unwrap();
        encrypted[HEADER_SIZE + 10] ^= 0xFF;
        fs::write(&path, &encrypted).unwrap();

        match keystore.load_identity_key() {
            Err(KeystoreError::InvalidPassword) => {}
            _ => panic!("Expected InvalidPassword for corrupted ciphertext"),
        }
    }

    #[test]
    fn test_wrong_passphrase() {
        let (dir, _keystore, _path) = saved_identity(Some("correct_password"));

        let keystore2 =
            FileKeystore::new(dir.path().to_path_buf(), Some("wrong_password")).unwrap();

        match keystore2.load_identity_key() {
            Err(KeystoreError::InvalidPassword) => {}
            _ => panic!("Expected InvalidPassword error"),
        }
    }

    #[test]
    fn test_truncated_file() {
        let (_dir, keystore, path) = saved_identity(Some("password123"));

        let encrypted = fs::read(&path).unwrap();
        fs::write(&path, &encrypted[0..10]).unwrap();

        match keystore.load_identity_key() {
            Err(KeystoreError::Decryption(msg)) => {
                assert!(msg.contains("too short") || msg.contains("Truncated"));
            }
            _ => panic!("Expected Decryption error for truncated file"),
        }
    }

    #[test]
    fn test_invalid_magic_header() {
        let (_dir, keystore, path) = saved_identity(Some("password123"));

        let mut encrypted = fs::read(&path).unwrap();
        encrypted[0] = b'X';
        fs::write(&path, &encrypted).unwrap();

        match keystore.load_identity_key() {
            Err(KeystoreError::Decryption(msg)) => assert!(msg.contains("magic")),
            _ => panic!("Expected Decryption error for invalid magic"),
        }
    }

    #[test]
    fn test_unsupported_version() {
        let (_dir, keystore, path) = saved_identity(Some("password123"));

        let mut encrypted = fs::read(&path).unwrap();
        encrypted[8] = 99;
        fs::write(&path, &encrypted).unwrap();

        match keystore.load_identity_key() {
            Err(KeystoreError::Decryption(msg)) => assert!(msg.contains("version")),
            _ => panic!("Expected Decryption error for unsupported version"),
        }
    }

    #[test]
    fn test_garbage_plaintext_is_key_error() {
        let (_dir, keystore, path) = saved_identity(None);

        let mut data = RAW_HEADER.to_vec();
        data.push(FORMAT_VERSION);
        data.extend_from_slice(b"not an envelope");
        fs::write(&path, &data).unwrap();

        assert!(matches!(
            keystore.load_identity_key(),
            Err(KeystoreError::Key(_))
        ));
    }

    #[test]
    fn test_nonce_and_salt_uniqueness() {
        let temp_dir = TempDir::new().unwrap();
        let keystore =
            FileKeystore::new(temp_dir.path().to_path_buf(), Some("password123")).unwrap();

        let data = b"test data";
        let encrypted1 = keystore.encrypt(data).unwrap();
        let encrypted2 = keystore.encrypt(data).unwrap();

        let nonce1 = &encrypted1[9 + SALT_LEN..HEADER_SIZE];
        let nonce2 = &encrypted2[9 + SALT_LEN..HEADER_SIZE];
        assert_ne!(nonce1, nonce2, "Nonces must be unique for each encryption");

        let salt1 = &encrypted1[9..9 + SALT_LEN];
        let salt2 = &encrypted2[9..9 + SALT_LEN];
        assert_ne!(salt1, salt2, "Salts must be unique for each encryption");

        assert_ne!(encrypted1, encrypted2, "Ciphertexts must differ");
    }

    #[test]
    fn test_unencrypted_mode() {
        let (_dir, keystore, path) = saved_identity(None);

        let loaded = keystore.load_identity_key().unwrap();
        assert_eq!(loaded, ed25519_key(1));

        let data = fs::read(&path).unwrap();
        assert_eq!(&data[0..8], RAW_HEADER);
    }

    #[test]
    fn test_encrypted_keystore_rejects_unencrypted_file() {
        let (dir, _keystore, _path) = saved_identity(None);

        let keystore2 = FileKeystore::new(dir.path().to_path_buf(), Some("password")).unwrap();

        match keystore2.load_identity_key() {
            Err(KeystoreError::Decryption(msg)) => assert!(msg.contains("unencrypted")),
            _ => panic!("Expected error when encrypted keystore loads unencrypted file"),
        }
    }

    #[test]
    fn test_rotate_password() {
        let (dir, mut keystore, _path) = saved_identity(Some("old"));
        keystore.put_key("extra", &ed25519_key(2)).unwrap();

        keystore.rotate_password(Some("new")).unwrap();

        let old = FileKeystore::new(dir.path().to_path_buf(), Some("old")).unwrap();
        assert!(matches!(
            old.load_identity_key(),
            Err(KeystoreError::InvalidPassword)
        ));

        let new = FileKeystore::new(dir.path().to_path_buf(), Some("new")).unwrap();
        assert_eq!(new.load_identity_key().unwrap(), ed25519_key(1));
        assert_eq!(new.load_key("extra").unwrap(), ed25519_key(2));
    }

    #[test]
    fn test_rotate_with_wrong_password_changes_nothing() {
        let (dir, _keystore, path) = saved_identity(Some("right"));
        let before = fs::read(&path).unwrap();

        let mut wrong = FileKeystore::new(dir.path().to_path_buf(), Some("wrong")).unwrap();
        assert!(wrong.rotate_password(Some("new")).is_err());

        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_failed_rotation_keeps_old_password() {
        let (dir, mut keystore, path) = saved_identity(Some("old"));
        keystore.put_key("extra", &ed25519_key(2)).unwrap();
        let extra_path = keystore.key_path("extra").unwrap();
        let before = (fs::read(&extra_path).unwrap(), fs::read(&path).unwrap());

        // A directory where the identity key would be staged makes staging fail
        fs::create_dir(dir.path().join("self.tmp")).unwrap();
        assert!(keystore.rotate_password(Some("new")).is_err());

        assert_eq!(
            (fs::read(&extra_path).unwrap(), fs::read(&path).unwrap()),
            before
        );
        assert!(!dir.path().join("extra.tmp").exists());
        assert_eq!(keystore.load_identity_key().unwrap(), ed25519_key(1));
        assert_eq!(keystore.load_key("extra").unwrap(), ed25519_key(2));
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_replaces_loose_files() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("secret");
        for leftover in [&path, &staging_path(&path)] {
            fs::write(leftover, b"old").unwrap();
            fs::set_permissions(leftover, fs::Permissions::from_mode(0o644)).unwrap();
        }

        write_atomic(&path, b"new").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new");
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!staging_path(&path).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_key_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, _keystore, path) = saved_identity(Some("password123"));
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
