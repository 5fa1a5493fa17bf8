//! Node repository
//!
//! A repository is a directory holding the node's `config` (TOML), a
//! `repover` version marker and, when the identity key is password
//! protected, a `keystore/` directory. [`Repo::init`] creates one;
//! [`Repo::open`] loads it back into a [`NodeIdentity`].

use crate::config::{Config, ConfigError};
use crate::core_identity::{FileKeystore, KeyError, Keystore, KeystoreError, NodeIdentity};
use rand_core::CryptoRngCore;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// On-disk layout version written at init
pub const REPO_VERSION: &str = "6";

/// Default repository location before tilde expansion
pub const DEFAULT_REPO_DIR: &str = "~/.saturn";

pub const CONFIG_FILE: &str = "config";
/// `repover` is the established name of the layout marker in node
/// repositories; keep it so existing repositories are recognized
pub const VERSION_FILE: &str = "repover";
pub const KEYSTORE_DIR: &str = "keystore";

/// Repository errors
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("repository already initialized at {0} (use force to overwrite)")]
    AlreadyInitialized(PathBuf),

    #[error("no repository at {0}")]
    NotInitialized(PathBuf),

    #[error("{path} is not writeable: {reason}")]
    NotWriteable { path: PathBuf, reason: String },

    #[error("repository version {found:?} does not match expected {expected:?}")]
    VersionMismatch { found: String, expected: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Keystore(#[from] KeystoreError),
}

/// Options for [`Repo::init`]
#[derive(Clone)]
pub struct InitOptions {
    /// RSA modulus size, `keygen.default_bits` when unset
    pub bits: Option<usize>,
    /// Derive the identity from this seed instead of fresh randomness
    pub seed: Option<Zeroizing<Vec<u8>>>,
    /// Replace an existing repository
    pub force: bool,
    /// Keep the private key in the encrypted keystore instead of the config
    pub password: Option<Zeroizing<String>>,
}

impl fmt::Debug for InitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitOptions")
            .field("bits", &self.bits)
            .field("seed", &self.seed.as_ref().map(|_| "<redacted>"))
            .field("force", &self.force)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            bits: None,
            seed: None,
            force: false,
            password: None,
        }
    }
}

/// An opened repository
#[derive(Debug)]
pub struct Repo {
    path: PathBuf,
    config: Config,
    identity: NodeIdentity,
}

impl Repo {
    /// Create a repository at `path` from the default config with
    /// `SATURN_*` environment overrides applied.
    ///
    /// See [`Repo::init_with_config`].
    pub fn init<R: CryptoRngCore + ?Sized>(
        path: impl AsRef<Path>,
        options: InitOptions,
        rng: &mut R,
    ) -> Result<Self, RepoError> {
        Self::init_with_config(path, Config::from_env()?, options, rng)
    }

    /// Create a repository at `path` starting from `config`.
    ///
    /// The key size comes from `options.bits` or `config.keygen`, and must
    /// not be below `keygen.min_bits`. The identity is created before any
    /// repository file is written or removed, so a failed generation leaves
    /// an existing repository intact.
    pub fn init_with_config<R: CryptoRngCore + ?Sized>(
        path: impl AsRef<Path>,
        mut config: Config,
        options: InitOptions,
        rng: &mut R,
    ) -> Result<Self, RepoError> {
        let path = path.as_ref();
        config.validate()?;
        let bits = config.keygen.resolve_bits(options.bits)?;

        let existing = Self::is_initialized(path);
        if existing && !options.force {
            return Err(RepoError::AlreadyInitialized(path.to_path_buf()));
        }

        check_writeable(path)?;

        let identity = match &options.seed {
            Some(seed) => NodeIdentity::from_seed(seed, bits)?,
            None => NodeIdentity::generate(bits, rng)?,
        };

        if existing {
            warn!(path = %path.display(), "removing existing repository");
            remove_repo_files(path)?;
        }

        let identity_config = match &options.password {
            Some(password) => {
                let keystore = FileKeystore::new(path.join(KEYSTORE_DIR), Some(password.as_str()))?;
                keystore.save_identity_key(identity.keypair())?;
                identity.to_public_config()
            }
            None => identity.to_config()?,
        };

        config.identity = identity_config;
        config.keygen.default_bits = bits;

        info!(path = %path.display(), bits, "initializing saturn node");
        config.save_to_file(path.join(CONFIG_FILE))?;
        fs::write(path.join(VERSION_FILE), REPO_VERSION)?;

        info!(peer_id = %identity.peer_id(), "repository initialized");
        Ok(Repo {
            path: path.to_path_buf(),
            config,
            identity,
        })
    }

    /// Open an existing repository, checking the key against the recorded peer id
    pub fn open(path: impl AsRef<Path>, password: Option<&str>) -> Result<Self, RepoError> {
        let path = path.as_ref();
        if !Self::is_initialized(path) {
            return Err(RepoError::NotInitialized(path.to_path_buf()));
        }

        let version = match fs::read_to_string(path.join(VERSION_FILE)) {
            Ok(version) => version.trim().to_string(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        if version != REPO_VERSION {
            return Err(RepoError::VersionMismatch {
                found: version,
                expected: REPO_VERSION.to_string(),
            });
        }

        let config = Config::from_file(path.join(CONFIG_FILE))?;
        let identity = if config.identity.has_inline_key() {
            config.identity.decode_identity()?
        } else {
            debug!("identity key not inline, loading from keystore");
            let keystore = FileKeystore::new(path.join(KEYSTORE_DIR), password)?;
            config.identity.verify(keystore.load_identity_key()?)?
        };
        config
            .keygen
            .check_public_key(identity.keypair().public_key())?;

        debug!(peer_id = %identity.peer_id(), path = %path.display(), "repository opened");
        Ok(Repo {
            path: path.to_path_buf(),
            config,
            identity,
        })
    }

    /// Whether `path` holds a repository config
    pub fn is_initialized(path: impl AsRef<Path>) -> bool {
        path.as_ref().join(CONFIG_FILE).is_file()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }
}

/// `~/.saturn`, expanded
pub fn default_repo_path() -> PathBuf {
    PathBuf::from(shellexpand::tilde(DEFAULT_REPO_DIR).into_owned())
}

/// Make sure `dir` exists and the current user can write into it
pub fn check_writeable(dir: impl AsRef<Path>) -> Result<(), RepoError> {
    let dir = dir.as_ref();
    let not_writeable = |e: io::Error| RepoError::NotWriteable {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    };

    if !dir.exists() {
        return fs::create_dir_all(dir).map_err(not_writeable);
    }

    let probe = dir.join(".write-test");
    fs::File::create(&probe).map_err(not_writeable)?;
    fs::remove_file(&probe).map_err(not_writeable)
}

/// Remove what [`Repo::init`] writes, leaving anything else in the directory
fn remove_repo_files(path: &Path) -> Result<(), RepoError> {
    for file in [CONFIG_FILE, VERSION_FILE] {
        match fs::remove_file(path.join(file)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
    }
    match fs::remove_dir_all(path.join(KEYSTORE_DIR)) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}
