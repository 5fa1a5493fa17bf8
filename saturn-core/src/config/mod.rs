//! Configuration management for Saturn
//!
//! The repository config is a TOML file holding the node identity plus the
//! defaults a freshly initialized node starts with. Values can be overlaid
//! from `SATURN_<SECTION>_<KEY>` environment variables.

use crate::core_identity::keystore::file_keystore::write_atomic;
use crate::core_identity::{
    IdentityConfig, KeyAlgorithm, KeyError, PublicKey, DEFAULT_RSA_BITS, MAX_RSA_BITS, MIN_RSA_BITS,
};
use crate::logging::{LogConfig, LogLevel};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use zeroize::Zeroizing;

mod error;

pub use error::ConfigError;

/// Peers dialed on first start
pub const DEFAULT_BOOTSTRAP_ADDRESSES: &[&str] = &[
    "/ip4/138.197.232.22/tcp/4001/ipfs/QmWViM25kq4Td71nQLAiyqMuGZoH12EoGuvp6hTnkb1XVt",
    "/ip4/35.194.251.184/tcp/4001/ipfs/QmR9z48iR96nRbgLM7Bt5MEiW9X5NxRXt3uyUCiWHS2qMw",
];

/// Main repository configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bootstrap peer multiaddrs
    pub bootstrap: Vec<String>,

    /// Node identity
    pub identity: IdentityConfig,

    /// Key generation defaults
    pub keygen: KeygenConfig,

    /// Block store settings
    pub datastore: DatastoreConfig,

    /// Listen addresses
    pub addresses: AddressesConfig,

    /// Local peer discovery
    pub discovery: DiscoveryConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Key generation defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeygenConfig {
    /// Modulus size for new identities
    pub default_bits: usize,

    /// Smallest modulus accepted for new, imported and loaded RSA keys
    pub min_bits: usize,
}

/// Block store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreConfig {
    /// Size cap, e.g. "10GB"
    pub storage_max: String,

    /// Percentage of `storage_max` that triggers garbage collection
    pub storage_gc_watermark: u8,

    /// Interval between garbage collection runs
    #[serde(with = "humantime_serde")]
    pub gc_period: Duration,

    /// Bloom filter size in bytes, 0 disables it
    pub bloom_filter_size: u64,

    /// Re-hash blocks when reading them
    pub hash_on_read: bool,
}

/// Listen addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressesConfig {
    pub swarm: Vec<String>,
    /// Empty disables the API listener
    pub api: String,
    pub gateway: String,
}

/// Local peer discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub mdns: MdnsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MdnsConfig {
    pub enabled: bool,

    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: LogLevel,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bootstrap: DEFAULT_BOOTSTRAP_ADDRESSES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            identity: IdentityConfig::default(),
            keygen: KeygenConfig::default(),
            datastore: DatastoreConfig::default(),
            addresses: AddressesConfig::default(),
            discovery: DiscoveryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for KeygenConfig {
    fn default() -> Self {
        Self {
            default_bits: DEFAULT_RSA_BITS,
            min_bits: MIN_RSA_BITS,
        }
    }
}

impl KeygenConfig {
    /// Modulus size for a new key: the requested one, else `default_bits`
    pub fn resolve_bits(&self, requested: Option<usize>) -> Result<usize, KeyError> {
        let bits = requested.unwrap_or(self.default_bits);
        if bits < self.min_bits {
            return Err(KeyError::WeakKey {
                bits,
                min: self.min_bits,
            });
        }
        Ok(bits)
    }

    /// Reject RSA keys smaller than `min_bits`
    pub fn check_public_key(&self, public: &PublicKey) -> Result<(), KeyError> {
        if public.algorithm() == KeyAlgorithm::Rsa && public.bits() < self.min_bits {
            return Err(KeyError::WeakKey {
                bits: public.bits(),
                min: self.min_bits,
            });
        }
        Ok(())
    }
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            storage_max: "10GB".to_string(),
            storage_gc_watermark: 90,
            gc_period: Duration::from_secs(3600),
            bloom_filter_size: 0,
            hash_on_read: false,
        }
    }
}

impl Default for AddressesConfig {
    fn default() -> Self {
        Self {
            swarm: vec![
                "/ip4/0.0.0.0/tcp/4001".to_string(),
                "/ip6/::/tcp/4001".to_string(),
                "/ip4/0.0.0.0/tcp/9005/ws".to_string(),
                "/ip6/::/tcp/9005/ws".to_string(),
            ],
            api: String::new(),
            gateway: "/ip4/127.0.0.1/tcp/4002".to_string(),
        }
    }
}

impl Default for MdnsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(10),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        LogConfig::new(config.level)
            .json_format(config.json_format)
            .with_timestamp(config.with_timestamp)
            .with_target(config.with_target)
    }
}

impl Config {
    /// Default configuration carrying the given identity
    pub fn with_identity(identity: IdentityConfig) -> Self {
        Self {
            identity,
            ..Self::default()
        }
    }

    /// Load the default configuration overlaid with environment variables
    ///
    /// Environment variables follow the pattern: SATURN_<SECTION>_<KEY>
    /// Example: SATURN_KEYGEN_DEFAULT_BITS=2048
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values found by `lookup`, keyed by environment variable name
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Keygen config
        if let Some(bits) = lookup("SATURN_KEYGEN_DEFAULT_BITS") {
            self.keygen.default_bits = parse_value("SATURN_KEYGEN_DEFAULT_BITS", &bits)?;
        }
        if let Some(bits) = lookup("SATURN_KEYGEN_MIN_BITS") {
            self.keygen.min_bits = parse_value("SATURN_KEYGEN_MIN_BITS", &bits)?;
        }

        // Datastore config
        if let Some(max) = lookup("SATURN_DATASTORE_STORAGE_MAX") {
            self.datastore.storage_max = max;
        }
        if let Some(watermark) = lookup("SATURN_DATASTORE_STORAGE_GC_WATERMARK") {
            self.datastore.storage_gc_watermark =
                parse_value("SATURN_DATASTORE_STORAGE_GC_WATERMARK", &watermark)?;
        }
        if let Some(period) = lookup("SATURN_DATASTORE_GC_PERIOD") {
            self.datastore.gc_period = humantime::parse_duration(&period)
                .map_err(|e| ConfigError::invalid("SATURN_DATASTORE_GC_PERIOD", e))?;
        }

        // Addresses config
        if let Some(api) = lookup("SATURN_ADDRESSES_API") {
            self.addresses.api = api;
        }
        if let Some(gateway) = lookup("SATURN_ADDRESSES_GATEWAY") {
            self.addresses.gateway = gateway;
        }
        if let Some(swarm) = lookup("SATURN_ADDRESSES_SWARM") {
            self.addresses.swarm = split_list(&swarm);
        }

        // Bootstrap peers
        if let Some(peers) = lookup("SATURN_BOOTSTRAP") {
            self.bootstrap = split_list(&peers);
        }

        // Discovery config
        if let Some(enabled) = lookup("SATURN_DISCOVERY_MDNS_ENABLED") {
            self.discovery.mdns.enabled = parse_value("SATURN_DISCOVERY_MDNS_ENABLED", &enabled)?;
        }

        // Logging config
        if let Some(level) = lookup("SATURN_LOGGING_LEVEL") {
            self.logging.level = level
                .parse()
                .map_err(|e| ConfigError::invalid("SATURN_LOGGING_LEVEL", e))?;
        }
        if let Some(json) = lookup("SATURN_LOGGING_JSON_FORMAT") {
            self.logging.json_format = parse_value("SATURN_LOGGING_JSON_FORMAT", &json)?;
        }

        Ok(())
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::FileReadError(format!("{}: {}", path.as_ref().display(), e))
        })?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Keygen config
        if self.keygen.min_bits < MIN_RSA_BITS {
            return Err(ConfigError::ValidationFailed(format!(
                "keygen.min_bits must be at least {}",
                MIN_RSA_BITS
            )));
        }
        if self.keygen.default_bits < self.keygen.min_bits
            || self.keygen.default_bits > MAX_RSA_BITS
        {
            return Err(ConfigError::ValidationFailed(format!(
                "keygen.default_bits must be between {} and {}",
                self.keygen.min_bits, MAX_RSA_BITS
            )));
        }

        // Datastore config
        parse_storage_size(&self.datastore.storage_max)?;
        if self.datastore.storage_gc_watermark == 0 || self.datastore.storage_gc_watermark > 100 {
            return Err(ConfigError::ValidationFailed(
                "datastore.storage_gc_watermark must be between 1 and 100".to_string(),
            ));
        }
        if self.datastore.gc_period.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "datastore.gc_period must be greater than 0".to_string(),
            ));
        }

        // Addresses
        let addresses = self
            .addresses
            .swarm
            .iter()
            .chain(self.bootstrap.iter())
            .chain(std::iter::once(&self.addresses.gateway))
            .chain(std::iter::once(&self.addresses.api));
        for addr in addresses {
            if !addr.is_empty() && !addr.starts_with('/') {
                return Err(ConfigError::ValidationFailed(format!(
                    "{:?} is not a multiaddr",
                    addr
                )));
            }
        }

        // Identity
        if !self.identity.peer_id.is_empty() {
            self.identity.peer_id()?;
        }

        Ok(())
    }

    /// Save configuration to file
    ///
    /// The config may hold the private key, so the file is written atomically
    /// and is owner-only on unix from the moment it is created.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents = Zeroizing::new(
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?,
        );

        write_atomic(path.as_ref(), contents.as_bytes()).map_err(|e| {
            ConfigError::FileWriteError(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Ok(())
    }

    /// The configured storage cap in bytes
    pub fn storage_max_bytes(&self) -> Result<u64, ConfigError> {
        parse_storage_size(&self.datastore.storage_max)
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| ConfigError::invalid(key, e))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parse sizes such as "10GB", "512MB" or "1024" (decimal units)
pub fn parse_storage_size(value: &str) -> Result<u64, ConfigError> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);

    let number: u64 = number
        .parse()
        .map_err(|_| ConfigError::invalid("datastore.storage_max", format!("{:?}", value)))?;
    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "KB" => 1_000,
        "MB" => 1_000_000,
        "GB" => 1_000_000_000,
        "TB" => 1_000_000_000_000,
        other => {
            return Err(ConfigError::invalid(
                "datastore.storage_max",
                format!("unknown unit {:?}", other),
            ))
        }
    };

    number
        .checked_mul(multiplier)
        .ok_or_else(|| ConfigError::invalid("datastore.storage_max", "overflows u64"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_identity::{export_private_key_raw, import_private_key_raw};
    use crate::test_utils::rsa_1024;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.keygen.default_bits, 4096);
        assert_eq!(config.storage_max_bytes().unwrap(), 10_000_000_000);
        assert_eq!(config.bootstrap.len(), 2);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.keygen.default_bits = 512;
        assert!(config.validate().is_err());

        config = Config::default();
        config.keygen.min_bits = 768;
        assert!(config.validate().is_err());

        config = Config::default();
        config.datastore.storage_gc_watermark = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.datastore.storage_max = "ten gigs".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.bootstrap.push("138.197.232.22:4001".to_string());
        assert!(config.validate().is_err());

        config = Config::default();
        config.identity.peer_id = "not-a-peer-id".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Identity(_))));
    }

    #[test]
    fn test_min_bits_rejects_smaller_keys() {
        let mut keygen = KeygenConfig::default();
        keygen.min_bits = 2048;
        keygen.default_bits = 2048;
        assert!(Config {
            keygen: keygen.clone(),
            ..Config::default()
        }
        .validate()
        .is_ok());

        let der = export_private_key_raw(rsa_1024()).unwrap();
        let imported = import_private_key_raw(&der).unwrap();
        match keygen.check_public_key(imported.public_key()) {
            Err(KeyError::WeakKey { bits, min }) => {
                assert_eq!(bits, 1024);
                assert_eq!(min, 2048);
            }
            other => panic!("Expected WeakKey, got {:?}", other),
        }

        assert!(KeygenConfig::default()
            .check_public_key(rsa_1024().public_key())
            .is_ok());
    }

    #[test]
    fn test_resolve_bits() {
        let mut keygen = KeygenConfig::default();
        assert_eq!(keygen.resolve_bits(None).unwrap(), DEFAULT_RSA_BITS);
        assert_eq!(keygen.resolve_bits(Some(2048)).unwrap(), 2048);

        keygen.min_bits = 2048;
        assert!(matches!(
            keygen.resolve_bits(Some(1024)),
            Err(KeyError::WeakKey { bits: 1024, min: 2048 })
        ));
    }

    #[test]
    fn test_parse_storage_size() {
        assert_eq!(parse_storage_size("1024").unwrap(), 1024);
        assert_eq!(parse_storage_size("512MB").unwrap(), 512_000_000);
        assert_eq!(parse_storage_size("2 gb").unwrap(), 2_000_000_000);
        assert!(parse_storage_size("GB").is_err());
        assert!(parse_storage_size("10XB").is_err());
        assert!(parse_storage_size("99999999999TB").is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SATURN_KEYGEN_DEFAULT_BITS", "2048"),
            ("SATURN_DATASTORE_GC_PERIOD", "30m"),
            ("SATURN_BOOTSTRAP", "/ip4/10.0.0.1/tcp/4001, /ip4/10.0.0.2/tcp/4001"),
            ("SATURN_LOGGING_LEVEL", "debug"),
            ("SATURN_DISCOVERY_MDNS_ENABLED", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.keygen.default_bits, 2048);
        assert_eq!(config.datastore.gc_period, Duration::from_secs(1800));
        assert_eq!(config.bootstrap.len(), 2);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(!config.discovery.mdns.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_override_names_the_variable() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| {
            (key == "SATURN_KEYGEN_DEFAULT_BITS").then(|| "lots".to_string())
        });
        match result {
            Err(ConfigError::InvalidValue { key, .. }) => {
                assert_eq!(key, "SATURN_KEYGEN_DEFAULT_BITS")
            }
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_file_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config");

        let mut config = Config::default();
        config.datastore.gc_period = Duration::from_secs(90 * 60);
        config.logging.level = LogLevel::Warn;
        config.save_to_file(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[datastore]"));
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
        assert!(contents.contains("1h 30m"));

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config");
        std::fs::write(&path, "[keygen]\ndefault_bits = 2048\n").unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.keygen.default_bits, 2048);
        assert_eq!(loaded.datastore, DatastoreConfig::default());
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::from_file(temp_dir.path().join("absent")),
            Err(ConfigError::FileReadError(_))
        ));
    }

    #[test]
    fn test_log_config_conversion() {
        let mut logging = LoggingConfig::default();
        logging.level = LogLevel::Trace;
        logging.json_format = true;

        let log_config = LogConfig::from(&logging);
        assert_eq!(log_config.level, LogLevel::Trace);
        assert!(log_config.json_format);
    }
}
