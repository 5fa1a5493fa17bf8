//! Saturn node core
//!
//! Identity keys (RSA with Ed25519 alongside), their raw and PEM encodings,
//! peer ids, the encrypted keystore, repository initialization, config and
//! logging.

pub mod config;
pub mod core_identity;
pub mod logging;
pub mod repo;
pub mod test_utils;

pub use config::{Config, ConfigError};
pub use core_identity::{KeyAlgorithm, KeyError, KeyPair, NodeIdentity, PeerId};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogLevel};
pub use repo::{InitOptions, Repo, RepoError};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let _ = LogLevel::Info;
        let _ = KeyAlgorithm::Rsa;
        assert!(Config::default().validate().is_ok());
    }
}
