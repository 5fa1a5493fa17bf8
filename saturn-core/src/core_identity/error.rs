//! Key error types

use super::keypair::KeyAlgorithm;
use thiserror::Error;

/// Errors produced by key generation, encoding and decoding.
///
/// Every malformed input maps to one of these variants; the key functions
/// never panic on untrusted bytes or text.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Requested RSA modulus is below the safety floor
    #[error("{bits}-bit keys are considered unsafe (minimum is {min})")]
    WeakKey { bits: usize, min: usize },

    /// Requested RSA modulus is larger than the backend can round-trip
    #[error("{bits}-bit keys are not supported (maximum is {max})")]
    KeyTooLarge { bits: usize, max: usize },

    /// Seed material too short to derive an identity from
    #[error("seed of {len} bytes is too short (minimum is {min})")]
    WeakSeed { len: usize, min: usize },

    /// No usable PEM block in the input
    #[error("malformed PEM: {0}")]
    MalformedPem(String),

    /// Payload does not decode into key material
    #[error("malformed key: {0}")]
    MalformedKey(String),

    /// Operation is not implemented for the key's algorithm
    #[error("{operation} is not supported for {algorithm} keys")]
    UnsupportedAlgorithm {
        algorithm: KeyAlgorithm,
        operation: &'static str,
    },

    /// Unknown key type tag in a serialized envelope
    #[error("unknown key type {0}")]
    UnknownKeyType(u64),

    /// The randomness source failed
    #[error("entropy source failed: {0}")]
    Entropy(String),

    /// The RSA backend refused to generate a key
    #[error("key generation failed: {0}")]
    Generation(String),

    /// Valid key material could not be encoded
    #[error("key encoding failed: {0}")]
    Encoding(String),
}

impl KeyError {
    pub(crate) fn unsupported(algorithm: KeyAlgorithm, operation: &'static str) -> Self {
        KeyError::UnsupportedAlgorithm {
            algorithm,
            operation,
        }
    }
}
