//! Peer identifier
//!
//! Stable identifier derived from a public key. The key's envelope encoding
//! (see [`super::envelope`]) is hashed into a multihash and printed in
//! base58btc:
//! - envelope ≤ 42 bytes: identity multihash `0x00 ‖ len ‖ envelope`
//! - otherwise: SHA2-256 multihash `0x12 ‖ 0x20 ‖ sha256(envelope)`
//!
//! RSA identities therefore always print as `Qm...`.

use super::envelope::{self, read_varint, write_varint};
use super::error::KeyError;
use super::keypair::PublicKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Multihash code for the identity "hash"
pub const MULTIHASH_IDENTITY: u64 = 0x00;

/// Multihash code for SHA2-256
pub const MULTIHASH_SHA2_256: u64 = 0x12;

/// Longest key encoding that is inlined rather than hashed
pub const MAX_INLINE_KEY_LENGTH: usize = 42;

/// Errors parsing a textual peer id
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PeerIdError {
    #[error("invalid base58: {0}")]
    Base58(String),

    #[error("invalid multihash: {0}")]
    Multihash(String),
}

/// A peer identifier (multihash bytes)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(Vec<u8>);

impl PeerId {
    /// Compute the identifier of a public key
    pub fn from_public_key(public: &PublicKey) -> Result<Self, KeyError> {
        let encoded = envelope::marshal_public_key(public)?;

        let mut multihash = Vec::with_capacity(34);
        if encoded.len() <= MAX_INLINE_KEY_LENGTH {
            write_varint(&mut multihash, MULTIHASH_IDENTITY);
            write_varint(&mut multihash, encoded.len() as u64);
            multihash.extend_from_slice(&encoded);
        } else {
            let digest = Sha256::digest(&encoded);
            write_varint(&mut multihash, MULTIHASH_SHA2_256);
            write_varint(&mut multihash, digest.len() as u64);
            multihash.extend_from_slice(&digest);
        }
        Ok(PeerId(multihash))
    }

    /// Parse multihash bytes, validating the header
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PeerIdError> {
        let (code, rest) = read_varint(bytes)
            .map_err(|_| PeerIdError::Multihash("bad code".to_string()))?;
        let (len, digest) = read_varint(rest)
            .map_err(|_| PeerIdError::Multihash("bad length".to_string()))?;

        if digest.len() as u64 != len {
            return Err(PeerIdError::Multihash(format!(
                "length prefix {} but {} digest bytes",
                len,
                digest.len()
            )));
        }

        match code {
            MULTIHASH_SHA2_256 if len == 32 => {}
            MULTIHASH_IDENTITY if len as usize <= MAX_INLINE_KEY_LENGTH => {}
            MULTIHASH_SHA2_256 | MULTIHASH_IDENTITY => {
                return Err(PeerIdError::Multihash(format!(
                    "unexpected digest length {} for code 0x{:02x}",
                    len, code
                )))
            }
            other => {
                return Err(PeerIdError::Multihash(format!(
                    "unsupported hash code 0x{:02x}",
                    other
                )))
            }
        }

        Ok(PeerId(bytes.to_vec()))
    }

    /// Check whether `public` hashes to this identifier
    pub fn matches_public_key(&self, public: &PublicKey) -> bool {
        PeerId::from_public_key(public)
            .map(|id| id == *self)
            .unwrap_or(false)
    }

    /// The raw multihash bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Base58btc text form
    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl FromStr for PeerId {
    type Err = PeerIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| PeerIdError::Base58(e.to_string()))?;
        PeerId::from_bytes(&bytes)
    }
}

impl Serialize for PeerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for PeerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
